//! Ordered, duplicate-free bookmark list with tombstones.
//!
//! INVARIANTS
//! ==========
//! - No two entries share an `id`.
//! - Entries are sorted descending by `created_at`; ties keep the most
//!   recently inserted entry first.
//! - An id that was confirmed deleted is never admitted again.
//!
//! `revision` increments on every observable change so the owner can tell
//! whether a snapshot needs publishing without diffing entries.

use std::collections::HashSet;

use crate::bookmark::{Bookmark, BookmarkId};

#[derive(Debug, Default)]
pub struct BookmarkList {
    entries: Vec<Bookmark>,
    /// Ids confirmed deleted. Never pruned: store ids are not reused, and the
    /// set lives only as long as one open dashboard.
    tombstones: HashSet<BookmarkId>,
    revision: u64,
}

impl BookmarkList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all entries. Rows whose id is tombstoned or listed in
    /// `withheld` are dropped, as are repeated ids after the first.
    pub fn replace(&mut self, mut rows: Vec<Bookmark>, withheld: &HashSet<&str>) {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut seen = HashSet::with_capacity(rows.len());
        rows.retain(|b| {
            !self.tombstones.contains(&b.id) && !withheld.contains(b.id.as_str()) && seen.insert(b.id.clone())
        });
        self.entries = rows;
        self.revision += 1;
    }

    /// Insert at the `created_at` position. Returns `false` if the id is
    /// already present or tombstoned.
    pub fn insert(&mut self, bookmark: Bookmark) -> bool {
        if self.tombstones.contains(&bookmark.id) || self.contains(&bookmark.id) {
            return false;
        }
        let at = self
            .entries
            .iter()
            .position(|e| e.created_at <= bookmark.created_at)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, bookmark);
        self.revision += 1;
        true
    }

    /// Remove without tombstoning; the id may come back (e.g. compensation).
    pub fn remove(&mut self, id: &str) -> Option<Bookmark> {
        let at = self.entries.iter().position(|e| e.id == id)?;
        self.revision += 1;
        Some(self.entries.remove(at))
    }

    /// Remove and tombstone: the store has confirmed the row is gone.
    pub fn bury(&mut self, id: &str) -> Option<Bookmark> {
        self.tombstones.insert(id.to_string());
        self.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Bookmark] {
        &self.entries
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
#[path = "list_test.rs"]
mod tests;
