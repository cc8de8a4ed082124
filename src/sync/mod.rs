//! Sync: the bookmark state synchronizer.
//!
//! DESIGN
//! ======
//! Three sources change one owner's list: the initial (or resync) load, the
//! user's own inserts and deletes, and the realtime feed. They race freely;
//! the synchronizer merges them so that the list always holds exactly the
//! bookmarks confirmed created and not yet confirmed deleted, once each,
//! newest first.
//!
//! - Local inserts are speculative with a no-op optimistic step: the entry
//!   appears only when the store returns the persisted row.
//! - Local deletes remove immediately and restore on failure, unless a
//!   remote delete tombstoned the id in the meantime.
//! - Every operation is idempotent by `id`, which absorbs realtime echoes of
//!   local writes, duplicate deliveries and reordering.
//!
//! LIFECYCLE
//! =========
//! `Unseeded → Live ⇄ Reloading → Closed`. Remote inserts arriving before the
//! first seed, or during a reload, are kept in a backlog and replayed on top
//! of the loaded rows. Remote deletes need no backlog: tombstones outlive
//! `seed`. Once closed, every call is a no-op.

pub mod list;
pub mod speculation;
pub mod view;

use std::collections::HashSet;

use crate::bookmark::{Bookmark, BookmarkId};
pub use list::BookmarkList;
pub use speculation::{Ledger, Speculative, Ticket};
pub use view::{Snapshot, ViewError, ViewHandle, spawn_view};

// =============================================================================
// EDITS
// =============================================================================

/// A local write awaiting the store's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Insert,
    Delete(BookmarkId),
}

/// What the store returned for a successful edit.
#[derive(Debug, Clone)]
pub enum Confirmation {
    Inserted(Bookmark),
    Deleted,
}

impl Speculative<BookmarkList> for Edit {
    /// The entry an optimistic delete took out of the list.
    type Undo = Option<Bookmark>;
    type Confirmed = Confirmation;

    fn speculate(&self, list: &mut BookmarkList) -> Option<Bookmark> {
        match self {
            Edit::Insert => None,
            Edit::Delete(id) => list.remove(id),
        }
    }

    fn confirm(&self, list: &mut BookmarkList, confirmed: Confirmation) {
        match (self, confirmed) {
            (_, Confirmation::Inserted(bookmark)) => {
                list.insert(bookmark);
            }
            (Edit::Delete(id), Confirmation::Deleted) => {
                list.bury(id);
            }
            (Edit::Insert, Confirmation::Deleted) => {}
        }
    }

    fn compensate(&self, list: &mut BookmarkList, undo: Option<Bookmark>) {
        // Refused by the tombstone if a remote delete landed meanwhile.
        if let Some(bookmark) = undo {
            list.insert(bookmark);
        }
    }
}

// =============================================================================
// SYNCHRONIZER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unseeded,
    Live,
    Reloading,
    Closed,
}

pub struct Synchronizer {
    list: BookmarkList,
    ledger: Ledger<BookmarkList, Edit>,
    phase: Phase,
    backlog: Vec<Bookmark>,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synchronizer {
    #[must_use]
    pub fn new() -> Self {
        Self { list: BookmarkList::new(), ledger: Ledger::new(), phase: Phase::Unseeded, backlog: Vec::new() }
    }

    /// Replace the list with a full load and go live.
    ///
    /// Ids with a delete in flight stay hidden; the delete's outcome decides
    /// whether they return. Buffered remote inserts are then replayed.
    pub fn seed(&mut self, rows: Vec<Bookmark>) {
        if self.phase == Phase::Closed {
            return;
        }
        let withheld: HashSet<&str> = self
            .ledger
            .pending()
            .filter_map(|edit| match edit {
                Edit::Delete(id) => Some(id.as_str()),
                Edit::Insert => None,
            })
            .collect();
        self.list.replace(rows, &withheld);
        for bookmark in std::mem::take(&mut self.backlog) {
            if !self.delete_pending(&bookmark.id) {
                self.list.insert(bookmark);
            }
        }
        self.phase = Phase::Live;
    }

    /// Enter `Reloading` ahead of a resync load. Returns `false` unless live.
    pub fn begin_reload(&mut self) -> bool {
        if self.phase != Phase::Live {
            return false;
        }
        self.phase = Phase::Reloading;
        true
    }

    /// The resync load failed; keep the current list.
    pub fn abort_reload(&mut self) {
        if self.phase == Phase::Reloading {
            self.backlog.clear();
            self.phase = Phase::Live;
        }
    }

    /// Track a validated local insert. Nothing is visible until confirmed.
    pub fn begin_insert(&mut self) -> Ticket {
        self.ledger.begin(&mut self.list, Edit::Insert)
    }

    /// Optimistically remove `id`. `None` if it is not in the list (already
    /// deleted, or a delete is in flight), in which case there is nothing
    /// to send to the store.
    pub fn begin_delete(&mut self, id: &str) -> Option<Ticket> {
        if !matches!(self.phase, Phase::Live | Phase::Reloading) || !self.list.contains(id) {
            return None;
        }
        Some(self.ledger.begin(&mut self.list, Edit::Delete(id.to_string())))
    }

    pub fn confirm_insert(&mut self, ticket: Ticket, bookmark: Bookmark) {
        match self.phase {
            Phase::Closed => return,
            Phase::Reloading => self.backlog.push(bookmark.clone()),
            Phase::Unseeded | Phase::Live => {}
        }
        self.ledger.confirm(&mut self.list, ticket, Confirmation::Inserted(bookmark));
    }

    pub fn confirm_delete(&mut self, ticket: Ticket) {
        if self.phase != Phase::Closed {
            self.ledger.confirm(&mut self.list, ticket, Confirmation::Deleted);
        }
    }

    /// The store refused the edit behind `ticket`; undo its optimistic step.
    pub fn fail(&mut self, ticket: Ticket) {
        if self.phase != Phase::Closed {
            self.ledger.compensate(&mut self.list, ticket);
        }
    }

    pub fn apply_remote_insert(&mut self, bookmark: Bookmark) {
        if self.phase == Phase::Closed || self.delete_pending(&bookmark.id) {
            return;
        }
        match self.phase {
            Phase::Unseeded => self.backlog.push(bookmark),
            Phase::Reloading => {
                self.backlog.push(bookmark.clone());
                self.list.insert(bookmark);
            }
            Phase::Live | Phase::Closed => {
                self.list.insert(bookmark);
            }
        }
    }

    pub fn apply_remote_delete(&mut self, id: &str) {
        if self.phase != Phase::Closed {
            self.list.bury(id);
        }
    }

    /// Make the synchronizer inert. In-flight edits are forgotten.
    pub fn close(&mut self) {
        self.phase = Phase::Closed;
        self.ledger.abandon();
        self.backlog.clear();
    }

    fn delete_pending(&self, id: &str) -> bool {
        self.ledger.pending().any(|edit| matches!(edit, Edit::Delete(pending) if pending == id))
    }

    #[must_use]
    pub fn bookmarks(&self) -> &[Bookmark] {
        self.list.as_slice()
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.list.revision()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether a first load has landed and the list is observable.
    #[must_use]
    pub fn is_seeded(&self) -> bool {
        matches!(self.phase, Phase::Live | Phase::Reloading)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
