//! Speculative local state with confirm-or-compensate.
//!
//! DESIGN
//! ======
//! A `Speculative` mutation applies an optimistic step to a target as soon as
//! it is issued, and later either confirms (the backing store accepted it) or
//! compensates (the store refused it). The `Ledger` numbers in-flight
//! mutations with tickets and keeps whatever the optimistic step needs to be
//! undone. Insert-after-confirm and delete-then-restore are both instances.

use std::collections::HashMap;
use std::marker::PhantomData;

/// Identifies one in-flight mutation.
pub type Ticket = u64;

pub trait Speculative<T> {
    /// State captured by the optimistic step, consumed by compensation.
    type Undo;
    /// What the store hands back on success.
    type Confirmed;

    fn speculate(&self, target: &mut T) -> Self::Undo;

    fn confirm(&self, target: &mut T, confirmed: Self::Confirmed);

    fn compensate(&self, target: &mut T, undo: Self::Undo);
}

struct Pending<M, U> {
    mutation: M,
    undo: U,
}

pub struct Ledger<T, M: Speculative<T>> {
    next: Ticket,
    pending: HashMap<Ticket, Pending<M, M::Undo>>,
    _target: PhantomData<fn(&mut T)>,
}

impl<T, M: Speculative<T>> Default for Ledger<T, M> {
    fn default() -> Self {
        Self { next: 1, pending: HashMap::new(), _target: PhantomData }
    }
}

impl<T, M: Speculative<T>> Ledger<T, M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the optimistic step and start tracking the mutation.
    pub fn begin(&mut self, target: &mut T, mutation: M) -> Ticket {
        let ticket = self.next;
        self.next += 1;
        let undo = mutation.speculate(target);
        self.pending.insert(ticket, Pending { mutation, undo });
        ticket
    }

    /// Settle a ticket as accepted. Unknown tickets are ignored and return `None`.
    pub fn confirm(&mut self, target: &mut T, ticket: Ticket, confirmed: M::Confirmed) -> Option<M> {
        let pending = self.pending.remove(&ticket)?;
        pending.mutation.confirm(target, confirmed);
        Some(pending.mutation)
    }

    /// Settle a ticket as refused and undo its optimistic step.
    pub fn compensate(&mut self, target: &mut T, ticket: Ticket) -> Option<M> {
        let pending = self.pending.remove(&ticket)?;
        pending.mutation.compensate(target, pending.undo);
        Some(pending.mutation)
    }

    /// Mutations still awaiting settlement.
    pub fn pending(&self) -> impl Iterator<Item = &M> {
        self.pending.values().map(|p| &p.mutation)
    }

    /// Forget every in-flight mutation without settling it.
    pub fn abandon(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
#[path = "speculation_test.rs"]
mod tests;
