//! The ordered collection of subscriptions behind an event.
//!
//! The registry itself is not synchronized. The thread-safe event keeps it behind a mutex and the
//! single-threaded event behind a `RefCell`; in both cases every operation here is one short
//! critical section and no handler is ever called while the registry is borrowed.

use std::sync::Arc;

use crate::{OwnerId, Subscription, SubscriptionId, owners_dropped};

/// A copy of the registry contents, detached from the registry.
pub(crate) type Snapshot<H> = Vec<Arc<Subscription<H>>>;

#[derive(Debug)]
pub(crate) struct Registry<H: ?Sized> {
    records: Vec<Arc<Subscription<H>>>,

    // Value of the process-wide dropped-owner counter at the time of our last sweep.
    // If it has not moved since, no record can have become dead and a sweep is pointless.
    swept_at: u64,
}

impl<H: ?Sized> Registry<H> {
    pub(crate) fn new() -> Self {
        Self {
            records: Vec::new(),
            swept_at: owners_dropped(),
        }
    }

    /// Appends a record, first pruning records of dead owners if any owner has died since the
    /// previous sweep. Returns how many records were pruned.
    pub(crate) fn add(&mut self, record: Arc<Subscription<H>>) -> usize {
        let pruned = if self.records.is_empty() {
            0
        } else {
            self.prune_dead()
        };

        self.records.push(record);
        pruned
    }

    /// Removes records whose owner is gone. Returns how many were removed.
    pub(crate) fn prune_dead(&mut self) -> usize {
        let dropped = owners_dropped();

        if dropped == self.swept_at {
            return 0;
        }

        // Read before sweeping: an owner dying mid-sweep leaves the counter ahead of us,
        // so the next call sweeps again.
        self.swept_at = dropped;

        let before = self.records.len();
        self.records.retain(|record| record.owner().is_alive());
        before - self.records.len()
    }

    /// Removes every record of the owner. Returns how many were removed.
    pub(crate) fn remove_owner(&mut self, owner: OwnerId) -> usize {
        let before = self.records.len();
        self.records.retain(|record| record.owner_id() != owner);
        before - self.records.len()
    }

    /// Removes exactly one record. Returns whether it was present.
    pub(crate) fn remove_record(&mut self, id: SubscriptionId) -> bool {
        match self.records.iter().position(|record| record.id() == id) {
            Some(index) => {
                // Order must be preserved, so no swap_remove.
                self.records.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes all records. Returns how many were removed.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }

    pub(crate) fn snapshot(&self) -> Snapshot<H> {
        self.records.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

impl<H: ?Sized> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}
