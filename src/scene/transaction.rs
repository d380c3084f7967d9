/// Transactions — ordered batches of scene mutations.
///
/// Producers on any thread record resets, updates, and removals into a
/// Transaction, then hand the whole batch to the Scene's queue. The Scene
/// consumes the queue in consolidated batches: everything queued at drain
/// time is merged into one transaction and applied reset → update → remove.

use std::collections::VecDeque;
use std::sync::Mutex;
use super::item::{ItemId, ItemPayload, PayloadBox, UpdateFn};

// ===== TRANSACTION =====

/// An append-only batch of reset/update/remove records.
///
/// Records of each kind keep their relative order through merges, but the
/// three kinds are applied in a fixed order per consolidated batch, not per
/// transaction: a later transaction's reset runs before an earlier
/// transaction's update when both land in the same apply cycle.
#[derive(Default)]
pub struct Transaction {
    resets: Vec<(ItemId, PayloadBox)>,
    updates: Vec<(ItemId, UpdateFn)>,
    removals: Vec<ItemId>,
}

impl Transaction {
    /// Create a new empty transaction
    pub fn new() -> Transaction {
        Transaction::default()
    }

    /// Record a create-or-replace of the item at `id`.
    ///
    /// An empty payload can never produce a valid item; such a call is
    /// redirected to a removal, with a diagnostic.
    pub fn reset_item(&mut self, id: ItemId, payload: Option<PayloadBox>) {
        match payload {
            Some(payload) => self.resets.push((id, payload)),
            None => {
                crate::scene_warn!(
                    "nebula::Transaction",
                    "reset_item with an empty payload, removing item {} instead", id
                );
                self.remove_item(id);
            }
        }
    }

    /// Record a removal of the item at `id`.
    pub fn remove_item(&mut self, id: ItemId) {
        self.removals.push(id);
    }

    /// Record an in-place mutation of the item at `id`.
    ///
    /// The functor receives mutable access to the payload during the apply
    /// cycle; the item's key and bound change through it.
    pub fn update_item<F>(&mut self, id: ItemId, functor: F)
    where
        F: FnOnce(&mut dyn ItemPayload) + Send + 'static,
    {
        self.updates.push((id, Box::new(functor)));
    }

    /// Concatenate all of `other`'s records onto this transaction,
    /// preserving relative order within each kind.
    pub fn merge(&mut self, other: Transaction) {
        self.resets.extend(other.resets);
        self.updates.extend(other.updates);
        self.removals.extend(other.removals);
    }

    /// Whether the transaction records no operations
    pub fn is_empty(&self) -> bool {
        self.resets.is_empty() && self.updates.is_empty() && self.removals.is_empty()
    }

    /// Number of recorded resets
    pub fn reset_count(&self) -> usize {
        self.resets.len()
    }

    /// Number of recorded updates
    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    /// Number of recorded removals
    pub fn removal_count(&self) -> usize {
        self.removals.len()
    }

    /// Split into the per-kind record sequences, in application order.
    pub(crate) fn into_parts(
        self,
    ) -> (Vec<(ItemId, PayloadBox)>, Vec<(ItemId, UpdateFn)>, Vec<ItemId>) {
        (self.resets, self.updates, self.removals)
    }
}

// ===== TRANSACTION QUEUE =====

/// Thread-safe multi-producer, single-consumer FIFO of transactions.
///
/// Producers contend only for the duration of a push. The consumer drains
/// the whole queue in one lock hold; transactions enqueued while a drain
/// runs are picked up on the next cycle.
pub struct TransactionQueue {
    pending: Mutex<VecDeque<Transaction>>,
}

impl TransactionQueue {
    /// Create a new empty queue
    pub fn new() -> TransactionQueue {
        TransactionQueue {
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Push a transaction onto the back of the queue. Any thread.
    pub fn enqueue(&self, transaction: Transaction) {
        self.pending.lock().unwrap().push_back(transaction);
    }

    /// Pop every queued transaction and merge them, in enqueue order, into
    /// one consolidated transaction. Consumer only.
    pub fn drain_and_merge(&self) -> Transaction {
        let mut consolidated = Transaction::new();
        let mut pending = self.pending.lock().unwrap();
        while let Some(transaction) = pending.pop_front() {
            consolidated.merge(transaction);
        }
        consolidated
    }

    /// Number of transactions currently queued
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Whether no transactions are queued
    pub fn is_empty(&self) -> bool {
        self.pending.lock().unwrap().is_empty()
    }
}

impl Default for TransactionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;
