/// Tests for Transaction recording/merging and the TransactionQueue.

use super::*;
use crate::scene::item::{AABB, ItemId, ItemKey, ItemPayload, PayloadBox};
use glam::Vec3;
use std::any::Any;

// ============================================================================
// Helper payload
// ============================================================================

struct TestPayload {
    key: ItemKey,
    bound: AABB,
}

impl ItemPayload for TestPayload {
    fn key(&self) -> ItemKey {
        self.key
    }

    fn bound(&self) -> AABB {
        self.bound
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn payload() -> PayloadBox {
    Box::new(TestPayload {
        key: ItemKey::SPATIAL,
        bound: AABB::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
    })
}

// ============================================================================
// Tests: recording
// ============================================================================

#[test]
fn test_new_transaction_is_empty() {
    let transaction = Transaction::new();
    assert!(transaction.is_empty());
    assert_eq!(transaction.reset_count(), 0);
    assert_eq!(transaction.update_count(), 0);
    assert_eq!(transaction.removal_count(), 0);
}

#[test]
fn test_recording_all_kinds() {
    let mut transaction = Transaction::new();
    transaction.reset_item(1, Some(payload()));
    transaction.update_item(1, |_| {});
    transaction.remove_item(2);

    assert!(!transaction.is_empty());
    assert_eq!(transaction.reset_count(), 1);
    assert_eq!(transaction.update_count(), 1);
    assert_eq!(transaction.removal_count(), 1);
}

#[test]
fn test_reset_with_empty_payload_redirects_to_removal() {
    let mut transaction = Transaction::new();
    transaction.reset_item(5, None);

    assert_eq!(transaction.reset_count(), 0);
    assert_eq!(transaction.removal_count(), 1);

    let (_, _, removals) = transaction.into_parts();
    assert_eq!(removals, vec![5]);
}

// ============================================================================
// Tests: merge
// ============================================================================

#[test]
fn test_merge_concatenates_preserving_order() {
    let mut first = Transaction::new();
    first.reset_item(1, Some(payload()));
    first.remove_item(2);

    let mut second = Transaction::new();
    second.reset_item(3, Some(payload()));
    second.remove_item(4);

    first.merge(second);

    let (resets, _, removals) = first.into_parts();
    let reset_ids: Vec<_> = resets.iter().map(|(id, _)| *id).collect();
    assert_eq!(reset_ids, vec![1, 3]);
    assert_eq!(removals, vec![2, 4]);
}

#[test]
fn test_merge_is_associative() {
    fn sample(base: ItemId) -> Transaction {
        let mut transaction = Transaction::new();
        transaction.reset_item(base, Some(payload()));
        transaction.update_item(base, |_| {});
        transaction.remove_item(base + 1);
        transaction
    }

    // (T1 + T2) + T3
    let mut left = sample(10);
    left.merge(sample(20));
    left.merge(sample(30));

    // T1 + (T2 + T3)
    let mut inner = sample(20);
    inner.merge(sample(30));
    let mut right = sample(10);
    right.merge(inner);

    let (l_resets, l_updates, l_removals) = left.into_parts();
    let (r_resets, r_updates, r_removals) = right.into_parts();

    let l_reset_ids: Vec<_> = l_resets.iter().map(|(id, _)| *id).collect();
    let r_reset_ids: Vec<_> = r_resets.iter().map(|(id, _)| *id).collect();
    let l_update_ids: Vec<_> = l_updates.iter().map(|(id, _)| *id).collect();
    let r_update_ids: Vec<_> = r_updates.iter().map(|(id, _)| *id).collect();

    assert_eq!(l_reset_ids, r_reset_ids);
    assert_eq!(l_update_ids, r_update_ids);
    assert_eq!(l_removals, r_removals);
}

// ============================================================================
// Tests: queue
// ============================================================================

#[test]
fn test_queue_starts_empty() {
    let queue = TransactionQueue::new();
    assert!(queue.is_empty());
    assert_eq!(queue.len(), 0);
}

#[test]
fn test_drain_consolidates_in_fifo_order() {
    let queue = TransactionQueue::new();

    let mut first = Transaction::new();
    first.remove_item(1);
    let mut second = Transaction::new();
    second.remove_item(2);

    queue.enqueue(first);
    queue.enqueue(second);
    assert_eq!(queue.len(), 2);

    let consolidated = queue.drain_and_merge();
    assert!(queue.is_empty());

    let (_, _, removals) = consolidated.into_parts();
    assert_eq!(removals, vec![1, 2]);
}

#[test]
fn test_drain_of_empty_queue_yields_empty_transaction() {
    let queue = TransactionQueue::new();
    let consolidated = queue.drain_and_merge();
    assert!(consolidated.is_empty());
}

#[test]
fn test_enqueue_after_drain_lands_in_next_cycle() {
    let queue = TransactionQueue::new();

    let mut first = Transaction::new();
    first.remove_item(1);
    queue.enqueue(first);

    let drained = queue.drain_and_merge();
    assert_eq!(drained.removal_count(), 1);

    let mut late = Transaction::new();
    late.remove_item(2);
    queue.enqueue(late);

    let next = queue.drain_and_merge();
    let (_, _, removals) = next.into_parts();
    assert_eq!(removals, vec![2]);
}

#[test]
fn test_concurrent_producers_lose_nothing() {
    use std::sync::Arc;

    let queue = Arc::new(TransactionQueue::new());
    let mut handles = Vec::new();

    for producer in 0..4u32 {
        let queue = queue.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..50u32 {
                let mut transaction = Transaction::new();
                transaction.remove_item(producer * 1000 + i);
                queue.enqueue(transaction);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let consolidated = queue.drain_and_merge();
    let (_, _, removals) = consolidated.into_parts();
    assert_eq!(removals.len(), 200);

    // Per-producer FIFO order survives the merge
    for producer in 0..4u32 {
        let ids: Vec<_> = removals
            .iter()
            .filter(|id| *id / 1000 == producer)
            .copied()
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }
}
