//! Anti-entropy: pairwise log reconciliation after heal or recovery
//!
//! Each reconnected pair exchanges the log suffixes the other side has not
//! yet replayed, in both directions, through the same `apply_write` path as
//! live traffic. The work queue drains a bounded number of pairs per tick so
//! repair never blocks foreground operations and its progress is observable.

use crate::common::{NodeId, Result};
use crate::node::Node;
use std::collections::VecDeque;

/// Pending reconciliation work, drained at tick boundaries.
#[derive(Debug, Default)]
pub struct AntiEntropyQueue {
    pending: VecDeque<(NodeId, NodeId)>,
}

impl AntiEntropyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue pairs to reconcile; already-queued pairs are not duplicated.
    pub fn schedule(&mut self, pairs: impl IntoIterator<Item = (NodeId, NodeId)>) {
        for (a, b) in pairs {
            let normalized = if a <= b { (a, b) } else { (b, a) };
            if !self.pending.contains(&normalized) {
                self.pending.push_back(normalized);
            }
        }
        if !self.pending.is_empty() {
            tracing::debug!(pending = self.pending.len(), "anti-entropy scheduled");
        }
    }

    pub fn next_pair(&mut self) -> Option<(NodeId, NodeId)> {
        self.pending.pop_front()
    }

    /// Pairs still awaiting reconciliation
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Reconcile two reconnected nodes in both directions.
///
/// Ships each side the suffix of the other's log past the highest offset it
/// is known to have replayed, replays it via `apply_write` (idempotent by
/// request id), and advances the acked offsets. Returns entries applied in
/// each direction.
pub fn sync_pair(a: &mut Node, b: &mut Node) -> Result<(usize, usize)> {
    let a_to_b = ship_suffix(a, b)?;
    let b_to_a = ship_suffix(b, a)?;
    if a_to_b > 0 || b_to_a > 0 {
        tracing::info!(
            from_a = a.id(),
            from_b = b.id(),
            applied_a_to_b = a_to_b,
            applied_b_to_a = b_to_a,
            "anti-entropy pass"
        );
    }
    Ok((a_to_b, b_to_a))
}

fn ship_suffix(from: &mut Node, to: &mut Node) -> Result<usize> {
    let start = from.log().acked_offset(to.id());
    let suffix: Vec<_> = from.log().entries_after(start).to_vec();
    let mut applied = 0;
    for entry in &suffix {
        to.apply_write(entry)?;
        applied += 1;
    }
    let seen = from.log().len();
    let to_id = to.id().to_string();
    from.log_mut().record_ack(&to_id, seen);
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::VectorClock;
    use bytes::Bytes;

    fn write(node: &mut Node, key: &str, value: &str, rid: &str, tick: u64) {
        node.coordinate_write(key, Bytes::from(value.to_string()), &VectorClock::new(), rid, tick)
            .unwrap();
    }

    #[test]
    fn test_queue_dedupes_pairs() {
        let mut q = AntiEntropyQueue::new();
        q.schedule(vec![
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
            ("a".to_string(), "c".to_string()),
        ]);
        assert_eq!(q.pending(), 2);
    }

    #[test]
    fn test_sync_exchanges_both_directions() {
        let mut a = Node::new("a");
        let mut b = Node::new("b");
        write(&mut a, "x", "1", "rid-1", 1);
        write(&mut b, "y", "2", "rid-2", 1);

        let (a_to_b, b_to_a) = sync_pair(&mut a, &mut b).unwrap();
        assert_eq!((a_to_b, b_to_a), (1, 1));
        assert_eq!(b.read("x").unwrap().len(), 1);
        assert_eq!(a.read("y").unwrap().len(), 1);
    }

    #[test]
    fn test_second_sync_ships_nothing() {
        let mut a = Node::new("a");
        let mut b = Node::new("b");
        write(&mut a, "x", "1", "rid-1", 1);

        sync_pair(&mut a, &mut b).unwrap();
        let (a_to_b, b_to_a) = sync_pair(&mut a, &mut b).unwrap();
        assert_eq!((a_to_b, b_to_a), (0, 0));
        // b replayed a's entry, so b's log grew; a must not re-apply it
        assert_eq!(a.log().len(), 1);
        assert_eq!(b.log().len(), 1);
    }

    #[test]
    fn test_sync_is_idempotent_under_duplicate_delivery() {
        let mut a = Node::new("a");
        let mut b = Node::new("b");
        let mut c = Node::new("c");
        write(&mut a, "x", "1", "rid-1", 1);

        // a's write reaches c both directly and via b
        sync_pair(&mut a, &mut b).unwrap();
        sync_pair(&mut a, &mut c).unwrap();
        sync_pair(&mut b, &mut c).unwrap();

        assert_eq!(c.log().len(), 1);
        assert_eq!(c.read("x").unwrap().len(), 1);
    }
}
