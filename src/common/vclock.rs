//! Vector clocks for causal ordering of writes
//!
//! Each replica keeps a counter per node id. Comparison is component-wise
//! over the union of ids appearing in either clock; merging during
//! replication only ever takes component-wise maxima.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replica identifier
pub type NodeId = String;

/// Outcome of comparing two vector clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrder {
    /// Left strictly descends from right
    Dominates,
    /// Right strictly descends from left
    Dominated,
    /// Identical histories
    Equal,
    /// Neither descends from the other (siblings)
    Concurrent,
}

/// Per-replica monotonic counters capturing causal write history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    counters: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for a node, zero if absent
    pub fn get(&self, node: &str) -> u64 {
        self.counters.get(node).copied().unwrap_or(0)
    }

    /// Increment this node's own component and return its new value
    pub fn increment(&mut self, node: &str) -> u64 {
        let counter = self.counters.entry(node.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Merge another clock in, taking component-wise maxima.
    /// Never decreases any counter.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, &counter) in &other.counters {
            let entry = self.counters.entry(node.clone()).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
    }

    /// Compare against another clock over the union of node ids.
    pub fn compare(&self, other: &VectorClock) -> ClockOrder {
        let mut greater = false;
        let mut less = false;

        for node in self.counters.keys().chain(other.counters.keys()) {
            let a = self.get(node);
            let b = other.get(node);
            if a > b {
                greater = true;
            } else if a < b {
                less = true;
            }
        }

        match (greater, less) {
            (false, false) => ClockOrder::Equal,
            (true, false) => ClockOrder::Dominates,
            (false, true) => ClockOrder::Dominated,
            (true, true) => ClockOrder::Concurrent,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Iterate over (node, counter) pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &u64)> {
        self.counters.iter()
    }
}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (node, counter)) in self.counters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", node, counter)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(NodeId, u64)> for VectorClock {
    fn from_iter<T: IntoIterator<Item = (NodeId, u64)>>(iter: T) -> Self {
        Self {
            counters: iter.into_iter().collect(),
        }
    }
}
