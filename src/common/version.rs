//! Versioned values and sibling sets

use crate::common::vclock::{ClockOrder, NodeId, VectorClock};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One version of a key's value.
///
/// Multiple versions of the same key whose clocks are mutually concurrent
/// are siblings; they coexist in a node's store until a later write
/// dominates them or a resolution policy collapses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: Bytes,
    pub clock: VectorClock,
    /// Logical tick at which the originating write was coordinated
    pub timestamp: u64,
    /// Node that coordinated the originating write
    pub writer: NodeId,
    /// Client request id; identifies the write across replicas
    pub request_id: String,
}

impl VersionedValue {
    /// Causal relation to another version
    pub fn compare(&self, other: &VersionedValue) -> ClockOrder {
        self.clock.compare(&other.clock)
    }

    /// Same originating write, possibly stored on different replicas
    pub fn same_write(&self, other: &VersionedValue) -> bool {
        self.request_id == other.request_id
    }
}

/// Reduce a collection of versions (possibly gathered from several
/// replicas) to its causal frontier.
///
/// Versions recording the same originating write are collapsed first, then
/// every version dominated by another is dropped. What remains is either a
/// single winner or a set of mutually concurrent siblings, ordered by
/// (timestamp, writer, request id) so callers see a deterministic list.
pub fn frontier(versions: Vec<VersionedValue>) -> Vec<VersionedValue> {
    let mut distinct: Vec<VersionedValue> = Vec::new();
    for version in versions {
        if !distinct.iter().any(|kept| kept.same_write(&version)) {
            distinct.push(version);
        }
    }

    let mut result: Vec<VersionedValue> = Vec::new();
    for candidate in &distinct {
        let dominated = distinct.iter().any(|other| {
            !candidate.same_write(other)
                && matches!(candidate.compare(other), ClockOrder::Dominated)
        });
        if !dominated {
            result.push(candidate.clone());
        }
    }

    result.sort_by(|a, b| {
        (a.timestamp, &a.writer, &a.request_id).cmp(&(b.timestamp, &b.writer, &b.request_id))
    });
    result
}
