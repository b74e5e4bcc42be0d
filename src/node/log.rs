//! Per-node replication log
//!
//! Append-only operation history, one per replica. Every write a node
//! applies lands here before it is acknowledged; anti-entropy ships log
//! suffixes between reconnecting peers and replays them through the same
//! apply path used for live traffic.
//!
//! Entries carry the originating request id so replay is idempotent:
//! an entry that reaches a node twice (live delivery plus repair, or
//! repair via two different peers) is applied once.

use crate::common::{NodeId, VectorClock};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One replicated write as recorded in a node's log.
///
/// The clock is the one stamped by the coordinating node; replicas store it
/// verbatim so the same write carries the same causal history everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in this node's log (0-based, dense)
    pub offset: u64,
    pub request_id: String,
    pub key: String,
    pub value: Bytes,
    pub clock: VectorClock,
    /// Logical tick of the originating write
    pub timestamp: u64,
    /// Node that coordinated the originating write
    pub origin: NodeId,
}

/// Append-only per-node operation history.
#[derive(Debug, Default)]
pub struct ReplicationLog {
    entries: Vec<LogEntry>,
    seen_requests: HashSet<String>,
    /// Highest offset of *this* log each peer is known to have replayed
    acked_by_peer: BTreeMap<NodeId, u64>,
}

impl ReplicationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a write. Returns the offset assigned to this entry.
    pub fn append(
        &mut self,
        request_id: &str,
        key: &str,
        value: Bytes,
        clock: VectorClock,
        timestamp: u64,
        origin: &str,
    ) -> u64 {
        let offset = self.entries.len() as u64;
        self.entries.push(LogEntry {
            offset,
            request_id: request_id.to_string(),
            key: key.to_string(),
            value,
            clock,
            timestamp,
            origin: origin.to_string(),
        });
        self.seen_requests.insert(request_id.to_string());
        offset
    }

    /// Has a write with this request id already been applied?
    pub fn contains_request(&self, request_id: &str) -> bool {
        self.seen_requests.contains(request_id)
    }

    /// Entries strictly after `offset` positions, i.e. the suffix a peer
    /// that has replayed `offset` entries still needs.
    pub fn entries_after(&self, offset: u64) -> &[LogEntry] {
        let start = (offset as usize).min(self.entries.len());
        &self.entries[start..]
    }

    /// Full ordered history (audit / golden-file comparison).
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many of this log's entries the peer is known to have replayed.
    pub fn acked_offset(&self, peer: &str) -> u64 {
        self.acked_by_peer.get(peer).copied().unwrap_or(0)
    }

    /// Record that a peer has replayed this log up to `offset` entries.
    /// Never moves backwards.
    pub fn record_ack(&mut self, peer: &str, offset: u64) {
        let entry = self.acked_by_peer.entry(peer.to_string()).or_insert(0);
        if offset > *entry {
            *entry = offset;
        }
    }
}
