//! Replica node actor
//!
//! Each `Node` exclusively owns one replica's store, vector clock, and
//! replication log. The coordinator and peers never reach into the store
//! directly; everything goes through `coordinate_write`, `apply_write`, and
//! `read`, and a node processes one inbound operation at a time.
//!
//! Two write paths share one storage routine:
//! - `coordinate_write` is the origin side of a client write: it merges the
//!   caller's context clock, increments this node's own component, and
//!   stamps the version.
//! - `apply_write` is the replica/repair side: it stores an already-stamped
//!   entry verbatim and merges its clock by component-wise maxima only.
//!   Live replica deliveries and anti-entropy replay both use it.

pub mod log;

use crate::common::{ClockOrder, Error, NodeId, Result, VectorClock, VersionedValue};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use log::{LogEntry, ReplicationLog};

/// Replica lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Active,
    /// Cut off from at least one peer; still serves its own side of the cut
    Partitioned,
    Down,
}

impl NodeState {
    /// Can this node process reads and writes addressed to it?
    pub fn can_serve(&self) -> bool {
        matches!(self, NodeState::Active | NodeState::Partitioned)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Active => write!(f, "active"),
            NodeState::Partitioned => write!(f, "partitioned"),
            NodeState::Down => write!(f, "down"),
        }
    }
}

/// Acknowledgment returned from a node's write paths
#[derive(Debug, Clone)]
pub struct WriteAck {
    pub node: NodeId,
    /// Clock of the stored version
    pub clock: VectorClock,
    /// Log offset the write landed at
    pub offset: u64,
}

/// Read-only view of a node for external tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub state: NodeState,
    pub clock: VectorClock,
    pub store: BTreeMap<String, Vec<VersionedValue>>,
}

/// One replica: store, clock, and log, exclusively owned.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    state: NodeState,
    clock: VectorClock,
    store: BTreeMap<String, Vec<VersionedValue>>,
    log: ReplicationLog,
}

impl Node {
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            state: NodeState::Active,
            clock: VectorClock::new(),
            store: BTreeMap::new(),
            log: ReplicationLog::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: NodeState) {
        if self.state != state {
            tracing::info!(node = %self.id, from = %self.state, to = %state, "node state change");
            self.state = state;
        }
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn log(&self) -> &ReplicationLog {
        &self.log
    }

    pub(crate) fn log_mut(&mut self) -> &mut ReplicationLog {
        &mut self.log
    }

    /// Origin side of a client write.
    ///
    /// Merges the caller's context clock, increments this node's own
    /// component, stamps and stores the version, and appends to the log
    /// before acknowledging. The own component must strictly increase;
    /// anything else is a `ClockSkewViolation` and takes the node down.
    pub fn coordinate_write(
        &mut self,
        key: &str,
        value: Bytes,
        context: &VectorClock,
        request_id: &str,
        tick: u64,
    ) -> Result<WriteAck> {
        if !self.state.can_serve() {
            return Err(Error::NodeUnavailable(self.id.clone()));
        }
        if self.log.contains_request(request_id) {
            return self.replay_ack(request_id);
        }

        let before = self.clock.get(&self.id);
        self.clock.merge(context);
        let after = self.clock.increment(&self.id);
        if after <= before {
            self.set_state(NodeState::Down);
            return Err(Error::ClockSkewViolation {
                node: self.id.clone(),
                before,
                after,
            });
        }

        let version = VersionedValue {
            value: value.clone(),
            clock: self.clock.clone(),
            timestamp: tick,
            writer: self.id.clone(),
            request_id: request_id.to_string(),
        };

        // Log append precedes the store mutation and the ack
        let offset = self
            .log
            .append(request_id, key, value, version.clock.clone(), tick, &self.id);
        self.store_version(key, version.clone());

        tracing::debug!(node = %self.id, key, request_id, clock = %version.clock, "coordinated write");
        Ok(WriteAck {
            node: self.id.clone(),
            clock: version.clock,
            offset,
        })
    }

    /// Replica/repair side of a write: store an origin-stamped entry.
    ///
    /// Idempotent by request id, so replaying the same entry through live
    /// delivery and anti-entropy is harmless. The local clock merges the
    /// entry clock by maxima only; no component is ever incremented here.
    pub fn apply_write(&mut self, entry: &LogEntry) -> Result<WriteAck> {
        if !self.state.can_serve() {
            return Err(Error::NodeUnavailable(self.id.clone()));
        }
        if self.log.contains_request(&entry.request_id) {
            return self.replay_ack(&entry.request_id);
        }

        self.clock.merge(&entry.clock);

        let offset = self.log.append(
            &entry.request_id,
            &entry.key,
            entry.value.clone(),
            entry.clock.clone(),
            entry.timestamp,
            &entry.origin,
        );
        self.store_version(
            &entry.key,
            VersionedValue {
                value: entry.value.clone(),
                clock: entry.clock.clone(),
                timestamp: entry.timestamp,
                writer: entry.origin.clone(),
                request_id: entry.request_id.clone(),
            },
        );

        tracing::debug!(node = %self.id, key = %entry.key, request_id = %entry.request_id, "applied replicated write");
        Ok(WriteAck {
            node: self.id.clone(),
            clock: entry.clock.clone(),
            offset,
        })
    }

    /// Current sibling list for a key. Never mutates state.
    pub fn read(&self, key: &str) -> Result<Vec<VersionedValue>> {
        if !self.state.can_serve() {
            return Err(Error::NodeUnavailable(self.id.clone()));
        }
        Ok(self.store.get(key).cloned().unwrap_or_default())
    }

    /// Snapshot for audit and assertions
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id.clone(),
            state: self.state,
            clock: self.clock.clone(),
            store: self.store.clone(),
        }
    }

    /// Insert a version into the sibling set: drop versions it dominates,
    /// ignore it if an existing version dominates it or records the same
    /// originating write.
    fn store_version(&mut self, key: &str, version: VersionedValue) {
        let siblings = self.store.entry(key.to_string()).or_default();
        let mut stale = false;
        siblings.retain(|existing| match version.clock.compare(&existing.clock) {
            ClockOrder::Dominates => false,
            ClockOrder::Equal | ClockOrder::Dominated => {
                stale = true;
                true
            }
            ClockOrder::Concurrent => {
                if existing.same_write(&version) {
                    stale = true;
                }
                true
            }
        });
        if !stale {
            siblings.push(version);
        }
    }

    /// Ack for a write this node already holds (idempotent replay).
    fn replay_ack(&self, request_id: &str) -> Result<WriteAck> {
        let entry = self
            .log
            .entries()
            .iter()
            .rev()
            .find(|e| e.request_id == request_id)
            .ok_or_else(|| {
                Error::Internal(format!(
                    "request {} indexed but missing from log on {}",
                    request_id, self.id
                ))
            })?;
        Ok(WriteAck {
            node: self.id.clone(),
            clock: entry.clock.clone(),
            offset: entry.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(node: &mut Node, key: &str, value: &str, rid: &str, tick: u64) -> WriteAck {
        node.coordinate_write(key, Bytes::from(value.to_string()), &VectorClock::new(), rid, tick)
            .unwrap()
    }

    #[test]
    fn test_coordinate_write_increments_own_component() {
        let mut node = Node::new("a");
        let ack1 = write(&mut node, "k", "1", "rid-1", 1);
        let ack2 = write(&mut node, "k", "2", "rid-2", 2);
        assert_eq!(ack1.clock.get("a"), 1);
        assert_eq!(ack2.clock.get("a"), 2);
        assert_eq!(node.clock().get("a"), 2);
    }

    #[test]
    fn test_dominating_write_replaces() {
        let mut node = Node::new("a");
        write(&mut node, "k", "old", "rid-1", 1);
        write(&mut node, "k", "new", "rid-2", 2);
        let siblings = node.read("k").unwrap();
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].value, Bytes::from_static(b"new"));
    }

    #[test]
    fn test_concurrent_writes_become_siblings() {
        let mut a = Node::new("a");
        let mut b = Node::new("b");
        write(&mut a, "k", "1", "rid-1", 1);
        let ack_b = write(&mut b, "k", "2", "rid-2", 1);

        // Deliver b's write to a: concurrent with a's own version
        let entry = LogEntry {
            offset: 0,
            request_id: "rid-2".into(),
            key: "k".into(),
            value: Bytes::from_static(b"2"),
            clock: ack_b.clock,
            timestamp: 1,
            origin: "b".into(),
        };
        a.apply_write(&entry).unwrap();

        let siblings = a.read("k").unwrap();
        assert_eq!(siblings.len(), 2);
    }

    #[test]
    fn test_apply_write_does_not_increment() {
        let mut a = Node::new("a");
        let mut b = Node::new("b");
        write(&mut a, "k", "1", "rid-1", 1);
        let src = a.log().entries()[0].clone();
        b.apply_write(&src).unwrap();

        // b merged a's clock but added nothing of its own
        assert_eq!(b.clock().get("a"), 1);
        assert_eq!(b.clock().get("b"), 0);
        let siblings = b.read("k").unwrap();
        assert_eq!(siblings[0].clock, src.clock);
    }

    #[test]
    fn test_apply_write_idempotent() {
        let mut a = Node::new("a");
        let mut b = Node::new("b");
        write(&mut a, "k", "1", "rid-1", 1);
        let src = a.log().entries()[0].clone();

        let ack1 = b.apply_write(&src).unwrap();
        let ack2 = b.apply_write(&src).unwrap();
        assert_eq!(ack1.offset, ack2.offset);
        assert_eq!(b.log().len(), 1);
        assert_eq!(b.read("k").unwrap().len(), 1);
    }

    #[test]
    fn test_down_node_refuses_everything() {
        let mut node = Node::new("a");
        node.set_state(NodeState::Down);
        assert!(matches!(
            node.read("k"),
            Err(Error::NodeUnavailable(_))
        ));
        let res = node.coordinate_write(
            "k",
            Bytes::from_static(b"1"),
            &VectorClock::new(),
            "rid-1",
            1,
        );
        assert!(matches!(res, Err(Error::NodeUnavailable(_))));
    }

    #[test]
    fn test_partitioned_node_still_serves() {
        let mut node = Node::new("a");
        node.set_state(NodeState::Partitioned);
        write(&mut node, "k", "1", "rid-1", 1);
        assert_eq!(node.read("k").unwrap().len(), 1);
    }

    #[test]
    fn test_log_append_precedes_ack() {
        let mut node = Node::new("a");
        let ack = write(&mut node, "k", "1", "rid-1", 1);
        let entries = node.log().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, ack.offset);
        assert_eq!(entries[0].request_id, "rid-1");
    }

    #[test]
    fn test_read_of_missing_key_is_empty() {
        let node = Node::new("a");
        assert!(node.read("nope").unwrap().is_empty());
    }
}
