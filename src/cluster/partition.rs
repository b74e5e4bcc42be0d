//! Partition controller: cluster membership and pairwise reachability
//!
//! The single owner of "who can talk to whom". All reachability changes go
//! through `set_partition` / `heal_partition` / `fail_node` / `recover_node`,
//! each an atomic update; everything else only queries. Cut pairs are stored
//! normalized so the matrix is symmetric by construction.

use crate::common::{Error, NodeId, Result};
use crate::node::NodeState;
use std::collections::BTreeSet;

/// Cluster membership plus the reachability matrix.
#[derive(Debug, Clone)]
pub struct PartitionController {
    members: BTreeSet<NodeId>,
    /// Unreachable pairs, stored as (min, max)
    cut: BTreeSet<(NodeId, NodeId)>,
    down: BTreeSet<NodeId>,
}

fn pair(a: &str, b: &str) -> (NodeId, NodeId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl PartitionController {
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            members: members.into_iter().collect(),
            cut: BTreeSet::new(),
            down: BTreeSet::new(),
        }
    }

    pub fn members(&self) -> impl Iterator<Item = &NodeId> {
        self.members.iter()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// Can `a` and `b` currently exchange messages?
    ///
    /// A node reaches itself iff it is not down.
    pub fn reachable(&self, a: &str, b: &str) -> bool {
        if self.down.contains(a) || self.down.contains(b) {
            return false;
        }
        if a == b {
            return true;
        }
        !self.cut.contains(&pair(a, b))
    }

    /// Split the cluster into two groups; every cross-group pair becomes
    /// unreachable. The groups must be disjoint, non-empty, and cover the
    /// full membership (no partial or overlapping partitions in v1).
    pub fn set_partition(&mut self, group_a: &[NodeId], group_b: &[NodeId]) -> Result<()> {
        let a: BTreeSet<&NodeId> = group_a.iter().collect();
        let b: BTreeSet<&NodeId> = group_b.iter().collect();

        if a.is_empty() || b.is_empty() {
            return Err(Error::InvalidPartition("both groups must be non-empty".into()));
        }
        if let Some(shared) = a.intersection(&b).next() {
            return Err(Error::InvalidPartition(format!(
                "node {} appears in both groups",
                shared
            )));
        }
        for id in a.iter().chain(b.iter()) {
            if !self.members.contains(*id) {
                return Err(Error::UnknownNode((*id).clone()));
            }
        }
        if a.len() + b.len() != self.members.len() {
            return Err(Error::InvalidPartition(
                "groups must cover the full membership".into(),
            ));
        }

        self.cut.clear();
        for x in &a {
            for y in &b {
                self.cut.insert(pair(x, y));
            }
        }
        tracing::info!(
            group_a = ?group_a,
            group_b = ?group_b,
            cut_pairs = self.cut.len(),
            "partition installed"
        );
        Ok(())
    }

    /// Restore full reachability. Returns the pairs that were cut, so the
    /// cluster can schedule anti-entropy between every reconnected pair.
    pub fn heal_partition(&mut self) -> Vec<(NodeId, NodeId)> {
        let healed: Vec<_> = std::mem::take(&mut self.cut).into_iter().collect();
        if !healed.is_empty() {
            tracing::info!(reconnected_pairs = healed.len(), "partition healed");
        }
        healed
    }

    /// Take a node down entirely: it stops responding to everyone.
    /// Distinct from a partition, which only cuts specific pairs.
    pub fn fail_node(&mut self, id: &str) -> Result<()> {
        if !self.members.contains(id) {
            return Err(Error::UnknownNode(id.to_string()));
        }
        if self.down.insert(id.to_string()) {
            tracing::info!(node = id, "node failed");
        }
        Ok(())
    }

    /// Bring a failed node back. Returns the peers it can now reach, so the
    /// cluster can schedule anti-entropy toward each of them.
    pub fn recover_node(&mut self, id: &str) -> Result<Vec<NodeId>> {
        if !self.members.contains(id) {
            return Err(Error::UnknownNode(id.to_string()));
        }
        if !self.down.remove(id) {
            return Ok(Vec::new());
        }
        tracing::info!(node = id, "node recovered");
        Ok(self
            .members
            .iter()
            .filter(|peer| *peer != id && self.reachable(id, peer))
            .cloned()
            .collect())
    }

    pub fn is_down(&self, id: &str) -> bool {
        self.down.contains(id)
    }

    /// Lifecycle state implied by the matrix for one node.
    pub fn derived_state(&self, id: &str) -> NodeState {
        if self.down.contains(id) {
            return NodeState::Down;
        }
        let cut_from_peer = self
            .cut
            .iter()
            .any(|(x, y)| x == id || y == id);
        if cut_from_peer {
            NodeState::Partitioned
        } else {
            NodeState::Active
        }
    }
}
