//! Cluster wiring: nodes, reachability, and the logical clock
//!
//! The `Cluster` owns every node, the partition controller, the pending
//! asynchronous deliveries (AP propagation), and the anti-entropy queue.
//! Everything advances on one logical tick, so a run is a deterministic
//! function of configuration and event sequence.

pub mod antientropy;
pub mod partition;

use crate::common::{frontier, ClusterConfig, Error, NodeId, Result};
use crate::node::{LogEntry, Node, NodeSnapshot, NodeState};
use antientropy::{sync_pair, AntiEntropyQueue};
use partition::PartitionController;
use std::collections::{BTreeMap, VecDeque};

/// A replicated write queued for asynchronous delivery (AP propagation).
#[derive(Debug, Clone)]
pub struct PendingDelivery {
    pub from: NodeId,
    pub to: NodeId,
    pub entry: LogEntry,
}

/// The simulated cluster.
#[derive(Debug)]
pub struct Cluster {
    config: ClusterConfig,
    nodes: BTreeMap<NodeId, Node>,
    partitions: PartitionController,
    tick: u64,
    deliveries: VecDeque<PendingDelivery>,
    anti_entropy: AntiEntropyQueue,
}

impl Cluster {
    /// Bootstrap with explicit node ids. The node set is fixed for the
    /// lifetime of the cluster; only states change afterwards.
    pub fn bootstrap_named(
        config: ClusterConfig,
        ids: impl IntoIterator<Item = impl Into<NodeId>>,
    ) -> Result<Self> {
        config.validate()?;
        let nodes: BTreeMap<NodeId, Node> = ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                (id.clone(), Node::new(id))
            })
            .collect();
        if nodes.len() != config.cluster_size {
            return Err(Error::InvalidConfig(format!(
                "expected {} node ids, got {}",
                config.cluster_size,
                nodes.len()
            )));
        }
        let partitions = PartitionController::new(nodes.keys().cloned());
        tracing::info!(size = nodes.len(), "cluster bootstrapped");
        Ok(Self {
            config,
            nodes,
            partitions,
            tick: 0,
            deliveries: VecDeque::new(),
            anti_entropy: AntiEntropyQueue::new(),
        })
    }

    /// Bootstrap with generated ids `n1..nN`.
    pub fn bootstrap(config: ClusterConfig) -> Result<Self> {
        let ids: Vec<String> = (1..=config.cluster_size).map(|i| format!("n{}", i)).collect();
        Self::bootstrap_named(config, ids)
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn node(&self, id: &str) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::UnknownNode(id.to_string()))
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::UnknownNode(id.to_string()))
    }

    pub fn partitions(&self) -> &PartitionController {
        &self.partitions
    }

    // === Reachability events (the only mutators of the matrix) ===

    /// Install a full bipartition of the node set.
    pub fn set_partition(&mut self, group_a: &[NodeId], group_b: &[NodeId]) -> Result<()> {
        self.partitions.set_partition(group_a, group_b)?;
        self.refresh_states();
        Ok(())
    }

    /// Restore full reachability and schedule anti-entropy between every
    /// reconnected pair.
    pub fn heal_partition(&mut self) {
        let pairs = self.partitions.heal_partition();
        self.anti_entropy.schedule(pairs);
        self.refresh_states();
    }

    /// Take a node down entirely. Undelivered messages to it are lost.
    pub fn fail_node(&mut self, id: &str) -> Result<()> {
        self.partitions.fail_node(id)?;
        self.refresh_states();
        Ok(())
    }

    /// Bring a failed node back and schedule anti-entropy toward every
    /// reachable peer.
    pub fn recover_node(&mut self, id: &str) -> Result<()> {
        let peers = self.partitions.recover_node(id)?;
        self.anti_entropy
            .schedule(peers.into_iter().map(|peer| (id.to_string(), peer)));
        self.refresh_states();
        Ok(())
    }

    /// Mark a node failed without going through the scenario surface.
    /// Used when a node raises a fatal invariant violation.
    pub(crate) fn quarantine_node(&mut self, id: &str) {
        let _ = self.partitions.fail_node(id);
        self.refresh_states();
    }

    fn refresh_states(&mut self) {
        for (id, node) in &mut self.nodes {
            node.set_state(self.partitions.derived_state(id));
        }
    }

    // === Logical clock ===

    /// Advance one tick: deliver queued asynchronous writes, then drain a
    /// bounded amount of anti-entropy work. Background work only makes
    /// progress here, never inside a foreground operation.
    pub fn advance_tick(&mut self) {
        self.tick += 1;

        let queued = std::mem::take(&mut self.deliveries);
        for delivery in queued {
            if !self.partitions.reachable(&delivery.from, &delivery.to) {
                // Lost to the partition; anti-entropy repairs it after heal
                tracing::debug!(
                    from = %delivery.from,
                    to = %delivery.to,
                    request_id = %delivery.entry.request_id,
                    "async delivery dropped"
                );
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&delivery.to) {
                if let Err(e) = node.apply_write(&delivery.entry) {
                    tracing::warn!(to = %delivery.to, error = %e, "async delivery failed");
                }
            }
        }

        for _ in 0..self.config.anti_entropy_pairs_per_tick {
            let Some((a, b)) = self.anti_entropy.next_pair() else {
                break;
            };
            if !self.partitions.reachable(&a, &b) {
                // Cut again before repair ran; the next heal reschedules it
                continue;
            }
            self.sync_nodes(&a, &b);
        }
    }

    /// Advance until the logical clock reaches `target`.
    pub fn advance_to(&mut self, target: u64) {
        while self.tick < target {
            self.advance_tick();
        }
    }

    /// Anti-entropy pairs still awaiting reconciliation.
    pub fn anti_entropy_pending(&self) -> usize {
        self.anti_entropy.pending()
    }

    /// Asynchronous writes still queued for delivery.
    pub fn deliveries_pending(&self) -> usize {
        self.deliveries.len()
    }

    /// Queue a replicated write for delivery on a subsequent tick.
    pub(crate) fn queue_delivery(&mut self, from: &str, to: &str, entry: LogEntry) {
        self.deliveries.push_back(PendingDelivery {
            from: from.to_string(),
            to: to.to_string(),
            entry,
        });
    }

    fn sync_nodes(&mut self, a: &str, b: &str) {
        // Both nodes come out of the map so the pass can borrow them mutably
        let Some(mut node_a) = self.nodes.remove(a) else {
            return;
        };
        let Some(mut node_b) = self.nodes.remove(b) else {
            self.nodes.insert(a.to_string(), node_a);
            return;
        };
        if let Err(e) = sync_pair(&mut node_a, &mut node_b) {
            tracing::warn!(a, b, error = %e, "anti-entropy pass failed");
        }
        self.nodes.insert(a.to_string(), node_a);
        self.nodes.insert(b.to_string(), node_b);
    }

    // === Observation surface ===

    pub fn get_node_state(&self, id: &str) -> Result<NodeSnapshot> {
        Ok(self.node(id)?.snapshot())
    }

    pub fn get_log(&self, id: &str) -> Result<Vec<LogEntry>> {
        Ok(self.node(id)?.log().entries().to_vec())
    }

    /// Do all serving nodes agree on the causal frontier for a key?
    pub fn converged(&self, key: &str) -> bool {
        let mut reference: Option<Vec<String>> = None;
        for node in self.nodes.values() {
            if node.state() == NodeState::Down {
                continue;
            }
            let siblings = match node.read(key) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let ids: Vec<String> = frontier(siblings)
                .into_iter()
                .map(|v| v.request_id)
                .collect();
            match &reference {
                None => reference = Some(ids),
                Some(expected) if *expected != ids => return false,
                Some(_) => {}
            }
        }
        true
    }
}
