//! Operation coordinator: policy dispatch and quorum arithmetic
//!
//! The coordinator routes each client operation to the replicas reachable
//! from its target node, counts acknowledgments against the selected
//! consistency policy, and hands concurrent read results to the conflict
//! resolver. Quorum thresholds are always compared against the *reachable*
//! replica set, never total membership.
//!
//! Failure semantics: `NodeUnavailable` and `QuorumUnavailable` are returned
//! to the caller as-is. The coordinator never retries internally; retry
//! policy belongs to the caller, which keeps runs reproducible.

pub mod resolver;

use crate::cluster::Cluster;
use crate::common::{
    ClusterConfig, ConsistencyPolicy, Error, NodeId, ResolutionPolicyKind, Result, VectorClock,
    VersionedValue,
};
use crate::node::LogEntry;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub use resolver::{ConflictResolver, MergeFn, ResolutionPolicy, ResolvedRead};

/// Client operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
}

/// One client operation, alive for the duration of a single submit call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Bytes>,
    pub request_id: String,
    /// Node the client addressed; it coordinates the operation
    pub target: NodeId,
    /// Per-operation policy override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<ConsistencyPolicy>,
}

impl Operation {
    pub fn write(target: &str, key: &str, value: impl Into<Bytes>, request_id: &str) -> Self {
        Self {
            kind: OperationKind::Write,
            key: key.to_string(),
            value: Some(value.into()),
            request_id: request_id.to_string(),
            target: target.to_string(),
            policy: None,
        }
    }

    pub fn read(target: &str, key: &str, request_id: &str) -> Self {
        Self {
            kind: OperationKind::Read,
            key: key.to_string(),
            value: None,
            request_id: request_id.to_string(),
            target: target.to_string(),
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: ConsistencyPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Aggregate outcome of one coordinated operation.
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// Replicas that acknowledged before the result was returned
    pub ack_count: usize,
    /// Surviving versions (siblings when concurrent and kept)
    pub versions: Vec<VersionedValue>,
    /// Resolved value, when the policy produces a single one
    pub value: Option<Bytes>,
}

/// Routes operations to replicas per the selected consistency policy.
#[derive(Debug)]
pub struct Coordinator {
    default_policy: ConsistencyPolicy,
    resolver: ConflictResolver,
    read_repair: bool,
}

impl Coordinator {
    pub fn new(config: &ClusterConfig) -> Self {
        let policy = match config.resolution {
            ResolutionPolicyKind::LastWriteWins => ResolutionPolicy::LastWriteWins,
            ResolutionPolicyKind::KeepAllSiblings => ResolutionPolicy::KeepAllSiblings,
        };
        Self {
            default_policy: config.policy,
            resolver: ConflictResolver::new(policy),
            read_repair: config.read_repair,
        }
    }

    /// Replace the resolver, e.g. to install an application merge.
    pub fn with_resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Submit one operation. Never retries; errors are ordinary outcomes.
    pub fn submit(&self, cluster: &mut Cluster, op: &Operation) -> Result<OperationResult> {
        let policy = op.policy.unwrap_or(self.default_policy);
        policy.validate(cluster.config().cluster_size)?;

        if !cluster.partitions().contains(&op.target) {
            return Err(Error::UnknownNode(op.target.clone()));
        }
        if cluster.partitions().is_down(&op.target) {
            return Err(Error::NodeUnavailable(op.target.clone()));
        }

        match op.kind {
            OperationKind::Write => {
                let value = op
                    .value
                    .clone()
                    .ok_or_else(|| Error::InvalidConfig("write without a value".into()))?;
                self.write(cluster, op, value, policy)
            }
            OperationKind::Read => self.read(cluster, op, policy),
        }
    }

    /// Replica candidates for a key addressed at `target`.
    ///
    /// Strict and AP policies replicate to the whole cluster, target first.
    /// Tunable policies replicate to the key's owner set: `n` consecutive
    /// members on the id ring starting at the key's hash, so the same key
    /// maps to the same owners whichever node coordinates. The target is
    /// moved to the front when it is an owner.
    fn candidates(cluster: &Cluster, key: &str, target: &str, policy: ConsistencyPolicy) -> Vec<NodeId> {
        if let ConsistencyPolicy::Tunable { n, .. } = policy {
            let mut owners = Self::key_owners(cluster, key, n);
            if let Some(pos) = owners.iter().position(|id| id.as_str() == target) {
                let first = owners.remove(pos);
                owners.insert(0, first);
            }
            return owners;
        }
        let mut out = vec![target.to_string()];
        out.extend(
            cluster
                .node_ids()
                .filter(|id| id.as_str() != target)
                .cloned(),
        );
        out
    }

    /// Owner set for a key: `n` consecutive members in id order, starting
    /// at the key's hash. Deterministic per key and membership.
    fn key_owners(cluster: &Cluster, key: &str, n: usize) -> Vec<NodeId> {
        let members: Vec<&NodeId> = cluster.node_ids().collect();
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let start = (hasher.finish() as usize) % members.len();
        (0..n.min(members.len()))
            .map(|i| members[(start + i) % members.len()].clone())
            .collect()
    }

    fn reachable_candidates(
        cluster: &Cluster,
        key: &str,
        target: &str,
        policy: ConsistencyPolicy,
    ) -> Vec<NodeId> {
        Self::candidates(cluster, key, target, policy)
            .into_iter()
            .filter(|id| cluster.partitions().reachable(target, id))
            .collect()
    }

    fn write(
        &self,
        cluster: &mut Cluster,
        op: &Operation,
        value: Bytes,
        policy: ConsistencyPolicy,
    ) -> Result<OperationResult> {
        let reachable = Self::reachable_candidates(cluster, &op.key, &op.target, policy);
        let needed = policy.write_quorum();

        if reachable.len() < needed {
            tracing::debug!(
                key = %op.key,
                target = %op.target,
                needed,
                reachable = reachable.len(),
                "write quorum unavailable"
            );
            return Err(Error::QuorumUnavailable {
                needed,
                reachable: reachable.len(),
            });
        }

        // Coordinate at the first reachable candidate (the target itself
        // unless a tunable owner set excludes it): stamp the clock, log,
        // store
        let origin = reachable[0].clone();
        let tick = cluster.tick();
        let context = VectorClock::new();
        let ack = match cluster.node_mut(&origin)?.coordinate_write(
            &op.key,
            value.clone(),
            &context,
            &op.request_id,
            tick,
        ) {
            Ok(ack) => ack,
            Err(e) => {
                if e.is_fatal() {
                    cluster.quarantine_node(&origin);
                }
                return Err(e);
            }
        };
        let entry = cluster.node(&origin)?.log().entries()[ack.offset as usize].clone();

        let mut ack_count = 1;
        match policy {
            ConsistencyPolicy::Available => {
                // Accepted at one replica; the rest is asynchronous
                for peer in Self::candidates(cluster, &op.key, &op.target, policy) {
                    if peer != origin {
                        cluster.queue_delivery(&origin, &peer, entry.clone());
                    }
                }
            }
            ConsistencyPolicy::Strict { .. } | ConsistencyPolicy::Tunable { .. } => {
                // Dispatch to every reachable replica; acks past the quorum
                // still land on their stores, they just don't change the
                // already-determined result
                for peer in &reachable {
                    if peer == &origin {
                        continue;
                    }
                    match cluster.node_mut(peer)?.apply_write(&entry) {
                        Ok(_) => ack_count += 1,
                        Err(e) => {
                            tracing::warn!(peer = %peer, error = %e, "replica write failed")
                        }
                    }
                }
                if ack_count < needed {
                    return Err(Error::QuorumUnavailable {
                        needed,
                        reachable: ack_count,
                    });
                }
            }
        }

        tracing::debug!(key = %op.key, target = %op.target, ack_count, "write complete");
        Ok(OperationResult {
            ack_count,
            versions: Vec::new(),
            value: Some(value),
        })
    }

    fn read(
        &self,
        cluster: &mut Cluster,
        op: &Operation,
        policy: ConsistencyPolicy,
    ) -> Result<OperationResult> {
        let reachable = Self::reachable_candidates(cluster, &op.key, &op.target, policy);
        let needed = policy.read_quorum();

        if reachable.len() < needed {
            tracing::debug!(
                key = %op.key,
                target = %op.target,
                needed,
                reachable = reachable.len(),
                "read quorum unavailable"
            );
            return Err(Error::QuorumUnavailable {
                needed,
                reachable: reachable.len(),
            });
        }

        // AP reads take the first reachable replica's view as-is; quorum
        // reads collect from every reachable replica
        let responders: Vec<NodeId> = match policy {
            ConsistencyPolicy::Available => reachable.into_iter().take(1).collect(),
            _ => reachable,
        };

        let mut collected = Vec::new();
        let mut ack_count = 0;
        for id in &responders {
            match cluster.node(id)?.read(&op.key) {
                Ok(siblings) => {
                    collected.extend(siblings);
                    ack_count += 1;
                }
                Err(e) => tracing::warn!(replica = %id, error = %e, "replica read failed"),
            }
        }
        if ack_count < needed {
            return Err(Error::QuorumUnavailable {
                needed,
                reachable: ack_count,
            });
        }

        let resolved = self.resolver.resolve(collected)?;

        if self.read_repair && !matches!(policy, ConsistencyPolicy::Available) {
            self.repair_laggards(cluster, &op.key, &responders, &resolved.versions)?;
        }

        Ok(OperationResult {
            ack_count,
            versions: resolved.versions,
            value: resolved.value,
        })
    }

    /// Re-apply frontier versions to responders that miss them. Best-effort
    /// and optional; anti-entropy alone is sufficient for convergence.
    fn repair_laggards(
        &self,
        cluster: &mut Cluster,
        key: &str,
        responders: &[NodeId],
        versions: &[VersionedValue],
    ) -> Result<()> {
        for version in versions {
            for id in responders {
                if cluster.node(id)?.log().contains_request(&version.request_id) {
                    continue;
                }
                let entry = LogEntry {
                    offset: 0,
                    request_id: version.request_id.clone(),
                    key: key.to_string(),
                    value: version.value.clone(),
                    clock: version.clock.clone(),
                    timestamp: version.timestamp,
                    origin: version.writer.clone(),
                };
                if let Err(e) = cluster.node_mut(id)?.apply_write(&entry) {
                    tracing::warn!(replica = %id, error = %e, "read repair failed");
                } else {
                    tracing::debug!(replica = %id, request_id = %version.request_id, "read repair applied");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn cluster_with(config: ClusterConfig) -> (Cluster, Coordinator) {
        let coordinator = Coordinator::new(&config);
        let cluster = Cluster::bootstrap_named(config, ["a", "b", "c"]).unwrap();
        (cluster, coordinator)
    }

    #[test]
    fn test_strict_write_then_read() {
        let (mut cluster, coordinator) = cluster_with(ClusterConfig::default());

        let write = coordinator
            .submit(&mut cluster, &Operation::write("a", "x", "1", "rid-1"))
            .unwrap();
        assert_eq!(write.ack_count, 3);

        let read = coordinator
            .submit(&mut cluster, &Operation::read("b", "x", "rid-2"))
            .unwrap();
        assert_eq!(read.value, Some(Bytes::from_static(b"1")));
        assert_eq!(read.versions.len(), 1);
    }

    #[test]
    fn test_strict_write_fails_in_minority() {
        let (mut cluster, coordinator) = cluster_with(ClusterConfig::default());
        cluster
            .set_partition(&ids(&["a"]), &ids(&["b", "c"]))
            .unwrap();

        let res = coordinator.submit(&mut cluster, &Operation::write("a", "x", "2", "rid-1"));
        assert!(matches!(
            res,
            Err(Error::QuorumUnavailable {
                needed: 2,
                reachable: 1
            })
        ));
        // Nothing landed anywhere
        assert!(cluster.node("a").unwrap().read("x").unwrap().is_empty());
    }

    #[test]
    fn test_strict_read_fails_in_minority() {
        let (mut cluster, coordinator) = cluster_with(ClusterConfig::default());
        coordinator
            .submit(&mut cluster, &Operation::write("b", "x", "1", "rid-1"))
            .unwrap();
        cluster
            .set_partition(&ids(&["a"]), &ids(&["b", "c"]))
            .unwrap();

        let res = coordinator.submit(&mut cluster, &Operation::read("a", "x", "rid-2"));
        assert!(matches!(res, Err(Error::QuorumUnavailable { .. })));
    }

    #[test]
    fn test_available_write_succeeds_alone() {
        let mut config = ClusterConfig::default();
        config.policy = ConsistencyPolicy::Available;
        let (mut cluster, coordinator) = cluster_with(config);
        cluster
            .set_partition(&ids(&["a"]), &ids(&["b", "c"]))
            .unwrap();

        let res = coordinator
            .submit(&mut cluster, &Operation::write("a", "x", "2", "rid-1"))
            .unwrap();
        assert_eq!(res.ack_count, 1);

        // The isolated replica serves its own (possibly stale) view
        let read = coordinator
            .submit(&mut cluster, &Operation::read("a", "x", "rid-2"))
            .unwrap();
        assert_eq!(read.value, Some(Bytes::from_static(b"2")));
        let stale = coordinator
            .submit(&mut cluster, &Operation::read("b", "x", "rid-3"))
            .unwrap();
        assert!(stale.versions.is_empty());
    }

    #[test]
    fn test_available_propagates_async() {
        let mut config = ClusterConfig::default();
        config.policy = ConsistencyPolicy::Available;
        let (mut cluster, coordinator) = cluster_with(config);

        coordinator
            .submit(&mut cluster, &Operation::write("a", "x", "1", "rid-1"))
            .unwrap();
        assert!(cluster.node("b").unwrap().read("x").unwrap().is_empty());

        cluster.advance_tick();
        assert_eq!(cluster.node("b").unwrap().read("x").unwrap().len(), 1);
        assert_eq!(cluster.node("c").unwrap().read("x").unwrap().len(), 1);
    }

    #[test]
    fn test_policy_override_per_operation() {
        let (mut cluster, coordinator) = cluster_with(ClusterConfig::default());
        cluster
            .set_partition(&ids(&["a"]), &ids(&["b", "c"]))
            .unwrap();

        let op = Operation::write("a", "x", "2", "rid-1").with_policy(ConsistencyPolicy::Available);
        assert!(coordinator.submit(&mut cluster, &op).is_ok());
    }

    #[test]
    fn test_tunable_thresholds() {
        let (mut cluster, coordinator) = cluster_with(ClusterConfig::default());
        cluster
            .set_partition(&ids(&["a"]), &ids(&["b", "c"]))
            .unwrap();

        let loose = Operation::write("a", "x", "2", "rid-1")
            .with_policy(ConsistencyPolicy::Tunable { n: 3, w: 1, r: 1 });
        assert!(coordinator.submit(&mut cluster, &loose).is_ok());

        let tight = Operation::write("a", "x", "3", "rid-2")
            .with_policy(ConsistencyPolicy::Tunable { n: 3, w: 2, r: 2 });
        assert!(matches!(
            coordinator.submit(&mut cluster, &tight),
            Err(Error::QuorumUnavailable { .. })
        ));
    }

    #[test]
    fn test_down_target_is_unavailable() {
        let (mut cluster, coordinator) = cluster_with(ClusterConfig::default());
        cluster.fail_node("a").unwrap();

        let res = coordinator.submit(&mut cluster, &Operation::read("a", "x", "rid-1"));
        assert!(matches!(res, Err(Error::NodeUnavailable(_))));
    }

    #[test]
    fn test_unknown_target() {
        let (mut cluster, coordinator) = cluster_with(ClusterConfig::default());
        let res = coordinator.submit(&mut cluster, &Operation::read("zz", "x", "rid-1"));
        assert!(matches!(res, Err(Error::UnknownNode(_))));
    }

    #[test]
    fn test_write_without_value_rejected() {
        let (mut cluster, coordinator) = cluster_with(ClusterConfig::default());
        let mut op = Operation::write("a", "x", "1", "rid-1");
        op.value = None;
        assert!(coordinator.submit(&mut cluster, &op).is_err());
    }

    #[test]
    fn test_read_repair_propagates_winner() {
        let mut config = ClusterConfig::default();
        config.read_repair = true;
        config.resolution = ResolutionPolicyKind::LastWriteWins;
        let (mut cluster, coordinator) = cluster_with(config);

        cluster
            .set_partition(&ids(&["a"]), &ids(&["b", "c"]))
            .unwrap();
        coordinator
            .submit(&mut cluster, &Operation::write("b", "x", "1", "rid-old"))
            .unwrap();
        cluster.advance_tick();
        let op = Operation::write("a", "x", "2", "rid-new").with_policy(ConsistencyPolicy::Available);
        coordinator.submit(&mut cluster, &op).unwrap();

        // Heal but read before anti-entropy runs
        cluster.heal_partition();
        let read = coordinator
            .submit(&mut cluster, &Operation::read("a", "x", "rid-read"))
            .unwrap();
        assert_eq!(read.value, Some(Bytes::from_static(b"2")));

        // The later write won and was repaired onto the stale replicas
        assert!(cluster.node("b").unwrap().log().contains_request("rid-new"));
        assert!(cluster.node("c").unwrap().log().contains_request("rid-new"));
    }
}
