//! Configuration for simkv clusters
//!
//! A `ClusterConfig` fully determines a simulation run together with the
//! scenario's event list: same config, same events, same outcome.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Cluster-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of replicas in the cluster (N)
    #[serde(default = "default_cluster_size")]
    pub cluster_size: usize,

    /// Default consistency policy, overridable per operation
    #[serde(default)]
    pub policy: ConsistencyPolicy,

    /// How concurrent siblings are collapsed on read
    #[serde(default)]
    pub resolution: ResolutionPolicyKind,

    /// Write resolved frontier versions back to lagging replicas after a
    /// quorum read. Convergence never depends on this; anti-entropy alone
    /// is sufficient.
    #[serde(default)]
    pub read_repair: bool,

    /// Reconciliation pairs processed per tick during anti-entropy
    #[serde(default = "default_pairs_per_tick")]
    pub anti_entropy_pairs_per_tick: usize,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_cluster_size() -> usize {
    3
}
fn default_pairs_per_tick() -> usize {
    4
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_size: default_cluster_size(),
            policy: ConsistencyPolicy::default(),
            resolution: ResolutionPolicyKind::default(),
            read_repair: false,
            anti_entropy_pairs_per_tick: default_pairs_per_tick(),
            log_level: default_log_level(),
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cluster_size == 0 {
            return Err(Error::InvalidConfig("cluster_size must be > 0".into()));
        }
        if self.anti_entropy_pairs_per_tick == 0 {
            return Err(Error::InvalidConfig(
                "anti_entropy_pairs_per_tick must be > 0".into(),
            ));
        }
        self.policy.validate(self.cluster_size)
    }
}

/// Consistency policy for an operation or a whole cluster.
///
/// Represented as a tagged variant rather than a trait hierarchy so the
/// quorum arithmetic stays in one place in the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ConsistencyPolicy {
    /// CP: strict quorum over reachable replicas, W + R > N.
    /// Chooses unavailability over staleness.
    Strict { write_quorum: usize, read_quorum: usize },
    /// AP: single-replica accept, asynchronous propagation.
    Available,
    /// Caller-chosen N/W/R with the same arithmetic as `Strict`.
    Tunable { n: usize, w: usize, r: usize },
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        // Majority quorum for N=3
        ConsistencyPolicy::Strict {
            write_quorum: 2,
            read_quorum: 2,
        }
    }
}

impl ConsistencyPolicy {
    /// Check quorum arithmetic against the cluster size.
    pub fn validate(&self, cluster_size: usize) -> Result<()> {
        match *self {
            ConsistencyPolicy::Strict {
                write_quorum,
                read_quorum,
            } => {
                if write_quorum == 0 || read_quorum == 0 {
                    return Err(Error::InvalidConfig("quorums must be > 0".into()));
                }
                if write_quorum + read_quorum <= cluster_size {
                    return Err(Error::InvalidConfig(format!(
                        "strict quorum requires W + R > N, got W={} R={} N={}",
                        write_quorum, read_quorum, cluster_size
                    )));
                }
                if write_quorum > cluster_size || read_quorum > cluster_size {
                    return Err(Error::InvalidConfig(
                        "quorum cannot exceed cluster size".into(),
                    ));
                }
                Ok(())
            }
            ConsistencyPolicy::Available => Ok(()),
            ConsistencyPolicy::Tunable { n, w, r } => {
                if n == 0 || w == 0 || r == 0 {
                    return Err(Error::InvalidConfig("N, W and R must be > 0".into()));
                }
                if n > cluster_size {
                    return Err(Error::InvalidConfig(format!(
                        "tunable N={} exceeds cluster size {}",
                        n, cluster_size
                    )));
                }
                if w > n || r > n {
                    return Err(Error::InvalidConfig(
                        "W and R cannot exceed N".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Required write acknowledgments under this policy.
    pub fn write_quorum(&self) -> usize {
        match *self {
            ConsistencyPolicy::Strict { write_quorum, .. } => write_quorum,
            ConsistencyPolicy::Available => 1,
            ConsistencyPolicy::Tunable { w, .. } => w,
        }
    }

    /// Required read responses under this policy.
    pub fn read_quorum(&self) -> usize {
        match *self {
            ConsistencyPolicy::Strict { read_quorum, .. } => read_quorum,
            ConsistencyPolicy::Available => 1,
            ConsistencyPolicy::Tunable { r, .. } => r,
        }
    }
}

/// Named sibling-resolution policies selectable from configuration.
///
/// `ApplicationMerge` carries a function and therefore cannot be named in a
/// config file; it is installed programmatically on the coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicyKind {
    /// Pick the sibling with the latest write timestamp (writer id breaks ties)
    LastWriteWins,
    /// Surface every concurrent sibling to the caller
    #[default]
    KeepAllSiblings,
}
