//! Scenario definitions: timed events against a simulated cluster
//!
//! A scenario is the only file format the core understands: a cluster
//! configuration plus a list of events pinned to logical ticks. External
//! tooling (CLI, dashboards) produces these and reads replay logs back out;
//! the core itself never parses command lines or config files.

pub mod runner;

use crate::common::{ClusterConfig, ConsistencyPolicy, Error, NodeId, Result};
use crate::coordinator::OperationKind;
use serde::{Deserialize, Serialize};

/// One schedulable event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Split the cluster into two groups
    Partition {
        group_a: Vec<NodeId>,
        group_b: Vec<NodeId>,
    },
    /// Restore full reachability and kick off anti-entropy
    Heal,
    /// Take one node down entirely
    FailNode { node: NodeId },
    /// Bring a failed node back (also kicks off anti-entropy)
    RecoverNode { node: NodeId },
    /// Client read or write
    Operation {
        kind: OperationKind,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        target: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        policy_override: Option<ConsistencyPolicy>,
        /// Explicit id for replay determinism; auto-assigned when omitted
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

/// An event pinned to a logical tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedEvent {
    pub tick: u64,
    #[serde(flatten)]
    pub event: Event,
}

/// A complete scenario: configuration plus scripted events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub config: ClusterConfig,
    /// Node ids; `n1..nN` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ids: Option<Vec<NodeId>>,
    pub events: Vec<TimedEvent>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if let Some(ids) = &self.node_ids {
            if ids.len() != self.config.cluster_size {
                return Err(Error::Scenario(format!(
                    "scenario {} names {} nodes but cluster_size is {}",
                    self.name,
                    ids.len(),
                    self.config.cluster_size
                )));
            }
        }
        for (i, window) in self.events.windows(2).enumerate() {
            if window[0].tick > window[1].tick {
                return Err(Error::Scenario(format!(
                    "events out of order at index {}: tick {} before {}",
                    i + 1,
                    window[1].tick,
                    window[0].tick
                )));
            }
        }
        Ok(())
    }

    /// Node ids this scenario runs with.
    pub fn resolved_node_ids(&self) -> Vec<NodeId> {
        match &self.node_ids {
            Some(ids) => ids.clone(),
            None => (1..=self.config.cluster_size)
                .map(|i| format!("n{}", i))
                .collect(),
        }
    }
}
