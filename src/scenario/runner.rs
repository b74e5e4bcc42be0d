//! Scenario runner and deterministic replay log
//!
//! `Simulation` is the programmatic surface external tooling drives: submit
//! operations, advance the logical clock, inspect node snapshots and logs.
//! Every event and operation outcome is appended to a replay log that
//! serializes to JSON, so two runs of the same scenario can be diffed
//! byte-for-byte (golden-file testing).

use crate::cluster::Cluster;
use crate::common::{ClusterConfig, Error, NodeId, Result};
use crate::coordinator::{Coordinator, Operation, OperationKind, OperationResult};
use crate::node::{LogEntry, NodeSnapshot};
use crate::scenario::{Event, Scenario};
use serde::{Deserialize, Serialize};

/// Outcome of one replayed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    /// Cluster event applied (partition, heal, fail, recover)
    Applied,
    /// Operation completed
    Success {
        ack_count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        siblings: usize,
    },
    /// Operation returned an error
    Failure { error: String },
}

/// One line of the replay log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub tick: u64,
    pub description: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// A running simulation: cluster + coordinator + replay log.
#[derive(Debug)]
pub struct Simulation {
    cluster: Cluster,
    coordinator: Coordinator,
    replay: Vec<ReplayRecord>,
    next_request: u64,
}

impl Simulation {
    pub fn new(config: ClusterConfig, ids: Vec<NodeId>) -> Result<Self> {
        let coordinator = Coordinator::new(&config);
        let cluster = Cluster::bootstrap_named(config, ids)?;
        Ok(Self {
            cluster,
            coordinator,
            replay: Vec::new(),
            next_request: 0,
        })
    }

    /// Build a simulation from a scenario without running its events.
    pub fn from_scenario(scenario: &Scenario) -> Result<Self> {
        scenario.validate()?;
        Self::new(scenario.config.clone(), scenario.resolved_node_ids())
    }

    /// Run a scenario to its last scheduled tick and return the simulation
    /// for further inspection or additional operations.
    pub fn run_scenario(scenario: &Scenario) -> Result<Self> {
        let mut sim = Self::from_scenario(scenario)?;
        for timed in &scenario.events {
            sim.advance_to(timed.tick);
            sim.apply_event(&timed.event)?;
        }
        Ok(sim)
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn tick(&self) -> u64 {
        self.cluster.tick()
    }

    pub fn advance_tick(&mut self) {
        self.cluster.advance_tick();
    }

    pub fn advance_to(&mut self, tick: u64) {
        self.cluster.advance_to(tick);
    }

    /// Advance until queued deliveries and anti-entropy have drained.
    pub fn settle(&mut self) {
        while self.cluster.deliveries_pending() > 0 || self.cluster.anti_entropy_pending() > 0 {
            self.cluster.advance_tick();
        }
    }

    /// Submit one operation and record its outcome in the replay log.
    /// Operation-level errors are ordinary outcomes, not run failures.
    pub fn submit_operation(&mut self, op: &Operation) -> Result<OperationResult> {
        let result = self.coordinator.submit(&mut self.cluster, op);
        let description = match op.kind {
            OperationKind::Write => format!("write {}@{}", op.key, op.target),
            OperationKind::Read => format!("read {}@{}", op.key, op.target),
        };
        let outcome = match &result {
            Ok(r) => Outcome::Success {
                ack_count: r.ack_count,
                value: r
                    .value
                    .as_ref()
                    .map(|v| String::from_utf8_lossy(v).into_owned()),
                siblings: r.versions.len(),
            },
            Err(e) => Outcome::Failure {
                error: e.to_string(),
            },
        };
        self.record(description, outcome);
        result
    }

    // === Observation surface ===

    pub fn get_node_state(&self, id: &str) -> Result<NodeSnapshot> {
        self.cluster.get_node_state(id)
    }

    pub fn get_log(&self, id: &str) -> Result<Vec<LogEntry>> {
        self.cluster.get_log(id)
    }

    pub fn converged(&self, key: &str) -> bool {
        self.cluster.converged(key)
    }

    pub fn replay_log(&self) -> &[ReplayRecord] {
        &self.replay
    }

    pub fn replay_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.replay)?)
    }

    fn record(&mut self, description: String, outcome: Outcome) {
        self.replay.push(ReplayRecord {
            tick: self.cluster.tick(),
            description,
            outcome,
        });
    }

    fn apply_event(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::Partition { group_a, group_b } => {
                self.cluster.set_partition(group_a, group_b)?;
                self.record(format!("partition {:?} | {:?}", group_a, group_b), Outcome::Applied);
            }
            Event::Heal => {
                self.cluster.heal_partition();
                self.record("heal".into(), Outcome::Applied);
            }
            Event::FailNode { node } => {
                self.cluster.fail_node(node)?;
                self.record(format!("fail {}", node), Outcome::Applied);
            }
            Event::RecoverNode { node } => {
                self.cluster.recover_node(node)?;
                self.record(format!("recover {}", node), Outcome::Applied);
            }
            Event::Operation {
                kind,
                key,
                value,
                target,
                policy_override,
                request_id,
            } => {
                let request_id = match request_id {
                    Some(id) => id.clone(),
                    None => {
                        self.next_request += 1;
                        format!("req-{:04}", self.next_request)
                    }
                };
                let op = Operation {
                    kind: *kind,
                    key: key.clone(),
                    value: value.as_ref().map(|v| v.clone().into()),
                    request_id,
                    target: target.clone(),
                    policy: *policy_override,
                };
                if *kind == OperationKind::Write && value.is_none() {
                    return Err(Error::Scenario(format!(
                        "write to {} at tick {} has no value",
                        key,
                        self.cluster.tick()
                    )));
                }
                // Operation errors land in the replay log, not here
                let _ = self.submit_operation(&op);
            }
        }
        Ok(())
    }
}
