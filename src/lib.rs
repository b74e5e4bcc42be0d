//! # simkv
//!
//! A deterministic simulation core for a replicated key-value store with:
//! - Tunable consistency (strict quorum, single-replica accept, explicit N/W/R)
//! - Vector-clock versioning with sibling detection
//! - Scriptable partitions, node failures, and recovery at logical ticks
//! - Anti-entropy log reconciliation after heal/recover
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │               Coordinator                │
//! │  (policy dispatch + quorum arithmetic)   │
//! └───────┬──────────────┬───────────────────┘
//!         │ reachable?   │ dispatch
//! ┌───────▼────────┐     │
//! │ Partition      │   ┌─▼────────┐ ┌──────────┐ ┌──────────┐
//! │ Controller     │   │ Node a   │ │ Node b   │ │ Node c   │
//! │ (reachability) │   │ store    │ │ store    │ │ store    │
//! └────────────────┘   │ + log    │ │ + log    │ │ + log    │
//!                      └──────────┘ └──────────┘ └──────────┘
//! ```
//!
//! Everything advances on one logical clock (the cluster tick), so a run is
//! a pure function of its configuration and event sequence: no wall-clock
//! timing, no real network, no races.
//!
//! ## Usage
//!
//! ```
//! use simkv::{Cluster, ClusterConfig, Coordinator, Operation};
//!
//! let config = ClusterConfig::default(); // N=3, strict W=2/R=2
//! let mut cluster = Cluster::bootstrap_named(config.clone(), ["a", "b", "c"]).unwrap();
//! let coordinator = Coordinator::new(&config);
//!
//! coordinator
//!     .submit(&mut cluster, &Operation::write("a", "greeting", "hello", "rid-1"))
//!     .unwrap();
//! let read = coordinator
//!     .submit(&mut cluster, &Operation::read("b", "greeting", "rid-2"))
//!     .unwrap();
//! assert_eq!(read.value.unwrap(), "hello");
//! ```

pub mod cluster;
pub mod common;
pub mod coordinator;
pub mod node;
pub mod scenario;

// Re-export commonly used types
pub use cluster::{partition::PartitionController, Cluster};
pub use common::{
    frontier, ClockOrder, ClusterConfig, ConsistencyPolicy, Error, NodeId, ResolutionPolicyKind,
    Result, VectorClock, VersionedValue,
};
pub use coordinator::{
    ConflictResolver, Coordinator, MergeFn, Operation, OperationKind, OperationResult,
    ResolutionPolicy,
};
pub use node::{LogEntry, Node, NodeSnapshot, NodeState};
pub use scenario::{runner::Simulation, Event, Scenario, TimedEvent};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
