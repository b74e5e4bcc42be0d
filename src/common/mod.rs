//! Common utilities and types shared across simkv

pub mod config;
pub mod error;
pub mod logging;
pub mod vclock;
pub mod version;

pub use config::{ClusterConfig, ConsistencyPolicy, ResolutionPolicyKind};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use vclock::{ClockOrder, NodeId, VectorClock};
pub use version::{frontier, VersionedValue};
