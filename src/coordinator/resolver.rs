//! Conflict resolution over concurrent versions
//!
//! Pure comparison and merge logic; no node state is touched here. A read
//! that collects versions from several replicas reduces them to the causal
//! frontier and then applies one of three policies to whatever concurrency
//! remains.
//!
//! Application-supplied merges must be associative, commutative, and
//! idempotent: replaying the same set of concurrent updates in any order,
//! with duplicates, has to land on the same state. The resolver probes for
//! order sensitivity and refuses merges that flunk it rather than silently
//! picking a winner.

use crate::common::{frontier, ClockOrder, Error, Result, VectorClock, VersionedValue};
use bytes::Bytes;
use std::sync::Arc;

/// Application-supplied merge over concurrent siblings.
pub type MergeFn =
    Arc<dyn Fn(&[VersionedValue]) -> std::result::Result<Bytes, String> + Send + Sync>;

/// How concurrent siblings collapse on read.
#[derive(Clone)]
pub enum ResolutionPolicy {
    /// Latest write timestamp wins; writer id breaks ties
    LastWriteWins,
    /// No collapsing; the caller sees every sibling
    KeepAllSiblings,
    /// Caller-supplied merge function (must be assoc/comm/idempotent)
    ApplicationMerge(MergeFn),
}

impl std::fmt::Debug for ResolutionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionPolicy::LastWriteWins => write!(f, "LastWriteWins"),
            ResolutionPolicy::KeepAllSiblings => write!(f, "KeepAllSiblings"),
            ResolutionPolicy::ApplicationMerge(_) => write!(f, "ApplicationMerge(..)"),
        }
    }
}

/// Outcome of resolving a sibling set.
#[derive(Debug, Clone)]
pub struct ResolvedRead {
    /// Surviving frontier versions
    pub versions: Vec<VersionedValue>,
    /// Single value, when the policy produces one
    pub value: Option<Bytes>,
}

/// Pure comparison/merge logic over versioned values.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    policy: ResolutionPolicy,
}

impl ConflictResolver {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    /// Component-wise clock comparison over the union of replica ids.
    pub fn compare(a: &VectorClock, b: &VectorClock) -> ClockOrder {
        a.compare(b)
    }

    /// Reduce collected versions to the frontier and collapse per policy.
    ///
    /// A failed or order-sensitive application merge surfaces as
    /// `ConflictUnresolved`; the stored siblings are left untouched and the
    /// read can be retried, e.g. after anti-entropy completes.
    pub fn resolve(&self, versions: Vec<VersionedValue>) -> Result<ResolvedRead> {
        let siblings = frontier(versions);

        if siblings.len() <= 1 {
            let value = siblings.first().map(|v| v.value.clone());
            return Ok(ResolvedRead {
                versions: siblings,
                value,
            });
        }

        match &self.policy {
            ResolutionPolicy::KeepAllSiblings => Ok(ResolvedRead {
                versions: siblings,
                value: None,
            }),
            ResolutionPolicy::LastWriteWins => {
                let winner = siblings
                    .iter()
                    .max_by(|a, b| {
                        (a.timestamp, &a.writer).cmp(&(b.timestamp, &b.writer))
                    })
                    .cloned()
                    .ok_or_else(|| Error::Internal("empty sibling set".into()))?;
                Ok(ResolvedRead {
                    value: Some(winner.value.clone()),
                    versions: vec![winner],
                })
            }
            ResolutionPolicy::ApplicationMerge(merge) => {
                let forward = merge(&siblings)
                    .map_err(Error::ConflictUnresolved)?;

                // Probe for order sensitivity: an assoc/comm/idempotent
                // merge cannot care about sibling order
                let mut reversed = siblings.clone();
                reversed.reverse();
                let backward = merge(&reversed)
                    .map_err(Error::ConflictUnresolved)?;
                if forward != backward {
                    return Err(Error::ConflictUnresolved(
                        "merge function is order-sensitive".into(),
                    ));
                }

                Ok(ResolvedRead {
                    versions: siblings,
                    value: Some(forward),
                })
            }
        }
    }
}
