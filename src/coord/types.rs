//! Policy and state types for the request coordinator

use serde::{Deserialize, Serialize};
use std::fmt;

/// How many requests may be inside the connector at the same time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyPolicy {
    /// At most one request in flight
    Serialized,
    /// No limit; every request is admitted as soon as the coordinator is open
    Unbounded,
    /// At most `n` requests in flight
    Limited(usize),
}

impl ConcurrencyPolicy {
    /// Build a policy from a numeric limit where `0` means "no limit"
    pub fn from_limit(limit: usize) -> Self {
        match limit {
            0 => Self::Unbounded,
            1 => Self::Serialized,
            n => Self::Limited(n),
        }
    }

    /// Map the `asyncRequestProcessing` flag to a policy
    pub fn from_async_processing(async_request_processing: bool) -> Self {
        if async_request_processing {
            Self::Unbounded
        } else {
            Self::Serialized
        }
    }

    /// Number of admission slots, `None` when unbounded
    pub fn limit(&self) -> Option<usize> {
        match self {
            Self::Serialized => Some(1),
            Self::Unbounded => None,
            Self::Limited(0) => None,
            Self::Limited(n) => Some(*n),
        }
    }
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self::Unbounded
    }
}

impl fmt::Display for ConcurrencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialized => write!(f, "serialized"),
            Self::Unbounded => write!(f, "unbounded"),
            Self::Limited(n) => write!(f, "limited({})", n),
        }
    }
}

/// Lifecycle of a request coordinator.
///
/// `Blocked -> Open -> Stopped`; `Stopped` is terminal and may also be entered
/// directly from `Blocked`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Blocked,
    Open,
    Stopped,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Blocked => "blocked",
            Self::Open => "open",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
