//! Error types for the relay layer.

use cavalry_protocol::JoinCode;

use crate::AllocationId;

/// Errors returned by a [`Relay`](crate::Relay).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The relay service could not be reached or refused to initialize.
    #[error("relay service unavailable: {0}")]
    Unavailable(String),

    /// The requested peer count is outside what the relay supports.
    #[error("invalid max connections {requested} (limit {limit})")]
    InvalidMaxConnections { requested: usize, limit: usize },

    /// The allocation was released or never existed.
    #[error("allocation {0} not found")]
    UnknownAllocation(AllocationId),

    /// No allocation answers to this code.
    #[error("join code {0} not recognized")]
    InvalidJoinCode(JoinCode),

    /// The code exists but its host hasn't finished starting up.
    #[error("host for join code {0} is not listening yet")]
    NotReady(JoinCode),
}
