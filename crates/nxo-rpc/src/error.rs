//! Error types for RPC channel operations.

use crate::message::RemoteError;

/// Errors returned by [`RpcChannel`](crate::RpcChannel) operations.
///
/// These are failures of the local operation itself. The outcome of a
/// remote call is reported separately as a [`CallError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// A function was registered under an empty name.
    EmptyFunctionName,
    /// The call identifier counter would wrap around.
    IdSpaceExhausted,
    /// Too many calls are unresolved or unclaimed.
    TooManyOutstandingCalls {
        /// The configured limit.
        limit: usize,
    },
    /// A message could not be serialized or deserialized.
    Serialization(String),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFunctionName => write!(f, "function name must not be empty"),
            Self::IdSpaceExhausted => write!(f, "call identifier space exhausted"),
            Self::TooManyOutstandingCalls { limit } => {
                write!(f, "too many outstanding calls (limit {limit})")
            }
            Self::Serialization(msg) => write!(f, "message serialization failed: {msg}"),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for RPC channel operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Why a remote call did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The peer has no function registered under the requested name.
    NotFound,
    /// The remote function returned an error or panicked.
    Failed(String),
    /// No result arrived within the configured call timeout.
    TimedOut,
    /// The call was cancelled locally before a result arrived.
    Cancelled,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "remote function not found"),
            Self::Failed(msg) => write!(f, "remote function failed: {msg}"),
            Self::TimedOut => write!(f, "remote call timed out"),
            Self::Cancelled => write!(f, "remote call cancelled"),
        }
    }
}

impl std::error::Error for CallError {}

impl From<RemoteError> for CallError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound => Self::NotFound,
            RemoteError::Failed { message } => Self::Failed(message),
        }
    }
}

/// What the caller eventually receives for a call.
pub type CallResult = std::result::Result<serde_json::Value, CallError>;
