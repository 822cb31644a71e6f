//! Wire messages exchanged between two RPC channels.
//!
//! Messages are internally tagged on `"type"` so they can travel through a
//! webview bridge as plain JSON objects:
//!
//! ```text
//! { "type": "SetRequestedFunction", "id": 0, "name": "double", "args": [21] }
//! { "type": "SendFunctionResult",   "id": 0 }
//! { "type": "SetFunctionResult",    "id": 0, "result": 42 }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier correlating a request with its result.
///
/// Allocated from a per-channel counter starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl CallId {
    /// Get the raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for CallId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Failure reported by the callee alongside a `null` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RemoteError {
    /// No function is registered under the requested name.
    NotFound,
    /// The function returned an error or panicked.
    Failed {
        /// Error text produced by the function.
        message: String,
    },
}

/// A message on the RPC wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RpcMessage {
    /// Ask the peer to run `name` with `args`.
    #[serde(rename = "SetRequestedFunction")]
    Request {
        id: CallId,
        name: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Ask the peer to send the result for `id` if it is ready.
    #[serde(rename = "SendFunctionResult")]
    Poll { id: CallId },
    /// The result of a call.
    ///
    /// `result` is `null` whenever `error` is set, so peers that ignore
    /// `error` still observe an empty value.
    #[serde(rename = "SetFunctionResult")]
    Result {
        id: CallId,
        #[serde(default)]
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemoteError>,
    },
    /// Any tag this version does not know. Ignored on receipt.
    #[serde(other)]
    Unknown,
}

impl RpcMessage {
    /// The call identifier carried by this message, if any.
    pub fn id(&self) -> Option<CallId> {
        match self {
            Self::Request { id, .. } | Self::Poll { id } | Self::Result { id, .. } => Some(*id),
            Self::Unknown => None,
        }
    }

    /// The wire tag of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Request { .. } => "SetRequestedFunction",
            Self::Poll { .. } => "SendFunctionResult",
            Self::Result { .. } => "SetFunctionResult",
            Self::Unknown => "Unknown",
        }
    }

    /// Build a result message from a settled outcome.
    pub fn from_outcome(id: CallId, outcome: std::result::Result<Value, RemoteError>) -> Self {
        match outcome {
            Ok(result) => Self::Result {
                id,
                result,
                error: None,
            },
            Err(error) => Self::Result {
                id,
                result: Value::Null,
                error: Some(error),
            },
        }
    }

    /// Parse a message from JSON text.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the message to JSON text.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
