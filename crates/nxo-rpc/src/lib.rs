//! Bidirectional RPC over a message-passing webview bridge.
//!
//! The plugin host and its webview UI can only exchange fire-and-forget
//! messages. [`RpcChannel`] layers named function calls on top: each side
//! registers functions, calls the peer's functions by name, and collects
//! results later by [`CallId`].
//!
//! # Example
//!
//! ```
//! use nxo_rpc::{LoopbackPair, RpcConfig};
//! use serde_json::json;
//!
//! let mut link = LoopbackPair::new(RpcConfig::default());
//! link.b
//!     .register_function("double", |args| {
//!         let x = args.first().and_then(|v| v.as_i64()).ok_or("expected a number")?;
//!         Ok(json!(x * 2))
//!     })
//!     .unwrap();
//!
//! let id = link.a.call_remote_function("double", vec![json!(21)]).unwrap();
//! link.pump();
//! assert_eq!(link.a.try_take_result(id), Some(Ok(json!(42))));
//! ```

mod channel;
pub mod config;
mod error;
pub mod function;
mod loopback;
pub mod message;

pub use channel::{RpcChannel, SendFn};
pub use config::RpcConfig;
pub use error::{CallError, CallResult, Result, RpcError};
pub use function::RpcFunction;
pub use loopback::{Loopback, LoopbackPair};
pub use message::{CallId, RemoteError, RpcMessage};
