//! WebView transport for NXO RPC.
//!
//! Connects an [`nxo_rpc::RpcChannel`] to a platform WebView: outbound
//! messages are evaluated as JavaScript through a [`WebViewHandle`], inbound
//! messages arrive as JSON through the [`MessageCallback`] registered with
//! the WebView's script message handler.

mod bridge;
mod error;
pub mod functions;
pub mod handle;

use std::ffi::c_void;

pub use bridge::{on_loaded, on_message, RpcBridge};
pub use error::{BridgeError, Result};
pub use functions::FunctionSet;
pub use handle::{EvalJsFn, WebViewHandle};

/// Callback invoked with each JSON message posted by the page.
pub type MessageCallback = unsafe extern "C-unwind" fn(context: *mut c_void, json: *const u8, len: usize);

/// Callback invoked when the page finishes loading.
pub type LoadedCallback = unsafe extern "C-unwind" fn(context: *mut c_void);
