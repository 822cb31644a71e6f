//! Host-side function sets.
//!
//! Implement [`FunctionSet`] to expose a group of plugin functions to the
//! UI in one place, then hand it to
//! [`RpcBridge::register_set`](crate::RpcBridge::register_set).

use serde_json::Value;

/// A named group of functions callable from JavaScript.
pub trait FunctionSet: Send + Sync {
    /// Names of the functions this set answers.
    fn names(&self) -> &[&'static str];

    /// Run one function.
    ///
    /// Called on whichever thread delivers the request, usually the main
    /// thread. Return `Err(message)` to fail the caller's call.
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, String>;
}
