//! RPC bridge between the plugin host and its WebView.
//!
//! The bridge owns the host's [`RpcChannel`] and wires it to the page:
//!
//! ```text
//! page ── postMessage(JSON) ──▶ on_message ──▶ RpcBridge::handle_json
//! page ◀── evaluate_js ◀──────── WebViewHandle ◀── channel send
//! ```
//!
//! The host drives [`RpcBridge::on_timer`] from its GUI timer so async
//! functions settle, polls are resent and unanswered calls time out.

use std::ffi::c_void;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use nxo_rpc::{CallId, CallResult, RpcChannel, RpcConfig};
use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::functions::FunctionSet;
use crate::handle::WebViewHandle;
use crate::{LoadedCallback, MessageCallback};

/// Host endpoint of the RPC link to a WebView.
///
/// All methods take `&self`; the channel is guarded by a mutex so the
/// message callback and GUI timer may run on different threads. The
/// handle's `eval_fn` runs while that mutex is held and must not call
/// back into the bridge.
pub struct RpcBridge {
    channel: Arc<Mutex<RpcChannel>>,
    handle: WebViewHandle,
}

impl RpcBridge {
    /// Create a bridge sending through `handle`.
    pub fn new(handle: WebViewHandle, config: RpcConfig) -> Self {
        let sender = handle.clone();
        let channel = RpcChannel::with_config(
            move |message| {
                sender.post(&message);
            },
            config,
        );
        Self {
            channel: Arc::new(Mutex::new(channel)),
            handle,
        }
    }

    /// Register a synchronous function callable from the page.
    pub fn register_function<F>(&self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Ok(self.lock().register_function(name, func)?)
    }

    /// Register an asynchronous function callable from the page.
    pub fn register_async_function<F, Fut>(&self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<Value, String>> + Send + 'static,
    {
        Ok(self.lock().register_async_function(name, func)?)
    }

    /// Register every function of a [`FunctionSet`].
    pub fn register_set(&self, set: Arc<dyn FunctionSet>) -> Result<()> {
        let mut channel = self.lock();
        for &name in set.names() {
            let set = Arc::clone(&set);
            channel.register_function(name, move |args| set.call(name, &args))?;
        }
        Ok(())
    }

    /// Call a function registered by the page.
    ///
    /// Fails with [`BridgeError::NotAttached`] after [`detach`](Self::detach).
    pub fn call_remote_function(&self, name: impl Into<String>, args: Vec<Value>) -> Result<CallId> {
        if !self.handle.is_attached() {
            return Err(BridgeError::NotAttached);
        }
        Ok(self.lock().call_remote_function(name, args)?)
    }

    /// Take the result of a call if it has arrived.
    pub fn try_take_result(&self, id: CallId) -> Option<CallResult> {
        self.lock().try_take_result(id)
    }

    /// Abandon a call.
    pub fn cancel(&self, id: CallId) -> bool {
        self.lock().cancel(id)
    }

    /// Feed one JSON message from the page into the channel.
    pub fn handle_json(&self, json: &str) {
        self.lock().handle_json(json);
    }

    /// GUI timer hook.
    pub fn on_timer(&self, now: Instant) {
        self.lock().tick(now);
    }

    /// The page (re)loaded. Its RPC state starts from scratch, so calls
    /// issued to the previous page can never be answered and are cancelled.
    /// Returns how many were cancelled.
    pub fn page_loaded(&self) -> usize {
        let cancelled = self.lock().cancel_all();
        if cancelled > 0 {
            log::debug!("Page loaded: cancelled {cancelled} stale RPC calls");
        }
        cancelled
    }

    /// Stop sending to the WebView and cancel outstanding calls.
    pub fn detach(&self) -> usize {
        self.handle.invalidate();
        self.lock().cancel_all()
    }

    /// Whether the WebView is attached.
    pub fn is_attached(&self) -> bool {
        self.handle.is_attached()
    }

    /// Run `f` with exclusive access to the channel.
    pub fn with_channel<R>(&self, f: impl FnOnce(&mut RpcChannel) -> R) -> R {
        f(&mut self.lock())
    }

    /// Context pointer for [`on_message`] and [`on_loaded`].
    ///
    /// Valid while the bridge is alive and not moved; keep the bridge boxed
    /// or otherwise pinned while the WebView holds the pointer.
    pub fn context_ptr(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }

    /// Callback to register with the WebView's script message handler.
    pub fn message_callback() -> MessageCallback {
        on_message
    }

    /// Callback to register with the WebView's navigation delegate.
    pub fn loaded_callback() -> LoadedCallback {
        on_loaded
    }

    fn lock(&self) -> MutexGuard<'_, RpcChannel> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RpcBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcBridge")
            .field("handle", &self.handle)
            .field("channel", &*self.lock())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WebView callbacks (extern "C-unwind")
// ---------------------------------------------------------------------------

/// Message callback: feeds a JSON message from the page into the bridge.
///
/// # Safety
///
/// `context` must be null or a pointer from [`RpcBridge::context_ptr`] whose
/// bridge is still alive. `json` must be null or point to `len` readable bytes.
pub unsafe extern "C-unwind" fn on_message(context: *mut c_void, json: *const u8, len: usize) {
    if context.is_null() || json.is_null() {
        return;
    }

    // SAFETY: context is a live RpcBridge per the caller contract.
    let bridge = unsafe { &*(context as *const RpcBridge) };
    // SAFETY: json points to len readable bytes per the caller contract.
    let bytes = unsafe { std::slice::from_raw_parts(json, len) };

    let Ok(json_str) = std::str::from_utf8(bytes) else {
        log::warn!("RPC message is not valid UTF-8");
        return;
    };
    bridge.handle_json(json_str);
}

/// Loaded callback: resets call state when the page finishes loading.
///
/// # Safety
///
/// `context` must be null or a pointer from [`RpcBridge::context_ptr`] whose
/// bridge is still alive.
pub unsafe extern "C-unwind" fn on_loaded(context: *mut c_void) {
    if context.is_null() {
        return;
    }

    // SAFETY: context is a live RpcBridge per the caller contract.
    let bridge = unsafe { &*(context as *const RpcBridge) };
    bridge.page_loaded();
}
