//! Handle for delivering RPC messages from Rust into the WebView.

use std::ffi::c_void;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use nxo_rpc::RpcMessage;

/// JavaScript function that receives RPC messages inside the page.
pub const JS_RECEIVER: &str = "window.__NXO__._onMessage";

/// Function pointer type for evaluating JavaScript in the WebView.
///
/// Called with the context pointer and a UTF-8 script. The implementation
/// must dispatch to the main thread itself and must not call back into the
/// bridge synchronously.
pub type EvalJsFn = unsafe extern "C-unwind" fn(context: *mut c_void, script: *const u8, len: usize);

/// Handle for sending RPC messages to the WebView.
///
/// Cloneable and `Send + Sync`. Once [`invalidate`](Self::invalidate) is
/// called every clone stops delivering.
#[derive(Clone)]
pub struct WebViewHandle {
    eval_fn: EvalJsFn,
    context: Arc<AtomicPtr<c_void>>,
}

// SAFETY: The context pointer is only dereferenced inside eval_fn, which
// dispatches to the main thread. Arc<AtomicPtr> makes access to the pointer
// itself thread-safe.
unsafe impl Send for WebViewHandle {}
// SAFETY: Same reasoning as Send.
unsafe impl Sync for WebViewHandle {}

impl WebViewHandle {
    /// Create a new handle.
    ///
    /// # Safety
    ///
    /// - `eval_fn` must stay valid for the lifetime of the handle
    /// - `context` must stay valid until `invalidate()` is called
    pub unsafe fn new(eval_fn: EvalJsFn, context: *mut c_void) -> Self {
        Self {
            eval_fn,
            context: Arc::new(AtomicPtr::new(context)),
        }
    }

    /// Deliver a message to the page.
    ///
    /// Returns `false` if the WebView is detached or the message could not
    /// be serialized; the message is dropped in both cases.
    pub fn post(&self, message: &RpcMessage) -> bool {
        let ctx = self.context.load(Ordering::Acquire);
        if ctx.is_null() {
            log::debug!("Dropping RPC {}: webview detached", message.tag());
            return false;
        }

        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to serialize RPC message: {e}");
                return false;
            }
        };

        let script = message_script(&json);

        // SAFETY: eval_fn is valid (guaranteed by new()) and ctx was checked
        // non-null above.
        unsafe {
            (self.eval_fn)(ctx, script.as_ptr(), script.len());
        }
        true
    }

    /// Whether the WebView is still attached.
    pub fn is_attached(&self) -> bool {
        !self.context.load(Ordering::Acquire).is_null()
    }

    /// Invalidate the handle. After this, `post()` is a no-op.
    pub fn invalidate(&self) {
        self.context.store(std::ptr::null_mut(), Ordering::Release);
    }
}

impl std::fmt::Debug for WebViewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebViewHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Wrap a JSON message in a call to [`JS_RECEIVER`].
pub fn message_script(json: &str) -> String {
    format!("{JS_RECEIVER}({json})")
}

/// Extract the JSON payload from a script built by [`message_script`].
pub fn script_payload(script: &str) -> Option<&str> {
    script
        .strip_prefix(JS_RECEIVER)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Script sink standing in for a WebView.
    pub(crate) struct Recorder {
        scripts: Mutex<Vec<String>>,
    }

    impl Recorder {
        pub(crate) fn new() -> Box<Self> {
            Box::new(Self {
                scripts: Mutex::new(Vec::new()),
            })
        }

        /// A handle evaluating into this recorder. The recorder must outlive it.
        pub(crate) fn handle(&self) -> WebViewHandle {
            let ctx = self as *const Self as *mut c_void;
            // SAFETY: record is a valid EvalJsFn; callers keep the recorder alive.
            unsafe { WebViewHandle::new(record, ctx) }
        }

        /// Drain recorded messages, parsed back from their scripts.
        pub(crate) fn take_messages(&self) -> Vec<RpcMessage> {
            std::mem::take(&mut *self.scripts.lock().unwrap())
                .iter()
                .map(|script| {
                    let json = script_payload(script).expect("script calls the receiver");
                    RpcMessage::from_json(json).unwrap()
                })
                .collect()
        }
    }

    unsafe extern "C-unwind" fn record(context: *mut c_void, script: *const u8, len: usize) {
        // SAFETY: context points at a live Recorder (see Recorder::handle).
        let recorder = unsafe { &*(context as *const Recorder) };
        // SAFETY: script/len describe the String built in post().
        let bytes = unsafe { std::slice::from_raw_parts(script, len) };
        let script = String::from_utf8(bytes.to_vec()).unwrap();
        recorder.scripts.lock().unwrap().push(script);
    }
}
