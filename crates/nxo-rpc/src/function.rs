//! Registered functions and their invocation.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::message::RemoteError;

/// Outcome of running a registered function.
pub type Outcome = Result<Value, RemoteError>;

type SyncFn = dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync;
type AsyncFn = dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync;

/// A function callable by the peer.
#[derive(Clone)]
pub enum RpcFunction {
    /// Produces its result before returning.
    Sync(Arc<SyncFn>),
    /// Returns a future that settles later.
    Async(Arc<AsyncFn>),
}

/// What invoking a function produced.
pub(crate) enum Invocation {
    Settled(Outcome),
    Deferred(BoxFuture<'static, Outcome>),
}

impl RpcFunction {
    /// Wrap a synchronous function.
    pub fn from_sync<F>(func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(func))
    }

    /// Wrap a future-returning function.
    pub fn from_async<F, Fut>(func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self::Async(Arc::new(move |args| func(args).boxed()))
    }

    /// Run the function. Errors and panics become [`RemoteError::Failed`].
    pub(crate) fn invoke(&self, args: Vec<Value>) -> Invocation {
        match self {
            Self::Sync(func) => {
                let outcome = match catch_unwind(AssertUnwindSafe(|| func(args))) {
                    Ok(result) => result.map_err(|message| RemoteError::Failed { message }),
                    Err(payload) => Err(RemoteError::Failed {
                        message: panic_message(&*payload),
                    }),
                };
                Invocation::Settled(outcome)
            }
            Self::Async(func) => {
                let future = match catch_unwind(AssertUnwindSafe(|| func(args))) {
                    Ok(future) => future,
                    Err(payload) => {
                        return Invocation::Settled(Err(RemoteError::Failed {
                            message: panic_message(&*payload),
                        }))
                    }
                };
                let guarded = AssertUnwindSafe(future).catch_unwind().map(|result| match result {
                    Ok(result) => result.map_err(|message| RemoteError::Failed { message }),
                    Err(payload) => Err(RemoteError::Failed {
                        message: panic_message(&*payload),
                    }),
                });
                Invocation::Deferred(guarded.boxed())
            }
        }
    }
}

impl std::fmt::Debug for RpcFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("RpcFunction::Sync"),
            Self::Async(_) => f.write_str("RpcFunction::Async"),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
