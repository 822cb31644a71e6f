//! The RPC channel: request/response correlation over a one-way transport.
//!
//! A channel sits on top of a transport that can only hand a message to the
//! peer. Each side owns one channel. Calls are correlated by a [`CallId`]
//! taken from a per-channel counter.
//!
//! # Protocol
//!
//! ```text
//! caller                                   callee
//!   call_remote_function ── Request ──▶   run function ─▶ pending
//!                        ── Poll    ──▶   pending? ── Result ──▶ incoming
//!   try_take_result ◀─────────────────────────────────────────── incoming
//! ```
//!
//! With [`RpcConfig::push_results`] enabled the callee also sends the result
//! the moment it settles, so a poll processed before settlement cannot leave
//! the result stranded. The caller additionally resends polls on a backoff
//! from [`RpcChannel::tick`] until the call resolves or times out.
//!
//! # Threading
//!
//! Every operation takes `&mut self`, so one channel has a single writer.
//! Hosts that deliver messages from several threads wrap the channel in a
//! `Mutex`. The transport must not call back into the same channel from
//! inside `send`.

use std::collections::HashMap;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::config::RpcConfig;
use crate::error::{CallError, CallResult, Result, RpcError};
use crate::function::{Invocation, Outcome, RpcFunction};
use crate::message::{CallId, RemoteError, RpcMessage};

/// The transport's send capability.
pub type SendFn = dyn FnMut(RpcMessage) + Send;

/// A call this side issued that has not resolved yet.
#[derive(Debug, Clone, Copy)]
struct Outstanding {
    issued_at: Instant,
    next_poll_at: Option<Instant>,
    backoff: Duration,
}

/// A settled result waiting for the peer's poll.
#[derive(Debug)]
struct PendingResult {
    outcome: Outcome,
    settled_at: Instant,
}

/// One endpoint of a bidirectional RPC link.
pub struct RpcChannel {
    send: Box<SendFn>,
    config: RpcConfig,
    functions: HashMap<String, RpcFunction>,
    /// Callee side: settled results not yet transmitted.
    pending: HashMap<CallId, PendingResult>,
    /// Callee side: computations still running.
    in_flight: HashMap<CallId, BoxFuture<'static, Outcome>>,
    /// Caller side: results received but not yet taken.
    incoming: HashMap<CallId, CallResult>,
    /// Caller side: calls awaiting a result. Only these accept a Result.
    outstanding: HashMap<CallId, Outstanding>,
    next_id: u64,
}

impl RpcChannel {
    /// Create a channel with the default configuration.
    ///
    /// `send` hands a message to the transport. It is called in the order
    /// messages are produced and must not re-enter this channel.
    pub fn new<F>(send: F) -> Self
    where
        F: FnMut(RpcMessage) + Send + 'static,
    {
        Self::with_config(send, RpcConfig::default())
    }

    /// Create a channel with an explicit configuration.
    pub fn with_config<F>(send: F, config: RpcConfig) -> Self
    where
        F: FnMut(RpcMessage) + Send + 'static,
    {
        Self {
            send: Box::new(send),
            config,
            functions: HashMap::new(),
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            incoming: HashMap::new(),
            outstanding: HashMap::new(),
            next_id: 0,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a synchronous function under `name`.
    ///
    /// Registering an existing name replaces the previous function.
    pub fn register_function<F>(&mut self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, RpcFunction::from_sync(func))
    }

    /// Register a function whose result settles asynchronously.
    ///
    /// The returned future is polled by the channel itself, from
    /// [`handle_message`](Self::handle_message) and [`tick`](Self::tick),
    /// so it needs no executor but only makes progress when those run.
    pub fn register_async_function<F, Fut>(&mut self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<Value, String>> + Send + 'static,
    {
        self.register(name, RpcFunction::from_async(func))
    }

    /// Register an already-wrapped function.
    pub fn register(&mut self, name: impl Into<String>, func: RpcFunction) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(RpcError::EmptyFunctionName);
        }
        if self.functions.insert(name.clone(), func).is_some() {
            log::debug!("Replaced RPC function '{name}'");
        }
        Ok(())
    }

    /// Remove a function. Returns `true` if it was registered.
    pub fn unregister_function(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    /// Whether a function is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    // =========================================================================
    // Caller side
    // =========================================================================

    /// Invoke `name` on the peer.
    ///
    /// Sends a request followed by a poll and returns the call's id without
    /// waiting. Collect the result with [`try_take_result`](Self::try_take_result).
    pub fn call_remote_function(&mut self, name: impl Into<String>, args: Vec<Value>) -> Result<CallId> {
        let limit = self.config.max_outstanding_calls;
        if self.outstanding.len() + self.incoming.len() >= limit {
            return Err(RpcError::TooManyOutstandingCalls { limit });
        }

        let raw = self.next_id;
        self.next_id = raw.checked_add(1).ok_or(RpcError::IdSpaceExhausted)?;
        let id = CallId(raw);

        let now = Instant::now();
        let backoff = self.config.poll_interval.unwrap_or_default();
        self.outstanding.insert(
            id,
            Outstanding {
                issued_at: now,
                next_poll_at: self
                    .config
                    .poll_interval
                    .and_then(|interval| now.checked_add(interval)),
                backoff,
            },
        );

        self.emit(RpcMessage::Request {
            id,
            name: name.into(),
            args,
        });
        self.emit(RpcMessage::Poll { id });
        Ok(id)
    }

    /// Take the result of a call if it has arrived.
    ///
    /// `None` means "not ready": the result has not arrived yet, was already
    /// taken, or the id was never issued. The first successful take removes
    /// the result.
    pub fn try_take_result(&mut self, id: CallId) -> Option<CallResult> {
        self.incoming.remove(&id)
    }

    /// Abandon a call. Its result resolves to [`CallError::Cancelled`] and
    /// any late reply from the peer is discarded.
    ///
    /// Returns `false` if the call is not outstanding. The peer is not told;
    /// its function still runs to completion.
    pub fn cancel(&mut self, id: CallId) -> bool {
        if self.outstanding.remove(&id).is_none() {
            return false;
        }
        self.resolve_locally(id, CallError::Cancelled);
        true
    }

    /// Cancel every outstanding call. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let ids: Vec<CallId> = self.outstanding.drain().map(|(id, _)| id).collect();
        for &id in &ids {
            self.resolve_locally(id, CallError::Cancelled);
        }
        ids.len()
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Deliver one message from the transport.
    pub fn handle_message(&mut self, message: RpcMessage) {
        log::trace!("RPC recv {} {:?}", message.tag(), message.id());
        match message {
            RpcMessage::Request { id, name, args } => self.handle_request(id, name, args),
            RpcMessage::Poll { id } => self.handle_poll(id),
            RpcMessage::Result { id, result, error } => {
                let result = match error {
                    Some(error) => Err(CallError::from(error)),
                    None => Ok(result),
                };
                self.handle_result(id, result);
            }
            RpcMessage::Unknown => {
                log::debug!("Ignoring RPC message with unknown type");
            }
        }
    }

    /// Deliver one raw JSON message from the transport.
    ///
    /// Malformed JSON is logged and dropped.
    pub fn handle_json(&mut self, json: &str) {
        match RpcMessage::from_json(json) {
            Ok(message) => self.handle_message(message),
            Err(e) => log::warn!("Invalid RPC message JSON ({e}): {json}"),
        }
    }

    fn handle_request(&mut self, id: CallId, name: String, args: Vec<Value>) {
        if self.pending.contains_key(&id) || self.in_flight.contains_key(&id) {
            log::warn!("Ignoring duplicate RPC request {id} for '{name}'");
            return;
        }

        let Some(func) = self.functions.get(&name).cloned() else {
            log::debug!("RPC request {id} for unregistered function '{name}'");
            self.settle(id, Err(RemoteError::NotFound));
            return;
        };

        match func.invoke(args) {
            Invocation::Settled(outcome) => self.settle(id, outcome),
            Invocation::Deferred(future) => {
                self.in_flight.insert(id, future);
                self.poll_in_flight();
            }
        }
    }

    fn handle_poll(&mut self, id: CallId) {
        match self.pending.remove(&id) {
            Some(pending) => self.emit(RpcMessage::from_outcome(id, pending.outcome)),
            None => log::trace!("RPC poll {id}: nothing ready"),
        }
    }

    fn handle_result(&mut self, id: CallId, result: CallResult) {
        if self.outstanding.remove(&id).is_none() {
            // Ids are allocated in order, so anything below next_id was
            // issued here and has already resolved.
            if id.get() < self.next_id {
                log::debug!("Discarding RPC result {id}: call already resolved");
            } else {
                log::debug!("Discarding RPC result {id}: never issued");
            }
            return;
        }
        self.incoming.insert(id, result);
    }

    // =========================================================================
    // Settlement and housekeeping
    // =========================================================================

    /// Poll running computations once. Returns how many settled.
    pub fn poll_in_flight(&mut self) -> usize {
        if self.in_flight.is_empty() {
            return 0;
        }

        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut settled = Vec::new();
        for (&id, future) in self.in_flight.iter_mut() {
            if let Poll::Ready(outcome) = future.poll_unpin(&mut cx) {
                settled.push((id, outcome));
            }
        }
        settled.sort_by_key(|(id, _)| *id);

        let count = settled.len();
        for (id, outcome) in settled {
            self.in_flight.remove(&id);
            self.settle(id, outcome);
        }
        count
    }

    /// Timer hook. Drives computations, expires calls, resends polls and
    /// drops stale results.
    ///
    /// Call this periodically (a UI frame timer is enough). `now` is
    /// normally `Instant::now()`.
    pub fn tick(&mut self, now: Instant) {
        self.poll_in_flight();
        self.expire_calls(now);
        self.resend_polls(now);
        self.expire_pending(now);
    }

    fn settle(&mut self, id: CallId, outcome: Outcome) {
        if self.config.push_results {
            self.emit(RpcMessage::from_outcome(id, outcome));
        } else {
            self.pending.insert(
                id,
                PendingResult {
                    outcome,
                    settled_at: Instant::now(),
                },
            );
        }
    }

    fn expire_calls(&mut self, now: Instant) {
        let Some(timeout) = self.config.call_timeout else {
            return;
        };

        let mut expired: Vec<CallId> = self
            .outstanding
            .iter()
            .filter(|(_, call)| now.saturating_duration_since(call.issued_at) >= timeout)
            .map(|(&id, _)| id)
            .collect();
        expired.sort();

        for id in expired {
            self.outstanding.remove(&id);
            log::warn!("RPC call {id} timed out after {timeout:?}");
            self.resolve_locally(id, CallError::TimedOut);
        }
    }

    fn resend_polls(&mut self, now: Instant) {
        let config = self.config;
        let mut due = Vec::new();
        for (&id, call) in self.outstanding.iter_mut() {
            let Some(next_poll_at) = call.next_poll_at else {
                continue;
            };
            if now >= next_poll_at {
                call.backoff = config.next_backoff(call.backoff);
                call.next_poll_at = now.checked_add(call.backoff);
                due.push(id);
            }
        }
        due.sort();

        for id in due {
            self.emit(RpcMessage::Poll { id });
        }
    }

    fn expire_pending(&mut self, now: Instant) {
        let Some(ttl) = self.config.pending_result_ttl else {
            return;
        };

        self.pending.retain(|id, pending| {
            let keep = now.saturating_duration_since(pending.settled_at) < ttl;
            if !keep {
                log::warn!("Dropping RPC result {id}: never polled");
            }
            keep
        });
    }

    /// Resolve an outstanding call without a reply. The caller must already
    /// have removed it from `outstanding`, so a late reply is discarded.
    fn resolve_locally(&mut self, id: CallId, reason: CallError) {
        self.incoming.insert(id, Err(reason));
    }

    fn emit(&mut self, message: RpcMessage) {
        log::trace!("RPC send {} {:?}", message.tag(), message.id());
        (self.send)(message);
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The id the next call will receive.
    pub fn next_call_id(&self) -> CallId {
        CallId(self.next_id)
    }

    /// Calls issued by this side that have not resolved.
    pub fn outstanding_calls(&self) -> usize {
        self.outstanding.len()
    }

    /// Results received but not yet taken.
    pub fn incoming_results(&self) -> usize {
        self.incoming.len()
    }

    /// Settled results waiting for the peer's poll.
    pub fn pending_results(&self) -> usize {
        self.pending.len()
    }

    /// Computations still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("config", &self.config)
            .field("functions", &self.functions.len())
            .field("pending", &self.pending.len())
            .field("in_flight", &self.in_flight.len())
            .field("incoming", &self.incoming.len())
            .field("outstanding", &self.outstanding.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
