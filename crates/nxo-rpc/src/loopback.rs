//! In-memory transport for connecting two channels in one process.
//!
//! Messages are queued rather than delivered inline, so a channel never
//! re-enters itself from its own `send`. Delivery happens when the owner
//! calls [`Loopback::deliver_to`], which keeps ordering deterministic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::channel::RpcChannel;
use crate::message::RpcMessage;

/// One direction of an in-memory link. FIFO, lossless.
#[derive(Clone, Default)]
pub struct Loopback {
    queue: Arc<Mutex<VecDeque<RpcMessage>>>,
}

impl Loopback {
    /// Create an empty link.
    pub fn new() -> Self {
        Self::default()
    }

    /// A send function to hand to [`RpcChannel::new`].
    pub fn sender(&self) -> impl FnMut(RpcMessage) + Send + 'static {
        let queue = Arc::clone(&self.queue);
        move |message| {
            queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(message);
        }
    }

    /// Remove the oldest queued message.
    pub fn pop(&self) -> Option<RpcMessage> {
        self.lock().pop_front()
    }

    /// Remove every queued message.
    pub fn drain(&self) -> Vec<RpcMessage> {
        self.lock().drain(..).collect()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver queued messages to `channel` in order, including any queued
    /// while delivering. Returns how many were delivered.
    pub fn deliver_to(&self, channel: &mut RpcChannel) -> usize {
        let mut delivered = 0;
        while let Some(message) = self.pop() {
            channel.handle_message(message);
            delivered += 1;
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RpcMessage>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Loopback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loopback").field("queued", &self.len()).finish()
    }
}

/// Two channels wired back to back.
///
/// `a` sends into `a_to_b`, `b` sends into `b_to_a`.
#[derive(Debug)]
pub struct LoopbackPair {
    /// The first endpoint.
    pub a: RpcChannel,
    /// The second endpoint.
    pub b: RpcChannel,
    /// Messages sent by `a`, not yet delivered to `b`.
    pub a_to_b: Loopback,
    /// Messages sent by `b`, not yet delivered to `a`.
    pub b_to_a: Loopback,
}

impl LoopbackPair {
    /// Connect two channels using the same configuration.
    pub fn new(config: crate::RpcConfig) -> Self {
        let a_to_b = Loopback::new();
        let b_to_a = Loopback::new();
        Self {
            a: RpcChannel::with_config(a_to_b.sender(), config),
            b: RpcChannel::with_config(b_to_a.sender(), config),
            a_to_b,
            b_to_a,
        }
    }

    /// Deliver in both directions until both queues are empty.
    /// Returns the number of messages delivered.
    pub fn pump(&mut self) -> usize {
        let mut total = 0;
        loop {
            let delivered = self.a_to_b.deliver_to(&mut self.b) + self.b_to_a.deliver_to(&mut self.a);
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CallId;

    #[test]
    fn test_fifo_order() {
        let link = Loopback::new();
        let mut send = link.sender();
        send(RpcMessage::Poll { id: CallId(1) });
        send(RpcMessage::Poll { id: CallId(2) });

        assert_eq!(link.len(), 2);
        assert_eq!(link.pop(), Some(RpcMessage::Poll { id: CallId(1) }));
        assert_eq!(link.drain(), vec![RpcMessage::Poll { id: CallId(2) }]);
        assert!(link.is_empty());
    }

    #[test]
    fn test_pump_quiesces() {
        let mut pair = LoopbackPair::new(crate::RpcConfig::default());
        pair.b
            .register_function("ping", |_| Ok(serde_json::json!("pong")))
            .unwrap();
        let id = pair.a.call_remote_function("ping", Vec::new()).unwrap();

        // Request, poll, result.
        assert_eq!(pair.pump(), 3);
        assert_eq!(pair.pump(), 0);
        assert_eq!(pair.a.try_take_result(id), Some(Ok(serde_json::json!("pong"))));
    }
}
