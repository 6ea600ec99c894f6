//! Media event delivery
//!
//! Decoder threads publish events; the UI side holds a [`Subscription`]
//! and drains it with `try_recv`. Dropping a subscription unsubscribes.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Fan-out publisher, cloneable across threads
pub struct EventBus<E> {
    subscribers: Arc<Mutex<Vec<Sender<E>>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<E: Clone + Send> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener
    pub fn subscribe(&self) -> Subscription<E> {
        let (tx, rx) = unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        Subscription { rx }
    }

    /// Deliver `event` to every live subscriber, pruning dropped ones
    pub fn emit(&self, event: E) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        trace!("Event delivered to {} subscribers", subscribers.len());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Receiving end of an [`EventBus`]
pub struct Subscription<E> {
    rx: Receiver<E>,
}

impl<E> Subscription<E> {
    /// Next pending event without blocking
    pub fn try_next(&self) -> Option<E> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// All pending events in delivery order
    pub fn drain(&self) -> Vec<E> {
        self.rx.try_iter().collect()
    }
}
