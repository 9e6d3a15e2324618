//! Outstanding-request table.
//!
//! Each in-flight request owns one or two waiters keyed by
//! `(sequence number, request kind)`. The receive loop fulfills a waiter by
//! removing it from the table and sending through its oneshot channel, so a
//! waiter can be satisfied at most once.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::protocol::{Message, RequestKind};

/// Correlation key of a waiter.
pub type WaiterKey = (u32, RequestKind);

/// What a blocked caller is woken up with.
#[derive(Debug)]
pub enum Outcome {
    /// The correlated message arrived.
    Reply(Message),
    /// The transport failed before it did.
    ConnectionLost,
}

/// Table of registered waiters.
#[derive(Debug, Default)]
pub struct Waiters {
    pending: HashMap<WaiterKey, oneshot::Sender<Outcome>>,
}

impl Waiters {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key` and return its receiving end.
    ///
    /// A waiter already registered under the same key is replaced, and its
    /// caller sees the connection as lost.
    pub fn register(&mut self, key: WaiterKey) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        if let Some(stale) = self.pending.insert(key, tx) {
            tracing::warn!(seq = key.0, kind = %key.1, "Replacing waiter with duplicate key");
            let _ = stale.send(Outcome::ConnectionLost);
        }
        rx
    }

    /// Hand `message` to the waiter registered for `key`, removing it.
    ///
    /// Gives the message back when nobody waits for that key.
    pub fn fulfill(&mut self, key: WaiterKey, message: Message) -> Result<(), Message> {
        let Some(tx) = self.pending.remove(&key) else {
            return Err(message);
        };
        if tx.send(Outcome::Reply(message)).is_err() {
            // The receiver is gone but its guard has not deregistered yet.
            tracing::debug!(seq = key.0, kind = %key.1, "Waiter dropped before delivery");
        }
        Ok(())
    }

    /// Remove the waiter for `key`. Returns whether it was still registered.
    pub fn cancel(&mut self, key: &WaiterKey) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Release every waiter with [`Outcome::ConnectionLost`].
    ///
    /// Returns how many waiters were released.
    pub fn fail_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Outcome::ConnectionLost);
        }
        count
    }

    /// Number of registered waiters.
    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if no waiter is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Check if a waiter is registered for `key`.
    #[inline]
    pub fn contains(&self, key: &WaiterKey) -> bool {
        self.pending.contains_key(key)
    }
}
