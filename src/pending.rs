//! The pending-invocation table: correlates outgoing `invoke` calls with
//! their `completion` response.
//!
//! Grounded directly on the original's `callback_manager`: an atomically
//! allocated decimal-string id, a mutex-guarded map, and a lock-then-copy-
//! then-invoke-outside-the-lock discipline for both single-entry completion
//! and bulk `clear`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use crate::value::Value;

/// An error delivered to a pending invocation: either a genuine hub-level
/// error taken from the completion's `error` field, or the connection being
/// torn down (`stop`/a channel-invalidating error) before a response arrived.
/// Kept distinct so callers can tell "the hub rejected this call" apart from
/// "this call never got an answer".
#[derive(Clone, Debug, PartialEq)]
pub enum InvocationError {
    Hub(String),
    Stopped,
}

/// Outcome delivered to a pending invocation: either the server's `result`,
/// or an [`InvocationError`].
pub type InvocationOutcome = Result<Value, InvocationError>;

#[derive(Default)]
pub struct PendingInvocations {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<String, oneshot::Sender<InvocationOutcome>>>,
}

impl PendingInvocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next invocation id and registers a receiver for it.
    /// The id is inserted before the caller sends the `invocation` frame, so
    /// a racing `completion` can never arrive before its entry exists.
    pub fn register(&self) -> (String, oneshot::Receiver<InvocationOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let (tx, rx) = oneshot::channel();
        self.callbacks.lock().unwrap().insert(id.clone(), tx);
        (id, rx)
    }

    /// Delivers `outcome` to the callback registered for `id`, removing the
    /// entry. Returns `false` if no such id was registered (already removed,
    /// unknown, or duplicate completion).
    pub fn invoke(&self, id: &str, outcome: InvocationOutcome) -> bool {
        let sender = self.callbacks.lock().unwrap().remove(id);
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `id` without invoking it. Idempotent: returns
    /// whether an entry was actually present.
    pub fn remove(&self, id: &str) -> bool {
        self.callbacks.lock().unwrap().remove(id).is_some()
    }

    /// Completes every outstanding callback with [`InvocationError::Stopped`],
    /// then clears the table. Used when the connection stops or a
    /// channel-invalidating error tears it down.
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut guard = self.callbacks.lock().unwrap();
            guard.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(InvocationError::Stopped));
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }
}
