//! One-shot cancellation signal, ported from the original's
//! `cancellation_token_source` / `cancellation_token` pair.
//!
//! The source is the owning handle; tokens are cheap clones that observe the
//! same underlying flag. Registered callbacks run once, either immediately
//! (if already canceled) or when `cancel()` is called.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio::time::{Duration, timeout};

#[derive(Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.canceled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Clears a prior cancellation so the token can be reused for a new
    /// attempt.
    pub fn reset(&self) {
        self.canceled.store(false, Ordering::SeqCst);
    }

    /// Resolves once this token is canceled; resolves immediately if it
    /// already is.
    pub async fn cancelled(&self) {
        if self.is_canceled() {
            return;
        }
        self.notify.notified().await;
    }

    /// Waits until canceled, or returns `false` if `timeout_ms` elapses first.
    pub async fn wait(&self, timeout_ms: u64) -> bool {
        if self.is_canceled() {
            return true;
        }
        let notified = self.notify.notified();
        match timeout(Duration::from_millis(timeout_ms), notified).await {
            Ok(()) => true,
            Err(_) => self.is_canceled(),
        }
    }

    /// Runs `cb` once this token is canceled. If already canceled, runs it
    /// immediately on the current task.
    pub fn register_callback<F>(&self, cb: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_canceled() {
            cb();
            return;
        }
        let token = self.clone();
        tokio::spawn(async move {
            token.notify.notified().await;
            cb();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn callback_registered_before_cancel_runs_on_cancel() {
        let token = CancellationToken::new();
        let (tx, rx) = tokio::sync::oneshot::channel();
        token.register_callback(move || {
            let _ = tx.send(());
        });
        token.cancel();
        tokio::time::timeout(Duration::from_millis(200), rx)
            .await
            .expect("callback should have fired")
            .unwrap();
    }

    #[tokio::test]
    async fn callback_registered_after_cancel_runs_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let (tx, rx) = tokio::sync::oneshot::channel();
        token.register_callback(move || {
            let _ = tx.send(());
        });
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn wait_times_out_without_cancellation() {
        let token = CancellationToken::new();
        assert!(!token.wait(20).await);
    }
}
