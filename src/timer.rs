//! Periodic tick primitive and the generic timeout helper.
//!
//! `timeout()` is ported from the teacher's `utils/time.rs`. `periodic()`
//! generalizes the original's self-rescheduling `timer()`: `tick_fn` is
//! polled at a fixed cadence and returning `true` stops the loop.

use std::future::Future;
use std::time::Duration;

use crate::error::{SignalRError, TransportError};

pub async fn timeout<F, T>(duration: Duration, future: F) -> Result<T, SignalRError>
where
    F: Future<Output = Result<T, SignalRError>>,
{
    tokio::select! {
        _ = tokio::time::sleep(duration) => Err(SignalRError::Transport(TransportError::ConnectTimeout)),
        result = future => result,
    }
}

/// Default tick cadence used by the handshake timeout and keep-alive timers,
/// matching the original's ~15ms granularity.
pub const TICK_INTERVAL: Duration = Duration::from_millis(15);

/// Runs `tick_fn` every `TICK_INTERVAL` until it returns `true`.
pub async fn periodic<F>(mut tick_fn: F)
where
    F: FnMut() -> bool,
{
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        interval.tick().await;
        if tick_fn() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn timeout_fires_when_future_never_resolves() {
        let result: Result<(), SignalRError> =
            timeout(Duration::from_millis(20), std::future::pending()).await;
        assert!(matches!(
            result,
            Err(SignalRError::Transport(TransportError::ConnectTimeout))
        ));
    }

    #[tokio::test]
    async fn timeout_returns_future_result_when_it_completes_first() {
        let result = timeout(Duration::from_millis(200), async { Ok::<_, SignalRError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_stops_when_tick_fn_returns_true() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = tokio::spawn(async move {
            periodic(|| c.fetch_add(1, Ordering::SeqCst) >= 2).await;
        });
        tokio::time::advance(TICK_INTERVAL * 4).await;
        handle.await.unwrap();
        assert!(count.load(Ordering::SeqCst) >= 3);
    }
}
