//! Periodic server tick.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::worker::panic_message;

/// Tick callback. Receives the running token and returns the delay until the
/// next tick.
pub type TickFn = Arc<dyn Fn(&CancellationToken) -> Duration + Send + Sync>;

/// Pause before a panicked tick is restarted.
pub(crate) const TICK_RESTART_DELAY: Duration = Duration::from_secs(1);

/// Run `on_tick` until `running` is cancelled or `stopping` is set.
///
/// A panicking tick is logged and restarted while the server is running.
pub(crate) fn spawn_ticker(
    on_tick: TickFn,
    running: CancellationToken,
    stopping: Arc<AtomicBool>,
    restart_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if stopping.load(Ordering::Acquire) || running.is_cancelled() {
                tracing::info!("server stopping, tick disabled");
                break;
            }

            let delay = match catch_unwind(AssertUnwindSafe(|| on_tick(&running))) {
                Ok(delay) => delay,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    if stopping.load(Ordering::Acquire) {
                        tracing::error!(panic = %message, "server tick panicked");
                        break;
                    }
                    tracing::error!(panic = %message, "server tick panicked, restarting");
                    restart_delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = running.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let running = CancellationToken::new();
        let handle = spawn_ticker(
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Duration::from_millis(5)
            }),
            running.clone(),
            Arc::new(AtomicBool::new(false)),
            TICK_RESTART_DELAY,
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        running.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_panicking_tick_restarts() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let running = CancellationToken::new();
        let _handle = spawn_ticker(
            Arc::new(move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    panic!("first tick fails");
                }
                Duration::from_millis(5)
            }),
            running.clone(),
            Arc::new(AtomicBool::new(false)),
            Duration::from_millis(5),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        running.cancel();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_stopping_disables_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let handle = spawn_ticker(
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Duration::from_millis(1)
            }),
            CancellationToken::new(),
            Arc::new(AtomicBool::new(true)),
            TICK_RESTART_DELAY,
        );
        handle.await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
