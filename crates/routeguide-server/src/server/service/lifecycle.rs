//! Stream admission and graceful shutdown.
//!
//! Every streaming call holds a [`StreamGuard`] for as long as it runs. The
//! [`Lifecycle`] uses those guards to refuse new streams once shutdown
//! starts, wait for in-flight streams to drain, and finally cancel whatever
//! is left via a shared [`CancellationToken`].

use crate::server::telemetry::{
    decrement_streams_inflight, increment_streams_inflight, record_stream_duration,
};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use routeguide_core::Error;
use std::sync::Arc;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

pub struct Lifecycle {
    accepting: AtomicBool,
    inflight: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl Lifecycle {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            accepting: AtomicBool::new(true),
            inflight: AtomicUsize::new(0),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Admits a new stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once [`shutdown`](Self::shutdown)
    /// has started.
    pub fn begin_stream(self: &Arc<Self>) -> Result<StreamGuard, Error> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown);
        }

        self.inflight.fetch_add(1, Ordering::AcqRel);
        increment_streams_inflight();

        Ok(StreamGuard {
            lifecycle: Arc::clone(self),
            started: Instant::now(),
        })
    }

    /// Number of streams currently holding a guard.
    pub fn streams_inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Token cancelled when in-flight streams must stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        !self.accepting.load(Ordering::Acquire)
    }

    /// Gracefully stops all streaming work.
    ///
    /// - Refuses new streams.
    /// - Waits up to `shutdown_timeout` for in-flight streams to finish.
    /// - Cancels the shared token so the remaining streams wind down.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new streams ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new streams");
        self.accepting.store(false, Ordering::Release);

        // === Phase 1: Wait for in-flight streams to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight()
        );
        let drain_result = timeout(self.shutdown_timeout, async {
            while self.streams_inflight() > 0 {
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight streams drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} streams still active)",
                    self.streams_inflight()
                );
            }
        }

        // === Phase 2: Cancel whatever is left ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining streams via shutdown token");
        self.shutdown_token.cancel();
    }
}

/// Marks one in-flight stream. Dropping it records the stream's duration.
pub struct StreamGuard {
    lifecycle: Arc<Lifecycle>,
    started: Instant,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.lifecycle.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
        record_stream_duration(self.started.elapsed().as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guards_track_inflight_streams() {
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_secs(1)));
        let a = lifecycle.begin_stream().unwrap();
        let b = lifecycle.begin_stream().unwrap();
        assert_eq!(lifecycle.streams_inflight(), 2);
        drop(a);
        assert_eq!(lifecycle.streams_inflight(), 1);
        drop(b);
        assert_eq!(lifecycle.streams_inflight(), 0);
    }

    #[tokio::test]
    async fn shutdown_without_streams_cancels_immediately() {
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_secs(30)));
        let token = lifecycle.shutdown_token();
        lifecycle.shutdown().await;
        assert!(token.is_cancelled());
        assert!(lifecycle.is_shutting_down());
        assert!(matches!(
            lifecycle.begin_stream(),
            Err(Error::ServiceShutdown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_drain_then_cancels() {
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_secs(5)));
        let guard = lifecycle.begin_stream().unwrap();
        let token = lifecycle.shutdown_token();

        let releaser = tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            drop(guard);
        });

        let started = Instant::now();
        lifecycle.shutdown().await;
        releaser.await.unwrap();

        assert!(token.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(lifecycle.streams_inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_gives_up_after_timeout() {
        let lifecycle = Arc::new(Lifecycle::new(Duration::from_secs(2)));
        let _stuck = lifecycle.begin_stream().unwrap();
        let token = lifecycle.shutdown_token();

        let started = Instant::now();
        lifecycle.shutdown().await;

        assert!(token.is_cancelled());
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(lifecycle.streams_inflight(), 1);
    }
}
