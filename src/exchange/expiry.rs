//! Expiry Timers
//!
//! One-shot deadline per match, armed at creation. When it fires it runs the
//! caller-supplied teardown (retire the match, then delete the hosting
//! channel) regardless of submission progress. The timer is not cancelled on
//! reveal: retire is idempotent, so a timer firing after a reveal is a no-op.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::exchange::state::ChannelKey;

/// Handle to an armed expiry timer.
///
/// Dropping the handle does not stop the timer. [`cancel`](Self::cancel)
/// aborts it; a cancel that loses the race against the firing task is safe
/// because the teardown it runs is idempotent.
#[derive(Debug)]
pub struct ExpiryHandle {
    task: JoinHandle<()>,
}

impl ExpiryHandle {
    /// Abort the timer. Safe to call after it has already fired.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the timer task has run to completion (or been aborted).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Arms one-shot expiry deadlines on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryScheduler;

impl ExpiryScheduler {
    /// Create a scheduler.
    pub fn new() -> Self {
        Self
    }

    /// Schedule `on_fire` to run once, `after` from now, unless cancelled
    /// first. `on_fire` performs the teardown; it must tolerate the match
    /// having already been retired by a reveal.
    pub fn arm<F, Fut>(&self, channel: ChannelKey, after: Duration, on_fire: F) -> ExpiryHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            debug!("Expiry fired for channel {}", channel.to_hex());
            on_fire().await;
        });
        ExpiryHandle { task }
    }
}

// =============================================================================
// TESTS
// =============================================================================
