//! Time tracking for completed steps.
//!
//! Every completed step is reported to an external time-tracking service
//! on a best-effort basis. Deliveries that cannot happen right away are
//! parked in a durable [`PendingQueue`] and retried by [`TrackingSync`]
//! when configuration arrives or connectivity returns.
//!
//! # Architecture
//!
//! ```text
//! TimerMachine ──► CompletionForwarder ──(mpsc)──► TrackingSync::run
//!                                                     │
//!                                 ┌───────────────────┼──────────────┐
//!                                 ▼                   ▼              ▼
//!                          TrackingSink         PendingQueue    Connectivity
//!                        (ClockifySink)       (PersistentStore)  ConfigSource
//! ```

pub mod clockify;
mod config;
mod connectivity;
mod error;
mod queue;
mod sync;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

pub use clockify::ClockifySink;
pub use config::{ConfigSource, TrackingConfig};
pub use connectivity::Connectivity;
pub use error::TrackingError;
pub use queue::{
    PendingQueue, PendingTrackingEntry, DEFAULT_MAX_SYNC_ATTEMPTS, PENDING_QUEUE_KEY,
};
pub use sync::{DrainReport, SkipReason, SyncOutcome, SyncStatus, TrackingSync};

/// Remote time-tracking endpoint.
///
/// Implementations perform a single delivery attempt; retries are the
/// sync engine's job.
#[async_trait]
pub trait TrackingSink: Send + Sync {
    /// Reports that `task_label` ran for `duration_seconds`.
    async fn send(
        &self,
        config: &TrackingConfig,
        task_label: &str,
        duration_seconds: u32,
    ) -> Result<(), TrackingError>;
}

/// A delivery seen by [`MockTrackingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEntry {
    pub task_label: String,
    pub duration_seconds: u32,
}

/// Mock tracking sink for testing.
#[derive(Debug, Default)]
pub struct MockTrackingSink {
    sent: Mutex<Vec<SentEntry>>,
    attempts: AtomicUsize,
    should_fail: AtomicBool,
    fail_next: AtomicUsize,
}

impl MockTrackingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail until reset.
    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Makes the next `count` calls fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of calls, successful or not.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successful deliveries in call order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentEntry> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl TrackingSink for MockTrackingSink {
    async fn send(
        &self,
        _config: &TrackingConfig,
        task_label: &str,
        duration_seconds: u32,
    ) -> Result<(), TrackingError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(TrackingError::Network("Mock failure".to_string()));
        }
        let forced = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Err(TrackingError::Network("Mock failure".to_string()));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentEntry {
                task_label: task_label.to_string(),
                duration_seconds,
            });
        Ok(())
    }
}
