//! Tracking sync engine.
//!
//! Delivers completed steps to a [`TrackingSink`] at least once, falling
//! back to the [`PendingQueue`] whenever the device is offline or a
//! delivery fails. Queued entries are drained when the configuration
//! changes (debounced) and when connectivity comes back.
//!
//! Nothing here returns an error to the caller: every failure becomes a
//! queued entry, a dropped entry or a log line, and the outcome is kept
//! for [`TrackingSync::status`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::clock::{Clock, SystemClock};
use crate::completion::CompletedStep;
use crate::types::TimerStep;

use super::{
    ConfigSource, Connectivity, PendingQueue, PendingTrackingEntry, TrackingConfig, TrackingSink,
};

/// Default minimum spacing of config-triggered drains.
pub const DEFAULT_CONFIG_DEBOUNCE: Duration = Duration::from_secs(5);

/// Why an operation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No signed-in account to track for
    NoOwner,
    /// Project name, API key or workspace id missing
    NotConfigured,
    /// Device is offline
    Offline,
    /// A config-triggered drain ran too recently
    Debounced,
    /// Another drain pass is in progress
    Busy,
    /// Connectivity was already online
    NoChange,
}

/// Counts of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries delivered and removed
    pub synced: usize,
    /// Entries that failed and stay queued
    pub failed: usize,
    /// Entries removed after their last allowed attempt
    pub dropped: usize,
}

impl DrainReport {
    /// Number of entries the pass touched.
    pub fn total(&self) -> usize {
        self.synced + self.failed + self.dropped
    }
}

/// Result of a sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Delivered immediately
    Synced,
    /// Parked in the pending queue
    Queued,
    /// Nothing was attempted
    Skipped(SkipReason),
    /// Delivery failed and the entry could not be queued either
    Lost,
    /// A drain pass ran
    Drained(DrainReport),
}

impl SyncOutcome {
    /// Returns the drain counts if this outcome is a drain.
    pub fn drain_report(&self) -> Option<DrainReport> {
        match self {
            Self::Drained(report) => Some(*report),
            _ => None,
        }
    }
}

/// What a UI needs to report on tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Entries queued for the owner
    pub pending: usize,
    /// Current connectivity
    pub online: bool,
    /// Outcome of the most recent operation, if any
    pub last_outcome: Option<SyncOutcome>,
}

// ============================================================================
// TrackingSync
// ============================================================================

/// Best-effort delivery of completed steps to the tracking service.
pub struct TrackingSync {
    sink: Arc<dyn TrackingSink>,
    queue: Arc<PendingQueue>,
    connectivity: Connectivity,
    config: ConfigSource,
    clock: Arc<dyn Clock>,
    config_debounce: chrono::Duration,
    last_config_drain: Mutex<Option<DateTime<Utc>>>,
    last_online: AtomicBool,
    last_outcome: Mutex<Option<SyncOutcome>>,
    drain_lock: tokio::sync::Mutex<()>,
}

impl TrackingSync {
    pub fn new(
        sink: Arc<dyn TrackingSink>,
        queue: Arc<PendingQueue>,
        connectivity: Connectivity,
        config: ConfigSource,
    ) -> Self {
        let online = connectivity.is_online();
        Self {
            sink,
            queue,
            connectivity,
            config,
            clock: Arc::new(SystemClock),
            config_debounce: chrono::Duration::seconds(DEFAULT_CONFIG_DEBOUNCE.as_secs() as i64),
            last_config_drain: Mutex::new(None),
            last_online: AtomicBool::new(online),
            last_outcome: Mutex::new(None),
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Uses `clock` for entry timestamps and debouncing.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the minimum spacing of config-triggered drains.
    pub fn with_config_debounce(mut self, debounce: Duration) -> Self {
        self.config_debounce =
            chrono::Duration::from_std(debounce).unwrap_or(chrono::Duration::zero());
        self
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn config(&self) -> &ConfigSource {
        &self.config
    }

    /// Reports a completed step.
    ///
    /// Anonymous completions are ignored. Offline completions are always
    /// queued. Online completions without a complete configuration are
    /// ignored. Otherwise the sink is called and a failure is queued.
    pub async fn record_completion(
        &self,
        step: &TimerStep,
        owner: Option<&str>,
        config: &TrackingConfig,
    ) -> SyncOutcome {
        let outcome = self.deliver(step, owner, config).await;
        self.remember(outcome);
        outcome
    }

    async fn deliver(
        &self,
        step: &TimerStep,
        owner: Option<&str>,
        config: &TrackingConfig,
    ) -> SyncOutcome {
        let Some(owner) = owner else {
            tracing::debug!(label = %step.label, "No owner; not tracking");
            return SyncOutcome::Skipped(SkipReason::NoOwner);
        };

        if !self.connectivity.is_online() {
            tracing::info!(label = %step.label, "Offline; queueing completion");
            return self.enqueue(step, owner);
        }

        if !config.is_complete() {
            tracing::debug!(label = %step.label, "Tracking not configured; skipping");
            return SyncOutcome::Skipped(SkipReason::NotConfigured);
        }

        match self.sink.send(config, &step.label, step.duration).await {
            Ok(()) => {
                tracing::info!(label = %step.label, duration = step.duration, "Tracked completion");
                SyncOutcome::Synced
            }
            Err(e) => {
                tracing::warn!(
                    label = %step.label,
                    transient = e.is_transient(),
                    "Tracking failed, queueing: {}",
                    e
                );
                self.enqueue(step, owner)
            }
        }
    }

    fn enqueue(&self, step: &TimerStep, owner: &str) -> SyncOutcome {
        let entry =
            PendingTrackingEntry::new(step.label.clone(), step.duration, owner, self.clock.now());
        match self.queue.append(entry) {
            Ok(()) => SyncOutcome::Queued,
            Err(e) => {
                tracing::error!(label = %step.label, "Failed to queue completion: {}", e);
                SyncOutcome::Lost
            }
        }
    }

    /// Runs one drain pass over `owner`'s queued entries.
    ///
    /// Entries are tried in insertion order. A success removes the entry;
    /// a failure bumps its attempt counter and drops it once the limit is
    /// reached. Other owners' entries are never touched.
    pub async fn drain(&self, owner: &str, config: &TrackingConfig) -> SyncOutcome {
        let outcome = self.drain_inner(owner, config).await;
        self.remember(outcome);
        outcome
    }

    async fn drain_inner(&self, owner: &str, config: &TrackingConfig) -> SyncOutcome {
        if !self.connectivity.is_online() {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        if !config.is_complete() {
            tracing::debug!("Tracking not configured; keeping pending entries");
            return SyncOutcome::Skipped(SkipReason::NotConfigured);
        }

        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::debug!("Drain already running");
            return SyncOutcome::Skipped(SkipReason::Busy);
        };

        let entries = match self.queue.list_for_owner(owner) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to read pending queue: {}", e);
                return SyncOutcome::Drained(DrainReport::default());
            }
        };
        if entries.is_empty() {
            return SyncOutcome::Drained(DrainReport::default());
        }

        tracing::info!(count = entries.len(), "Syncing pending tracking entries");
        let mut report = DrainReport::default();

        for entry in entries {
            match self
                .sink
                .send(config, &entry.task_label, entry.duration_seconds)
                .await
            {
                Ok(()) => {
                    if let Err(e) = self.queue.remove(&entry.id) {
                        tracing::error!(id = %entry.id, "Failed to remove synced entry: {}", e);
                    }
                    tracing::info!(task = %entry.task_label, "Synced pending entry");
                    report.synced += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        task = %entry.task_label,
                        transient = e.is_transient(),
                        "Failed to sync pending entry: {}",
                        e
                    );
                    match self.queue.increment_attempts(&entry.id) {
                        Ok(true) => {
                            if let Err(e) = self.queue.remove(&entry.id) {
                                tracing::error!(id = %entry.id, "Failed to drop entry: {}", e);
                            }
                            tracing::warn!(
                                task = %entry.task_label,
                                "Dropped pending entry after max attempts"
                            );
                            report.dropped += 1;
                        }
                        Ok(false) => report.failed += 1,
                        Err(e) => {
                            tracing::error!(id = %entry.id, "Failed to record attempt: {}", e);
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        tracing::info!(
            synced = report.synced,
            failed = report.failed,
            dropped = report.dropped,
            "Drain finished"
        );
        SyncOutcome::Drained(report)
    }

    /// Handles a configuration change.
    ///
    /// Drains at most once per debounce window; checks that skip the
    /// drain (offline, unconfigured) do not consume the window.
    pub async fn on_config_changed(&self, owner: Option<&str>) -> SyncOutcome {
        let Some(owner) = owner else {
            return SyncOutcome::Skipped(SkipReason::NoOwner);
        };
        if !self.connectivity.is_online() {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        let config = self.config.current();
        if !config.is_complete() {
            return SyncOutcome::Skipped(SkipReason::NotConfigured);
        }

        let now = self.clock.now();
        {
            let mut last = self
                .last_config_drain
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = *last {
                if now - previous < self.config_debounce {
                    tracing::debug!("Config drain debounced");
                    return SyncOutcome::Skipped(SkipReason::Debounced);
                }
            }
            *last = Some(now);
        }

        self.drain(owner, &config).await
    }

    /// Handles a connectivity update. Drains only on an offline to online
    /// transition.
    pub async fn on_connectivity_changed(&self, online: bool, owner: Option<&str>) -> SyncOutcome {
        let was_online = self.last_online.swap(online, Ordering::SeqCst);
        if !online {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        if was_online {
            return SyncOutcome::Skipped(SkipReason::NoChange);
        }
        self.on_reconnected(owner).await
    }

    async fn on_reconnected(&self, owner: Option<&str>) -> SyncOutcome {
        tracing::info!("Back online; checking pending queue");
        let Some(owner) = owner else {
            return SyncOutcome::Skipped(SkipReason::NoOwner);
        };
        let config = self.config.current();
        self.drain(owner, &config).await
    }

    /// Returns the pending count for `owner` and the last outcome.
    pub fn status(&self, owner: Option<&str>) -> SyncStatus {
        let pending = match owner {
            Some(owner) => self
                .queue
                .list_for_owner(owner)
                .map(|entries| entries.len())
                .unwrap_or_else(|e| {
                    tracing::error!("Failed to read pending queue: {}", e);
                    0
                }),
            None => 0,
        };
        SyncStatus {
            pending,
            online: self.connectivity.is_online(),
            last_outcome: self.last_outcome(),
        }
    }

    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        *self.last_outcome.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remember(&self, outcome: SyncOutcome) {
        *self.last_outcome.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
    }

    /// Worker loop.
    ///
    /// Records every completion arriving on `completions`, and reacts to
    /// configuration and connectivity changes. Starts with a config
    /// drain for entries left over from earlier runs. Returns once the
    /// completion channel closes and is empty.
    pub async fn run(
        self: Arc<Self>,
        owner: Option<String>,
        mut completions: mpsc::UnboundedReceiver<CompletedStep>,
    ) {
        let mut config_rx = self.config.subscribe();
        let mut online_rx = self.connectivity.subscribe();
        config_rx.mark_unchanged();
        online_rx.mark_unchanged();

        self.on_config_changed(owner.as_deref()).await;

        loop {
            tokio::select! {
                completed = completions.recv() => {
                    let Some(completed) = completed else {
                        tracing::debug!("Completion channel closed; tracking worker exiting");
                        break;
                    };
                    let config = self.config.current();
                    self.record_completion(&completed.step, owner.as_deref(), &config)
                        .await;
                }
                Ok(()) = config_rx.changed() => {
                    self.on_config_changed(owner.as_deref()).await;
                }
                Ok(()) = online_rx.changed() => {
                    let online = *online_rx.borrow_and_update();
                    self.last_online.store(online, Ordering::SeqCst);
                    // notifications fire only on change, so `true` always
                    // follows an offline period, even one that was coalesced
                    if online {
                        self.on_reconnected(owner.as_deref()).await;
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::tracking::MockTrackingSink;

    struct Harness {
        sink: Arc<MockTrackingSink>,
        clock: ManualClock,
        sync: Arc<TrackingSync>,
    }

    fn harness(online: bool, config: TrackingConfig) -> Harness {
        let sink = Arc::new(MockTrackingSink::new());
        let clock = ManualClock::at_epoch();
        let queue = Arc::new(PendingQueue::new(Arc::new(MemoryStore::new())));
        let sync = TrackingSync::new(
            sink.clone(),
            queue,
            Connectivity::new(online),
            ConfigSource::new(config),
        )
        .with_clock(Arc::new(clock.clone()));
        Harness {
            sink,
            clock,
            sync: Arc::new(sync),
        }
    }

    fn configured() -> TrackingConfig {
        TrackingConfig::new("Yoga", "key", "ws")
    }

    fn step(label: &str) -> TimerStep {
        TimerStep::new("s1", label, 600)
    }

    mod record_tests {
        use super::*;

        #[tokio::test]
        async fn test_no_owner_is_noop() {
            let h = harness(true, configured());
            let outcome = h
                .sync
                .record_completion(&step("Kirtan"), None, &configured())
                .await;

            assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::NoOwner));
            assert_eq!(h.sink.attempt_count(), 0);
            assert!(h.sync.queue().is_empty().unwrap());
        }

        #[tokio::test]
        async fn test_offline_always_queues() {
            let h = harness(false, TrackingConfig::default());
            let outcome = h
                .sync
                .record_completion(&step("Kirtan"), Some("u1"), &TrackingConfig::default())
                .await;

            assert_eq!(outcome, SyncOutcome::Queued);
            assert_eq!(h.sink.attempt_count(), 0);
            let queued = h.sync.queue().list_for_owner("u1").unwrap();
            assert_eq!(queued.len(), 1);
            assert_eq!(queued[0].task_label, "Kirtan");
            assert_eq!(queued[0].duration_seconds, 600);
            assert_eq!(queued[0].sync_attempts, 0);
        }

        #[tokio::test]
        async fn test_online_unconfigured_neither_sends_nor_queues() {
            let h = harness(true, TrackingConfig::default());
            let outcome = h
                .sync
                .record_completion(&step("Kirtan"), Some("u1"), &TrackingConfig::default())
                .await;

            assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::NotConfigured));
            assert_eq!(h.sink.attempt_count(), 0);
            assert!(h.sync.queue().is_empty().unwrap());
        }

        #[tokio::test]
        async fn test_online_configured_sends() {
            let h = harness(true, configured());
            let outcome = h
                .sync
                .record_completion(&step("Kirtan"), Some("u1"), &configured())
                .await;

            assert_eq!(outcome, SyncOutcome::Synced);
            assert_eq!(h.sink.sent_count(), 1);
            assert!(h.sync.queue().is_empty().unwrap());
        }

        #[tokio::test]
        async fn test_failed_send_queues() {
            let h = harness(true, configured());
            h.sink.fail_next(1);

            let outcome = h
                .sync
                .record_completion(&step("Kirtan"), Some("u1"), &configured())
                .await;

            assert_eq!(outcome, SyncOutcome::Queued);
            assert_eq!(h.sync.queue().list_for_owner("u1").unwrap().len(), 1);
            assert_eq!(h.sync.last_outcome(), Some(SyncOutcome::Queued));
        }

        #[tokio::test]
        async fn test_queued_entry_uses_clock_time() {
            let h = harness(false, configured());
            h.clock.advance_secs(42);
            h.sync
                .record_completion(&step("Kirtan"), Some("u1"), &configured())
                .await;

            let queued = h.sync.queue().entries().unwrap();
            assert_eq!(queued[0].created_at.timestamp(), 42);
        }
    }

    mod drain_tests {
        use super::*;

        async fn queue_offline(h: &Harness, label: &str, owner: &str) {
            h.sync.connectivity().set_online(false);
            h.sync
                .record_completion(&step(label), Some(owner), &configured())
                .await;
            h.sync.connectivity().set_online(true);
        }

        #[tokio::test]
        async fn test_drain_removes_synced_entries() {
            let h = harness(true, configured());
            queue_offline(&h, "Kirtan", "u1").await;
            queue_offline(&h, "Meditation", "u1").await;

            let outcome = h.sync.drain("u1", &configured()).await;

            assert_eq!(
                outcome.drain_report(),
                Some(DrainReport {
                    synced: 2,
                    failed: 0,
                    dropped: 0
                })
            );
            let labels: Vec<String> = h.sink.sent().into_iter().map(|s| s.task_label).collect();
            assert_eq!(labels, vec!["Kirtan", "Meditation"]);
            assert!(h.sync.queue().is_empty().unwrap());
        }

        #[tokio::test]
        async fn test_three_failures_drop_entry() {
            let h = harness(true, configured());
            queue_offline(&h, "Kirtan", "u1").await;
            h.sink.set_should_fail(true);

            let first = h.sync.drain("u1", &configured()).await;
            let second = h.sync.drain("u1", &configured()).await;
            assert_eq!(first.drain_report().unwrap().failed, 1);
            assert_eq!(second.drain_report().unwrap().failed, 1);

            let third = h.sync.drain("u1", &configured()).await;
            assert_eq!(third.drain_report().unwrap().dropped, 1);
            assert!(h.sync.queue().list_for_owner("u1").unwrap().is_empty());

            let attempts_before = h.sink.attempt_count();
            let fourth = h.sync.drain("u1", &configured()).await;
            assert_eq!(fourth.drain_report().unwrap().total(), 0);
            assert_eq!(h.sink.attempt_count(), attempts_before);
        }

        #[tokio::test]
        async fn test_drain_leaves_other_owners_alone() {
            let h = harness(true, configured());
            queue_offline(&h, "Kirtan", "u1").await;
            queue_offline(&h, "Meditation", "u2").await;

            h.sync.drain("u1", &configured()).await;

            assert!(h.sync.queue().list_for_owner("u1").unwrap().is_empty());
            assert_eq!(h.sync.queue().list_for_owner("u2").unwrap().len(), 1);
            assert_eq!(h.sink.sent_count(), 1);
        }

        #[tokio::test]
        async fn test_drain_skips_when_offline_or_unconfigured() {
            let h = harness(true, configured());
            queue_offline(&h, "Kirtan", "u1").await;

            h.sync.connectivity().set_online(false);
            assert_eq!(
                h.sync.drain("u1", &configured()).await,
                SyncOutcome::Skipped(SkipReason::Offline)
            );
            h.sync.connectivity().set_online(true);
            assert_eq!(
                h.sync.drain("u1", &TrackingConfig::default()).await,
                SyncOutcome::Skipped(SkipReason::NotConfigured)
            );
            assert_eq!(h.sink.attempt_count(), 0);
            assert_eq!(h.sync.queue().len().unwrap(), 1);
        }
    }

    mod trigger_tests {
        use super::*;

        #[tokio::test]
        async fn test_config_drain_is_debounced() {
            let h = harness(true, configured());

            let first = h.sync.on_config_changed(Some("u1")).await;
            assert!(first.drain_report().is_some());

            h.clock.advance_secs(2);
            assert_eq!(
                h.sync.on_config_changed(Some("u1")).await,
                SyncOutcome::Skipped(SkipReason::Debounced)
            );

            h.clock.advance_secs(3);
            assert!(h.sync.on_config_changed(Some("u1")).await.drain_report().is_some());
        }

        #[tokio::test]
        async fn test_unconfigured_check_does_not_consume_debounce() {
            let h = harness(true, TrackingConfig::default());
            assert_eq!(
                h.sync.on_config_changed(Some("u1")).await,
                SyncOutcome::Skipped(SkipReason::NotConfigured)
            );

            h.sync.config().set(configured());
            assert!(h.sync.on_config_changed(Some("u1")).await.drain_report().is_some());
        }

        #[tokio::test]
        async fn test_reconnect_drains_only_on_transition() {
            let h = harness(false, configured());
            h.sync
                .record_completion(&step("Kirtan"), Some("u1"), &configured())
                .await;

            h.sync.connectivity().set_online(true);
            let outcome = h.sync.on_connectivity_changed(true, Some("u1")).await;
            assert_eq!(outcome.drain_report().unwrap().synced, 1);

            // already online: nothing to do
            let again = h.sync.on_connectivity_changed(true, Some("u1")).await;
            assert_eq!(again, SyncOutcome::Skipped(SkipReason::NoChange));
            assert_eq!(h.sink.attempt_count(), 1);
        }

        #[tokio::test]
        async fn test_status_reports_pending_for_owner() {
            let h = harness(false, configured());
            h.sync
                .record_completion(&step("Kirtan"), Some("u1"), &configured())
                .await;
            h.sync
                .record_completion(&step("Kirtan"), Some("u2"), &configured())
                .await;

            let status = h.sync.status(Some("u1"));
            assert_eq!(status.pending, 1);
            assert!(!status.online);
            assert_eq!(status.last_outcome, Some(SyncOutcome::Queued));
            assert_eq!(h.sync.status(None).pending, 0);
        }
    }

    mod worker_tests {
        use super::*;

        fn completed(label: &str) -> CompletedStep {
            CompletedStep {
                step: step(label),
                completed_at: Utc::now(),
            }
        }

        /// Polls `condition` for up to a second.
        async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
            for _ in 0..200 {
                if condition() {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            condition()
        }

        #[tokio::test]
        async fn test_run_records_completions_until_channel_closes() {
            let h = harness(true, configured());
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = tokio::spawn(h.sync.clone().run(Some("u1".to_string()), rx));

            tx.send(CompletedStep {
                step: step("Kirtan"),
                completed_at: Utc::now(),
            })
            .unwrap();
            drop(tx);
            worker.await.unwrap();

            assert_eq!(h.sink.sent_count(), 1);
        }

        #[tokio::test]
        async fn test_run_drains_leftovers_on_start() {
            let h = harness(false, configured());
            h.sync
                .record_completion(&step("Kirtan"), Some("u1"), &configured())
                .await;
            h.sync.connectivity().set_online(true);
            h.sync.on_connectivity_changed(true, None).await;

            let (tx, rx) = mpsc::unbounded_channel::<CompletedStep>();
            drop(tx);
            h.sync.clone().run(Some("u1".to_string()), rx).await;

            assert_eq!(h.sink.sent_count(), 1);
            assert!(h.sync.queue().is_empty().unwrap());
        }

        #[tokio::test]
        async fn test_run_drains_when_connectivity_returns() {
            let h = harness(false, configured());
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = tokio::spawn(h.sync.clone().run(Some("u1".to_string()), rx));

            tx.send(completed("Kirtan")).unwrap();
            assert!(wait_for(|| h.sync.queue().len().unwrap() == 1).await);
            assert_eq!(h.sink.attempt_count(), 0);

            h.sync.connectivity().set_online(true);
            assert!(wait_for(|| h.sync.queue().is_empty().unwrap()).await);
            assert_eq!(h.sink.sent_count(), 1);

            drop(tx);
            worker.await.unwrap();
        }

        #[tokio::test]
        async fn test_run_drains_after_coalesced_disconnect() {
            let h = harness(true, configured());
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = tokio::spawn(h.sync.clone().run(Some("u1".to_string()), rx));

            h.sink.fail_next(1);
            tx.send(completed("Kirtan")).unwrap();
            assert!(wait_for(|| h.sync.queue().len().unwrap() == 1).await);

            // both updates land before the worker gets to run
            h.sync.connectivity().set_online(false);
            h.sync.connectivity().set_online(true);

            assert!(wait_for(|| h.sync.queue().is_empty().unwrap()).await);
            assert_eq!(h.sink.sent_count(), 1);
            assert_eq!(
                h.sync.last_outcome().and_then(|o| o.drain_report()).map(|r| r.synced),
                Some(1)
            );

            drop(tx);
            worker.await.unwrap();
        }

        #[tokio::test]
        async fn test_run_drains_on_config_change_once_per_window() {
            let h = harness(true, TrackingConfig::default());
            h.sync
                .queue()
                .append(PendingTrackingEntry::new("Kirtan", 600, "u1", Utc::now()))
                .unwrap();
            let (tx, rx) = mpsc::unbounded_channel::<CompletedStep>();
            let worker = tokio::spawn(h.sync.clone().run(Some("u1".to_string()), rx));

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(h.sink.attempt_count(), 0);

            h.sync.config().set(configured());
            assert!(wait_for(|| h.sync.queue().is_empty().unwrap()).await);
            assert_eq!(h.sink.sent_count(), 1);

            // a second change inside the window does not drain
            h.sync
                .queue()
                .append(PendingTrackingEntry::new("Meditation", 1200, "u1", Utc::now()))
                .unwrap();
            h.sync
                .config()
                .set(TrackingConfig::new("Yoga Nidra", "key", "ws"));
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(h.sink.attempt_count(), 1);
            assert_eq!(h.sync.queue().len().unwrap(), 1);

            h.clock.advance_secs(5);
            h.sync.config().set(configured());
            assert!(wait_for(|| h.sync.queue().is_empty().unwrap()).await);
            assert_eq!(h.sink.sent_count(), 2);

            drop(tx);
            worker.await.unwrap();
        }
    }
}
