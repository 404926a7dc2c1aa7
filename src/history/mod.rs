//! Practice history.
//!
//! Every completed step is appended as a [`CompletedTimer`] and grouped
//! into [`TimerSession`]s. A session stays open while completions keep
//! arriving; a gap longer than the configured session gap starts a new one.
//! The whole history is persisted under a single storage key.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::completion::CompletedStep;
use crate::storage::{load_json, save_json, PersistentStore, StorageError};
use crate::types::TimerStep;

/// Storage key of the persisted history.
pub const HISTORY_STORAGE_KEY: &str = "yoga-timer-history";

/// Default idle gap after which a new session begins.
pub const DEFAULT_SESSION_GAP_MINUTES: i64 = 30;

// ============================================================================
// Records
// ============================================================================

/// A single completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTimer {
    /// Unique id of this completion
    pub id: String,
    /// Snapshot of the step as it ran
    pub step: TimerStep,
    /// Completion instant
    #[serde(rename = "completedAt")]
    pub completed_at: DateTime<Utc>,
    /// Session this completion belongs to
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Contiguous run of completions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSession {
    /// Session id
    pub id: String,
    /// Instant of the first completion
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    /// Completions in append order
    #[serde(rename = "completedTimers")]
    pub completed_timers: Vec<CompletedTimer>,
}

impl TimerSession {
    /// Total practiced seconds in this session.
    pub fn total_seconds(&self) -> u64 {
        self.completed_timers
            .iter()
            .map(|t| u64::from(t.step.duration))
            .sum()
    }

    fn last_completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_timers.last().map(|t| t.completed_at)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryData {
    #[serde(default)]
    sessions: Vec<TimerSession>,
    #[serde(rename = "currentSessionId", default)]
    current_session_id: Option<String>,
}

// ============================================================================
// HistorySink
// ============================================================================

/// Receives every completed step.
pub trait HistorySink: Send + Sync {
    /// Records a completion. May block on storage.
    fn record(&self, step: &TimerStep, completed_at: DateTime<Utc>);
}

// ============================================================================
// HistoryStore
// ============================================================================

/// Persisted, append-only practice history.
pub struct HistoryStore {
    store: Arc<dyn PersistentStore>,
    session_gap: Duration,
    data: Mutex<HistoryData>,
}

impl HistoryStore {
    /// Loads the history from `store`.
    ///
    /// A missing or unreadable value yields an empty history; the error is
    /// logged and the next write replaces the unreadable value.
    pub fn load(store: Arc<dyn PersistentStore>, session_gap: Duration) -> Self {
        let data = match load_json::<HistoryData>(store.as_ref(), HISTORY_STORAGE_KEY) {
            Ok(Some(data)) => data,
            Ok(None) => HistoryData::default(),
            Err(e) => {
                tracing::error!("Failed to load practice history: {}", e);
                HistoryData::default()
            }
        };

        Self {
            store,
            session_gap,
            data: Mutex::new(data),
        }
    }

    /// Appends a completion and persists the history.
    pub fn add_completed(
        &self,
        step: &TimerStep,
        completed_at: DateTime<Utc>,
    ) -> Result<CompletedTimer, StorageError> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());

        let open_session = data
            .current_session_id
            .clone()
            .filter(|id| {
                data.sessions
                    .iter()
                    .find(|s| &s.id == id)
                    .and_then(TimerSession::last_completed_at)
                    .is_some_and(|last| completed_at - last <= self.session_gap)
            });

        let session_id = match open_session {
            Some(id) => id,
            None => {
                let id = format!("session-{}", uuid::Uuid::new_v4());
                data.sessions.push(TimerSession {
                    id: id.clone(),
                    started_at: completed_at,
                    completed_timers: Vec::new(),
                });
                data.current_session_id = Some(id.clone());
                id
            }
        };

        let completed = CompletedTimer {
            id: format!("timer-{}", uuid::Uuid::new_v4()),
            step: step.clone(),
            completed_at,
            session_id: session_id.clone(),
        };

        if let Some(session) = data.sessions.iter_mut().find(|s| s.id == session_id) {
            session.completed_timers.push(completed.clone());
        }

        save_json(self.store.as_ref(), HISTORY_STORAGE_KEY, &*data)?;
        Ok(completed)
    }

    /// Returns up to `limit` completions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<CompletedTimer> {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<CompletedTimer> = data
            .sessions
            .iter()
            .flat_map(|s| s.completed_timers.iter().cloned())
            .collect();
        all.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        all.truncate(limit);
        all
    }

    /// Returns all sessions in creation order.
    pub fn sessions(&self) -> Vec<TimerSession> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sessions
            .clone()
    }

    /// Drops all history.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        *data = HistoryData::default();
        self.store.remove(HISTORY_STORAGE_KEY)
    }
}

impl HistorySink for HistoryStore {
    fn record(&self, step: &TimerStep, completed_at: DateTime<Utc>) {
        match self.add_completed(step, completed_at) {
            Ok(entry) => tracing::debug!(session = %entry.session_id, label = %step.label, "History recorded"),
            Err(e) => tracing::error!("Failed to persist history entry: {}", e),
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writer loop.
///
/// Hands every completion arriving on `completions` to `sink`. Each call
/// runs on the blocking pool, so a slow disk never holds up the timer.
/// Returns once the channel closes and is empty.
pub async fn record_completions(
    sink: Arc<dyn HistorySink>,
    mut completions: mpsc::UnboundedReceiver<CompletedStep>,
) {
    while let Some(completed) = completions.recv().await {
        let sink = Arc::clone(&sink);
        let written = tokio::task::spawn_blocking(move || {
            sink.record(&completed.step, completed.completed_at);
        })
        .await;
        if let Err(e) = written {
            tracing::error!("History write task failed: {}", e);
        }
    }
    tracing::debug!("Completion channel closed; history writer exiting");
}

// ============================================================================
// Tests
// ============================================================================
