//! Completion sink.
//!
//! The timer machine reports each finished step to a [`CompletionSink`].
//! Dispatch is fire-and-forget: the sink must return immediately and never
//! fail back into the machine. [`CompletionForwarder`] hands the step to
//! the history writer and to the tracking worker over channels.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::types::TimerStep;

/// A completed step on its way to tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedStep {
    /// The step that finished
    pub step: TimerStep,
    /// When it finished
    pub completed_at: DateTime<Utc>,
}

/// Receiver of completed steps.
pub trait CompletionSink: Send + Sync {
    /// Called once per completed step. Must not block.
    fn step_completed(&self, step: &TimerStep, completed_at: DateTime<Utc>);
}

// ============================================================================
// CompletionForwarder
// ============================================================================

/// Forwards completions to the history writer and the tracking worker.
pub struct CompletionForwarder {
    history_tx: Option<mpsc::UnboundedSender<CompletedStep>>,
    tracking_tx: Option<mpsc::UnboundedSender<CompletedStep>>,
}

impl CompletionForwarder {
    /// Creates a forwarder with no downstream consumers.
    pub fn new() -> Self {
        Self {
            history_tx: None,
            tracking_tx: None,
        }
    }

    /// Sends completions to the history writer listening on `tx`.
    pub fn with_history(mut self, tx: mpsc::UnboundedSender<CompletedStep>) -> Self {
        self.history_tx = Some(tx);
        self
    }

    /// Sends completions to the tracking worker listening on `tx`.
    pub fn with_tracking(mut self, tx: mpsc::UnboundedSender<CompletedStep>) -> Self {
        self.tracking_tx = Some(tx);
        self
    }
}

impl Default for CompletionForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSink for CompletionForwarder {
    fn step_completed(&self, step: &TimerStep, completed_at: DateTime<Utc>) {
        let completed = CompletedStep {
            step: step.clone(),
            completed_at,
        };

        if let Some(tx) = &self.history_tx {
            if tx.send(completed.clone()).is_err() {
                tracing::warn!(label = %step.label, "History writer is gone; completion not recorded");
            }
        }

        if let Some(tx) = &self.tracking_tx {
            if tx.send(completed).is_err() {
                tracing::warn!(label = %step.label, "Tracking worker is gone; completion not tracked");
            }
        }
    }
}

// ============================================================================
// RecordingCompletionSink
// ============================================================================

/// Sink that only remembers what it received.
#[derive(Debug, Default)]
pub struct RecordingCompletionSink {
    received: Mutex<Vec<CompletedStep>>,
}

impl RecordingCompletionSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every completion received so far.
    #[must_use]
    pub fn completions(&self) -> Vec<CompletedStep> {
        self.received.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns the number of completions received.
    #[must_use]
    pub fn count(&self) -> usize {
        self.received.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl CompletionSink for RecordingCompletionSink {
    fn step_completed(&self, step: &TimerStep, completed_at: DateTime<Utc>) {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(CompletedStep {
                step: step.clone(),
                completed_at,
            });
    }
}
