//! Transition scheduling.
//!
//! After a step completes the machine waits a fixed delay (for the gong to
//! ring out) before advancing. The delay is a one-shot per completion:
//! the scheduler hands a [`TransitionTicket`] back once it expires, and the
//! machine applies it only if the ticket still matches its live state.
//! Stale tickets (a skip or reset happened meanwhile) are ignored, so no
//! handle ever needs to be cancelled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::clock::Clock;

// ============================================================================
// TransitionTicket
// ============================================================================

/// Snapshot of the machine state captured when a transition is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTicket {
    /// Active index at scheduling time
    pub index: usize,
    /// Transition epoch at scheduling time
    pub epoch: u64,
}

// ============================================================================
// TransitionScheduler
// ============================================================================

/// Delivers a ticket back to the machine after a delay.
pub trait TransitionScheduler: Send + Sync {
    /// Schedules `ticket` to fire after `delay`.
    fn schedule(&self, delay: Duration, ticket: TransitionTicket);
}

// ============================================================================
// TokioScheduler
// ============================================================================

/// Scheduler backed by `tokio::time::sleep`.
///
/// Expired tickets are sent on the channel returned by [`TokioScheduler::new`];
/// the engine loop feeds them to `TimerMachine::complete_transition`.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TransitionTicket>,
}

impl TokioScheduler {
    /// Creates a scheduler and the receiving end for fired tickets.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransitionTicket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TransitionScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, ticket: TransitionTicket) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Cannot schedule transition outside a tokio runtime: {}", e);
                return;
            }
        };

        let tx = self.tx.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(ticket).is_err() {
                tracing::debug!(index = ticket.index, "Transition receiver dropped");
            }
        });
    }
}

// ============================================================================
// ManualScheduler
// ============================================================================

/// Scheduler that keeps tickets until the caller asks for the due ones.
///
/// Due-ness is judged against the injected clock, which makes transition
/// timing fully deterministic in tests.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: Arc<dyn Clock>,
    pending: Arc<Mutex<Vec<(DateTime<Utc>, TransitionTicket)>>>,
}

impl ManualScheduler {
    /// Creates a scheduler reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Removes and returns every ticket whose delay has expired.
    pub fn take_due(&self) -> Vec<TransitionTicket> {
        let now = self.clock.now();
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let mut due = Vec::new();
        pending.retain(|(fire_at, ticket)| {
            if *fire_at <= now {
                due.push(*ticket);
                false
            } else {
                true
            }
        });
        due
    }

    /// Returns the number of tickets still waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl TransitionScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, ticket: TransitionTicket) {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        let fire_at = self.clock.now() + delay;
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((fire_at, ticket));
    }
}

// ============================================================================
// Tests
// ============================================================================
