//! Timer engine for the yoga timer.
//!
//! Drives a shared [`TimerMachine`] from a tokio task:
//! - Periodic ticks (100 ms by default) calling `update_time`
//! - Delivery of expired transition tickets to `complete_transition`
//!
//! Commands from the UI lock the same machine between ticks, so every
//! state change is applied one at a time.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::clock::Clock;
use crate::completion::CompletionSink;
use crate::config::TimerSettings;
use crate::types::TimerStatus;

use super::machine::{TimerEvent, TimerMachine};
use super::transition::{TokioScheduler, TransitionTicket};

// ============================================================================
// TimerEngine
// ============================================================================

/// Tick loop around a shared timer machine.
pub struct TimerEngine {
    machine: Arc<Mutex<TimerMachine>>,
    transitions: mpsc::UnboundedReceiver<TransitionTicket>,
    tick_interval: Duration,
}

impl TimerEngine {
    /// Creates an engine with a fresh machine wired to a tokio scheduler.
    pub fn new(
        clock: Arc<dyn Clock>,
        completions: Arc<dyn CompletionSink>,
        settings: &TimerSettings,
        event_tx: Option<mpsc::UnboundedSender<TimerEvent>>,
    ) -> Self {
        let (scheduler, transitions) = TokioScheduler::new();
        let mut machine = TimerMachine::new(clock, Arc::new(scheduler), completions)
            .with_transition_delay(settings.transition_delay());
        if let Some(tx) = event_tx {
            machine = machine.with_event_sender(tx);
        }

        Self {
            machine: Arc::new(Mutex::new(machine)),
            transitions,
            tick_interval: settings.tick_interval(),
        }
    }

    /// Returns a handle to the shared machine for issuing commands.
    pub fn machine(&self) -> Arc<Mutex<TimerMachine>> {
        Arc::clone(&self.machine)
    }

    /// Runs the tick loop until the run completes.
    ///
    /// An idle or paused machine keeps the loop waiting; callers stop it
    /// by dropping the future (for example from `select!`).
    pub async fn run_until_completed(&mut self) -> Result<()> {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut machine = self.machine.lock().await;
                    machine.update_time();
                    if machine.status() == TimerStatus::Completed {
                        return Ok(());
                    }
                }
                Some(ticket) = self.transitions.recv() => {
                    let mut machine = self.machine.lock().await;
                    machine.complete_transition(ticket);
                    if machine.status() == TimerStatus::Completed {
                        return Ok(());
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
