//! Timer state machine.
//!
//! Owns the step queue and the run state of the active step:
//! - State transitions (Idle → Running ⇄ Paused, Running → Transitioning → Running | Completed)
//! - Wall-clock based countdown (elapsed time is recomputed from timestamps)
//! - Completion cue selection and the delayed, guarded advance to the next step
//! - Loop handling at the end of the queue
//!
//! Commands never fail. A command that makes no sense in the current state
//! (starting an empty queue, pausing an idle timer) is a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::clock::{millis_between, Clock};
use crate::completion::CompletionSink;
use crate::types::{CompletionCue, TimerSnapshot, TimerStatus, TimerStep};

use super::transition::{TransitionScheduler, TransitionTicket};

/// Default pause between a step completing and the next one starting.
pub const DEFAULT_TRANSITION_DELAY: Duration = Duration::from_millis(3000);

/// Smallest duration `adjust_timer_duration` will leave on a step.
const MIN_ADJUSTED_SECONDS: i64 = 60;

// ============================================================================
// TimerEvent
// ============================================================================

/// State-change notifications for UI and integrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A new queue was loaded
    QueueSet {
        /// Number of steps
        length: usize,
    },
    /// The timer started or resumed
    Started {
        /// Active step index
        index: usize,
    },
    /// The timer was paused
    Paused {
        /// Seconds left in the active step
        time_left: u32,
    },
    /// The displayed countdown changed
    Tick {
        /// Active step index
        index: usize,
        /// Seconds left in the active step
        time_left: u32,
    },
    /// A step ran to zero
    StepCompleted {
        /// Index of the completed step
        index: usize,
        /// Label of the completed step
        label: String,
        /// Cue to play
        cue: CompletionCue,
    },
    /// Moved to another step (scheduled advance or skip)
    Advanced {
        /// New active index
        index: usize,
    },
    /// Wrapped from the last step back to the first
    Looped,
    /// The active step was rewound
    Reset {
        /// Active step index
        index: usize,
    },
    /// A step's duration was changed
    DurationAdjusted {
        /// Index of the adjusted step
        index: usize,
        /// New duration in seconds
        duration: u32,
    },
    /// The run finished
    RunCompleted,
    /// Queue and run state were cleared
    Cleared,
}

// ============================================================================
// TimerMachine
// ============================================================================

/// Single-owner timer state machine.
pub struct TimerMachine {
    queue: Vec<TimerStep>,
    active_index: usize,
    status: TimerStatus,
    /// Elapsed milliseconds of the active step outside the current running interval
    accumulated_ms: i64,
    /// Start of the current running interval; set iff status is Running
    anchor: Option<DateTime<Utc>>,
    time_left: u32,
    progress: f64,
    is_looping: bool,
    pending_cue: Option<CompletionCue>,
    /// Bumped on every scheduled transition and every command that must
    /// invalidate one
    transition_epoch: u64,
    transition_delay: Duration,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn TransitionScheduler>,
    completions: Arc<dyn CompletionSink>,
    event_tx: Option<mpsc::UnboundedSender<TimerEvent>>,
}

impl TimerMachine {
    /// Creates an idle machine with an empty queue.
    pub fn new(
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn TransitionScheduler>,
        completions: Arc<dyn CompletionSink>,
    ) -> Self {
        Self {
            queue: Vec::new(),
            active_index: 0,
            status: TimerStatus::Idle,
            accumulated_ms: 0,
            anchor: None,
            time_left: 0,
            progress: 0.0,
            is_looping: false,
            pending_cue: None,
            transition_epoch: 0,
            transition_delay: DEFAULT_TRANSITION_DELAY,
            clock,
            scheduler,
            completions,
            event_tx: None,
        }
    }

    /// Sends state-change events to `tx`.
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<TimerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Overrides the transition delay.
    pub fn with_transition_delay(mut self, delay: Duration) -> Self {
        self.transition_delay = delay;
        self
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Replaces the queue and resets all run state.
    pub fn set_queue(&mut self, steps: Vec<TimerStep>) {
        self.queue = steps.into_iter().map(TimerStep::sanitized).collect();
        self.active_index = 0;
        self.status = TimerStatus::Idle;
        self.accumulated_ms = 0;
        self.anchor = None;
        self.time_left = self.queue.first().map_or(0, |s| s.duration);
        self.progress = 0.0;
        self.pending_cue = None;
        self.transition_epoch += 1;

        self.emit(TimerEvent::QueueSet {
            length: self.queue.len(),
        });
    }

    /// Starts or resumes the timer.
    ///
    /// After a completed run (or whenever nothing is left on the clock) the
    /// run restarts from the first step.
    pub fn start(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        if matches!(self.status, TimerStatus::Running | TimerStatus::Transitioning) {
            return;
        }

        if self.status == TimerStatus::Completed
            || (self.time_left == 0 && self.status != TimerStatus::Paused)
        {
            self.active_index = 0;
            self.time_left = self.queue[0].duration;
            self.accumulated_ms = 0;
            self.progress = 0.0;
        }

        self.status = TimerStatus::Running;
        self.anchor = Some(self.clock.now());

        tracing::debug!(index = self.active_index, "Timer started");
        self.emit(TimerEvent::Started {
            index: self.active_index,
        });
    }

    /// Pauses a running timer, folding the running interval into the
    /// accumulated time.
    pub fn pause(&mut self) {
        if self.status != TimerStatus::Running {
            return;
        }
        let Some(anchor) = self.anchor.take() else {
            return;
        };

        let now = self.clock.now();
        let limit = self.current_duration_ms();
        self.accumulated_ms = (self.accumulated_ms + millis_between(anchor, now)).min(limit);
        self.status = TimerStatus::Paused;
        self.refresh_countdown(self.accumulated_ms);

        self.emit(TimerEvent::Paused {
            time_left: self.time_left,
        });
    }

    /// Rewinds the active step to its full duration and pauses.
    ///
    /// Any scheduled transition is invalidated and a pending cue is dropped.
    pub fn reset_current(&mut self) {
        let Some(step) = self.queue.get(self.active_index) else {
            return;
        };

        self.time_left = step.duration;
        self.progress = 0.0;
        self.accumulated_ms = 0;
        self.anchor = None;
        self.status = TimerStatus::Paused;
        self.pending_cue = None;
        self.transition_epoch += 1;

        self.emit(TimerEvent::Reset {
            index: self.active_index,
        });
    }

    /// Jumps to the next step, wrapping around when looping.
    ///
    /// Past the last step of a non-looping queue the run completes.
    pub fn skip_next(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let keep_running = self.is_progressing();
        self.transition_epoch += 1;

        let next = self.active_index + 1;
        if next < self.queue.len() {
            self.enter_step(next, keep_running);
            self.emit(TimerEvent::Advanced { index: next });
        } else if self.is_looping {
            self.enter_step(0, keep_running);
            self.emit(TimerEvent::Looped);
        } else {
            self.finish_run();
        }
    }

    /// Jumps back one step. No-op on the first step.
    pub fn skip_previous(&mut self) {
        if self.queue.is_empty() || self.active_index == 0 {
            return;
        }
        let keep_running = self.is_progressing();
        self.transition_epoch += 1;

        let previous = self.active_index - 1;
        self.enter_step(previous, keep_running);
        self.emit(TimerEvent::Advanced { index: previous });
    }

    /// Changes a not-yet-elapsed step's duration by whole minutes.
    ///
    /// The result never drops below one minute. Steps before the active one
    /// (and the active one once it has finished) are left untouched.
    pub fn adjust_timer_duration(&mut self, index: usize, delta_minutes: i32) {
        if delta_minutes == 0 || index >= self.queue.len() || index < self.active_index {
            return;
        }
        let is_active = index == self.active_index;
        if is_active
            && matches!(
                self.status,
                TimerStatus::Transitioning | TimerStatus::Completed
            )
        {
            return;
        }

        let step = &mut self.queue[index];
        let adjusted = (i64::from(step.duration) + i64::from(delta_minutes) * 60)
            .clamp(MIN_ADJUSTED_SECONDS, i64::from(u32::MAX));
        step.duration = adjusted as u32;
        let duration = step.duration;

        if is_active {
            let elapsed = self.elapsed_ms();
            self.refresh_countdown(elapsed);
        }

        self.emit(TimerEvent::DurationAdjusted { index, duration });
    }

    /// Enables or disables looping.
    pub fn set_is_looping(&mut self, looping: bool) {
        self.is_looping = looping;
    }

    /// Drops the queue and returns to the initial idle state.
    pub fn clear_all(&mut self) {
        self.queue.clear();
        self.active_index = 0;
        self.status = TimerStatus::Idle;
        self.accumulated_ms = 0;
        self.anchor = None;
        self.time_left = 0;
        self.progress = 0.0;
        self.pending_cue = None;
        self.transition_epoch += 1;

        self.emit(TimerEvent::Cleared);
    }

    // ------------------------------------------------------------------------
    // Time progression
    // ------------------------------------------------------------------------

    /// Recomputes the countdown from the wall clock.
    ///
    /// Does nothing unless the timer is running. When the active step runs
    /// out it is reported to the completion sink, the cue is selected and
    /// the advance is scheduled.
    pub fn update_time(&mut self) {
        if self.status != TimerStatus::Running {
            return;
        }
        let Some(anchor) = self.anchor else {
            return;
        };
        if self.queue.get(self.active_index).is_none() {
            return;
        }

        let now = self.clock.now();
        let previous_left = self.time_left;
        self.refresh_countdown(self.accumulated_ms + millis_between(anchor, now));

        if self.time_left != previous_left {
            self.emit(TimerEvent::Tick {
                index: self.active_index,
                time_left: self.time_left,
            });
        }

        if self.time_left == 0 {
            self.complete_step(anchor, now);
        }
    }

    /// Applies a fired transition if it still matches the live state.
    ///
    /// Returns false for stale tickets, which are ignored.
    pub fn complete_transition(&mut self, ticket: TransitionTicket) -> bool {
        if self.status != TimerStatus::Transitioning
            || ticket.index != self.active_index
            || ticket.epoch != self.transition_epoch
        {
            tracing::debug!(
                ticket_index = ticket.index,
                ticket_epoch = ticket.epoch,
                active_index = self.active_index,
                epoch = self.transition_epoch,
                "Ignoring stale transition"
            );
            return false;
        }

        let next = self.active_index + 1;
        if next < self.queue.len() {
            self.enter_step(next, true);
            self.emit(TimerEvent::Advanced { index: next });
        } else if self.is_looping && !self.queue.is_empty() {
            tracing::info!("Looping back to the first step");
            self.enter_step(0, true);
            self.emit(TimerEvent::Looped);
        } else {
            self.finish_run();
        }
        true
    }

    fn complete_step(&mut self, anchor: DateTime<Utc>, now: DateTime<Utc>) {
        let step = self.queue[self.active_index].clone();
        let has_more = self.active_index + 1 < self.queue.len() || self.is_looping;
        let cue = if has_more {
            CompletionCue::Continue
        } else {
            CompletionCue::Final
        };

        // The step ran out at anchor + remaining, which may precede `now`
        // when ticks were delayed.
        let remaining = (step.duration_ms() - self.accumulated_ms).max(0);
        let completed_at = (anchor + chrono::Duration::milliseconds(remaining)).min(now);

        self.accumulated_ms = step.duration_ms();
        self.anchor = None;
        self.status = TimerStatus::Transitioning;
        self.pending_cue = Some(cue);
        self.transition_epoch += 1;

        tracing::info!(index = self.active_index, label = %step.label, ?cue, "Step completed");
        self.completions.step_completed(&step, completed_at);
        self.emit(TimerEvent::StepCompleted {
            index: self.active_index,
            label: step.label,
            cue,
        });

        self.scheduler.schedule(
            self.transition_delay,
            TransitionTicket {
                index: self.active_index,
                epoch: self.transition_epoch,
            },
        );
    }

    fn enter_step(&mut self, index: usize, run: bool) {
        self.active_index = index;
        self.time_left = self.queue[index].duration;
        self.progress = 0.0;
        self.accumulated_ms = 0;

        if run {
            self.status = TimerStatus::Running;
            self.anchor = Some(self.clock.now());
        } else {
            self.anchor = None;
            if self.status != TimerStatus::Idle {
                self.status = TimerStatus::Paused;
            }
        }
    }

    fn finish_run(&mut self) {
        self.status = TimerStatus::Completed;
        self.progress = 100.0;
        self.time_left = 0;
        self.accumulated_ms = 0;
        self.anchor = None;

        tracing::info!("Run completed");
        self.emit(TimerEvent::RunCompleted);
    }

    fn refresh_countdown(&mut self, elapsed_ms: i64) {
        let duration = i64::from(self.current_duration());
        if duration == 0 {
            self.time_left = 0;
            self.progress = 0.0;
            return;
        }
        let elapsed_seconds = elapsed_ms.max(0) / 1000;
        self.time_left = (duration - elapsed_seconds).max(0) as u32;
        self.progress = (elapsed_seconds as f64 / duration as f64 * 100.0).min(100.0);
    }

    fn is_progressing(&self) -> bool {
        matches!(
            self.status,
            TimerStatus::Running | TimerStatus::Transitioning
        )
    }

    fn current_duration(&self) -> u32 {
        self.queue.get(self.active_index).map_or(0, |s| s.duration)
    }

    fn current_duration_ms(&self) -> i64 {
        i64::from(self.current_duration()) * 1000
    }

    fn emit(&self, event: TimerEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.send(event).is_err() {
                tracing::debug!("Timer event receiver dropped");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Returns the current status.
    pub fn status(&self) -> TimerStatus {
        self.status
    }

    /// Returns the active step index.
    pub fn active_index(&self) -> usize {
        self.active_index
    }

    /// Returns the seconds left in the active step as of the last update.
    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    /// Returns the active step's progress in percent as of the last update.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Returns whether looping is enabled.
    pub fn is_looping(&self) -> bool {
        self.is_looping
    }

    /// Returns true while waiting for a scheduled advance.
    pub fn is_transitioning(&self) -> bool {
        self.status == TimerStatus::Transitioning
    }

    /// Returns the queue.
    pub fn queue(&self) -> &[TimerStep] {
        &self.queue
    }

    /// Returns the active step.
    pub fn current_step(&self) -> Option<&TimerStep> {
        self.queue.get(self.active_index)
    }

    /// Returns the start of the current running interval.
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        self.anchor
    }

    /// Returns the elapsed milliseconds of the active step right now,
    /// clamped to its duration.
    pub fn elapsed_ms(&self) -> i64 {
        let running = self
            .anchor
            .map_or(0, |anchor| millis_between(anchor, self.clock.now()));
        (self.accumulated_ms + running).min(self.current_duration_ms())
    }

    /// Returns the cue selected by the last completion without consuming it.
    pub fn pending_cue(&self) -> Option<CompletionCue> {
        self.pending_cue
    }

    /// Consumes the cue selected by the last completion.
    pub fn take_cue(&mut self) -> Option<CompletionCue> {
        self.pending_cue.take()
    }

    /// Returns a display snapshot.
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            status: self.status,
            active_index: self.active_index,
            queue_len: self.queue.len(),
            time_left: self.time_left,
            progress: self.progress,
            is_looping: self.is_looping,
            current_step: self.current_step().cloned(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
