//! Core data types for the yoga timer.
//!
//! This module defines the data structures used for:
//! - Practice steps and their kinds
//! - Run status of the timer state machine
//! - Completion cues (gongs) and UI-facing snapshots

use serde::{Deserialize, Serialize};

// ============================================================================
// StepKind
// ============================================================================

/// Kind of a practice step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Plain timed practice segment
    Timer,
    /// Rest between practice segments
    Break,
    /// Segment accompanied by a video
    Video,
}

impl StepKind {
    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Timer => "timer",
            StepKind::Break => "break",
            StepKind::Video => "video",
        }
    }
}

impl Default for StepKind {
    fn default() -> Self {
        StepKind::Timer
    }
}

// ============================================================================
// TimerStep
// ============================================================================

/// One timed segment of a practice session.
///
/// Identity is `id`. Durations are whole seconds and never zero; the
/// constructors clamp anything lower to one second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStep {
    /// Opaque step identifier
    pub id: String,
    /// Duration in seconds (>= 1)
    pub duration: u32,
    /// Human-readable label, also used as the tracked task name
    pub label: String,
    /// Step kind
    #[serde(rename = "type", default)]
    pub kind: StepKind,
    /// Video URL for `video` steps
    #[serde(rename = "videoUrl", default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl TimerStep {
    /// Creates a timer step, clamping the duration to at least one second.
    pub fn new(id: impl Into<String>, label: impl Into<String>, duration: u32) -> Self {
        Self {
            id: id.into(),
            duration: duration.max(1),
            label: label.into(),
            kind: StepKind::Timer,
            video_url: None,
        }
    }

    /// Creates a step with a fresh random id.
    pub fn with_random_id(label: impl Into<String>, duration: u32) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), label, duration)
    }

    /// Sets the step kind.
    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attaches a video URL and marks the step as a video step.
    pub fn with_video(mut self, url: impl Into<String>) -> Self {
        self.kind = StepKind::Video;
        self.video_url = Some(url.into());
        self
    }

    /// Returns the step duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        i64::from(self.duration) * 1000
    }

    /// Returns a copy with the duration clamped to the valid range.
    pub(crate) fn sanitized(mut self) -> Self {
        self.duration = self.duration.max(1);
        self
    }
}

// ============================================================================
// TimerStatus
// ============================================================================

/// Run status of the timer state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    /// Queue loaded (or empty), nothing started yet
    Idle,
    /// Active step is counting down
    Running,
    /// Active step is paused
    Paused,
    /// Step finished, waiting for the cue to play before advancing
    Transitioning,
    /// Last step of a non-looping run finished
    Completed,
}

impl TimerStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Idle => "idle",
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
            TimerStatus::Transitioning => "transitioning",
            TimerStatus::Completed => "completed",
        }
    }

    /// Returns true for states that stay put until a command arrives.
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            TimerStatus::Idle | TimerStatus::Paused | TimerStatus::Completed
        )
    }
}

impl Default for TimerStatus {
    fn default() -> Self {
        TimerStatus::Idle
    }
}

// ============================================================================
// CompletionCue
// ============================================================================

/// Audio cue selected when a step completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionCue {
    /// More steps follow (or the run loops)
    Continue,
    /// Terminal step of a non-looping run
    Final,
}

// ============================================================================
// TimerSnapshot
// ============================================================================

/// Read-only view of the timer for display purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// Current status
    pub status: TimerStatus,
    /// Index of the active step
    #[serde(rename = "activeIndex")]
    pub active_index: usize,
    /// Number of steps in the queue
    #[serde(rename = "queueLength")]
    pub queue_len: usize,
    /// Seconds left in the active step
    #[serde(rename = "timeLeft")]
    pub time_left: u32,
    /// Progress of the active step in percent (0-100)
    pub progress: f64,
    /// Whether the run wraps around at the end of the queue
    #[serde(rename = "isLooping")]
    pub is_looping: bool,
    /// The active step, if the queue is non-empty
    #[serde(rename = "currentStep", skip_serializing_if = "Option::is_none")]
    pub current_step: Option<TimerStep>,
}

// ============================================================================
// Formatting
// ============================================================================

/// Formats seconds as `MM:SS`, or `HH:MM:SS` once an hour is reached.
pub fn format_time(total_seconds: u32) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // TimerStep Tests
    // ------------------------------------------------------------------------

    mod timer_step_tests {
        use super::*;

        #[test]
        fn test_new_clamps_zero_duration() {
            let step = TimerStep::new("a", "Kirtan", 0);
            assert_eq!(step.duration, 1);
            assert_eq!(step.kind, StepKind::Timer);
        }

        #[test]
        fn test_with_video_sets_kind() {
            let step = TimerStep::new("v", "Asanas", 600).with_video("https://youtu.be/x");
            assert_eq!(step.kind, StepKind::Video);
            assert_eq!(step.video_url.as_deref(), Some("https://youtu.be/x"));
        }

        #[test]
        fn test_duration_ms() {
            assert_eq!(TimerStep::new("a", "A", 90).duration_ms(), 90_000);
        }

        #[test]
        fn test_deserialize_with_type_field() {
            let json = r#"{"id":"1-1","type":"break","label":"Rest","duration":60}"#;
            let step: TimerStep = serde_json::from_str(json).unwrap();
            assert_eq!(step.kind, StepKind::Break);
            assert_eq!(step.duration, 60);
            assert!(step.video_url.is_none());
        }

        #[test]
        fn test_sanitized_fixes_deserialized_zero() {
            let json = r#"{"id":"x","label":"Bad","duration":0}"#;
            let step: TimerStep = serde_json::from_str(json).unwrap();
            assert_eq!(step.sanitized().duration, 1);
        }
    }

    // ------------------------------------------------------------------------
    // TimerStatus Tests
    // ------------------------------------------------------------------------

    mod timer_status_tests {
        use super::*;

        #[test]
        fn test_default_is_idle() {
            assert_eq!(TimerStatus::default(), TimerStatus::Idle);
        }

        #[test]
        fn test_as_str() {
            assert_eq!(TimerStatus::Idle.as_str(), "idle");
            assert_eq!(TimerStatus::Running.as_str(), "running");
            assert_eq!(TimerStatus::Paused.as_str(), "paused");
            assert_eq!(TimerStatus::Transitioning.as_str(), "transitioning");
            assert_eq!(TimerStatus::Completed.as_str(), "completed");
        }

        #[test]
        fn test_is_stable() {
            assert!(TimerStatus::Idle.is_stable());
            assert!(TimerStatus::Paused.is_stable());
            assert!(TimerStatus::Completed.is_stable());
            assert!(!TimerStatus::Running.is_stable());
            assert!(!TimerStatus::Transitioning.is_stable());
        }

        #[test]
        fn test_serialize() {
            let json = serde_json::to_string(&TimerStatus::Transitioning).unwrap();
            assert_eq!(json, "\"transitioning\"");
        }
    }

    // ------------------------------------------------------------------------
    // format_time Tests
    // ------------------------------------------------------------------------

    mod format_time_tests {
        use super::*;

        #[test]
        fn test_minutes_and_seconds() {
            assert_eq!(format_time(0), "00:00");
            assert_eq!(format_time(330), "05:30");
            assert_eq!(format_time(3599), "59:59");
        }

        #[test]
        fn test_hours() {
            assert_eq!(format_time(3600), "01:00:00");
            assert_eq!(format_time(4530), "01:15:30");
        }
    }
}
