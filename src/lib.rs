//! Yoga Timer Library
//!
//! This library provides the core functionality for the yoga practice timer.
//! It includes:
//! - Timer state machine with wall-clock countdown and auto-advance
//! - Completion sink forwarding finished steps to history and tracking
//! - Best-effort time tracking with a durable pending queue
//! - Key-value persistence, history sessions and built-in presets
//! - CLI command parsing and display utilities

pub mod cli;
pub mod clock;
pub mod completion;
pub mod config;
pub mod history;
pub mod presets;
pub mod storage;
pub mod timer;
pub mod tracking;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{format_time, CompletionCue, StepKind, TimerSnapshot, TimerStatus, TimerStep};

pub use clock::{Clock, ManualClock, SystemClock};

pub use completion::{CompletedStep, CompletionForwarder, CompletionSink, RecordingCompletionSink};

pub use config::AppConfig;

pub use history::{record_completions, CompletedTimer, HistorySink, HistoryStore, TimerSession};

pub use presets::{default_presets, find_preset, Preset};

pub use storage::{FileStore, MemoryStore, PersistentStore, StorageError};

pub use timer::{
    ManualScheduler, TimerEngine, TimerEvent, TimerMachine, TokioScheduler, TransitionScheduler,
    TransitionTicket,
};

// Re-export tracking types
pub use tracking::{
    ClockifySink, ConfigSource, Connectivity, DrainReport, MockTrackingSink, PendingQueue,
    PendingTrackingEntry, SkipReason, SyncOutcome, SyncStatus, TrackingConfig, TrackingError,
    TrackingSink, TrackingSync,
};
