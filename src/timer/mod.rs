//! Timer state machine and the machinery that drives it.
//!
//! - `machine`: queue, countdown and status transitions
//! - `transition`: delayed auto-advance between steps
//! - `engine`: tokio tick loop around a shared machine

pub mod engine;
pub mod machine;
pub mod transition;

pub use engine::TimerEngine;
pub use machine::{TimerEvent, TimerMachine, DEFAULT_TRANSITION_DELAY};
pub use transition::{ManualScheduler, TokioScheduler, TransitionScheduler, TransitionTicket};
