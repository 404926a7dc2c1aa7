//! Display utilities for the Yoga Timer CLI.
//!
//! This module provides formatted output for:
//! - The live countdown line
//! - Step and run completion messages
//! - Presets, history and pending queue listings
//! - Sync results and errors

use std::io::Write;

use crate::history::CompletedTimer;
use crate::presets::Preset;
use crate::tracking::{PendingTrackingEntry, SkipReason, SyncOutcome};
use crate::types::{format_time, CompletionCue, TimerSnapshot, TimerStatus};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Redraws the countdown line in place.
    pub fn show_countdown(snapshot: &TimerSnapshot) {
        print!("\r{}\x1b[K", Self::countdown_line(snapshot));
        let _ = std::io::stdout().flush();
    }

    /// Shows that a step finished.
    pub fn show_step_completed(label: &str, cue: CompletionCue) {
        println!();
        match cue {
            CompletionCue::Continue => println!("* {} complete", label),
            CompletionCue::Final => println!("* {} complete, last step", label),
        }
    }

    /// Shows that the loop wrapped around.
    pub fn show_looped() {
        println!("> Starting over from the first step");
    }

    /// Shows that the whole run finished.
    pub fn show_run_completed() {
        println!("[] Practice complete");
    }

    /// Shows the built-in presets.
    pub fn show_presets(presets: &[Preset]) {
        println!("Presets");
        println!("─────────────────────────────");
        for preset in presets {
            println!("{}", Self::preset_line(preset));
            for step in &preset.steps {
                println!("    {} {}", format_time(step.duration), step.label);
            }
        }
    }

    /// Shows recent completions, newest first.
    pub fn show_history(completed: &[CompletedTimer]) {
        if completed.is_empty() {
            println!("No completed steps yet");
            return;
        }
        println!("History");
        println!("─────────────────────────────");
        for timer in completed {
            println!("{}", Self::history_line(timer));
        }
    }

    /// Shows tracking entries waiting to be synced.
    pub fn show_pending(entries: &[PendingTrackingEntry], max_attempts: u32) {
        if entries.is_empty() {
            println!("No pending tracking entries");
            return;
        }
        println!("Pending tracking entries: {}", entries.len());
        println!("─────────────────────────────");
        for entry in entries {
            println!("{}", Self::pending_line(entry, max_attempts));
        }
    }

    /// Shows the pending queue was emptied.
    pub fn show_pending_cleared() {
        println!("* Pending queue cleared");
    }

    /// Shows the result of a sync.
    pub fn show_sync_outcome(outcome: &SyncOutcome) {
        println!("{}", Self::sync_message(outcome));
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("error: {}", message);
    }

    fn countdown_line(snapshot: &TimerSnapshot) -> String {
        let label = snapshot
            .current_step
            .as_ref()
            .map(|s| s.label.as_str())
            .unwrap_or("-");
        let state = match snapshot.status {
            TimerStatus::Running => "",
            TimerStatus::Paused => " (paused)",
            TimerStatus::Transitioning => " (next step coming up)",
            TimerStatus::Idle | TimerStatus::Completed => "",
        };
        format!(
            "[{}/{}] {} {} {:>3.0}%{}",
            snapshot.active_index + 1,
            snapshot.queue_len,
            label,
            format_time(snapshot.time_left),
            snapshot.progress,
            state
        )
    }

    fn preset_line(preset: &Preset) -> String {
        let total = u32::try_from(preset.total_duration()).unwrap_or(u32::MAX);
        format!(
            "{}  {} ({} steps, {})",
            preset.id,
            preset.name,
            preset.steps.len(),
            format_time(total)
        )
    }

    fn history_line(timer: &CompletedTimer) -> String {
        format!(
            "{}  {} {}",
            timer.completed_at.format("%Y-%m-%d %H:%M"),
            timer.step.label,
            format_time(timer.step.duration)
        )
    }

    fn pending_line(entry: &PendingTrackingEntry, max_attempts: u32) -> String {
        format!(
            "{}  {} {} (attempts {}/{})",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.task_label,
            format_time(entry.duration_seconds),
            entry.sync_attempts,
            max_attempts
        )
    }

    fn sync_message(outcome: &SyncOutcome) -> String {
        match outcome {
            SyncOutcome::Drained(report) if report.total() == 0 => {
                "Nothing to sync".to_string()
            }
            SyncOutcome::Drained(report) => format!(
                "Synced {}, still pending {}, dropped {}",
                report.synced, report.failed, report.dropped
            ),
            SyncOutcome::Skipped(reason) => format!("Sync skipped: {}", Self::skip_reason(*reason)),
            SyncOutcome::Synced => "Synced".to_string(),
            SyncOutcome::Queued => "Queued for later".to_string(),
            SyncOutcome::Lost => "Entry could not be saved".to_string(),
        }
    }

    fn skip_reason(reason: SkipReason) -> &'static str {
        match reason {
            SkipReason::NoOwner => "no tracking owner configured",
            SkipReason::NotConfigured => "project name, API key or workspace id missing",
            SkipReason::Offline => "offline",
            SkipReason::Debounced => "synced moments ago",
            SkipReason::Busy => "another sync is running",
            SkipReason::NoChange => "nothing changed",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
