//! Command definitions for the Yoga Timer CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ============================================================================
// CLI Structure
// ============================================================================

/// Yoga Timer CLI - guided practice sequences in the terminal
#[derive(Parser, Debug)]
#[command(
    name = "yoga-timer",
    version,
    about = "Step-by-step yoga practice timer",
    long_about = "Plays a sequence of timed steps (kirtan, meditation, breaks) in the terminal.\n\
                  Completed steps are kept in a local history and can be tracked in Clockify.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding config, history and the pending queue
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Play a practice sequence
    Run(RunArgs),

    /// List the built-in presets
    Presets,

    /// Show recently completed steps
    History {
        /// Number of entries to show (1-500)
        #[arg(
            short,
            long,
            default_value = "10",
            value_parser = clap::value_parser!(u32).range(1..=500)
        )]
        limit: u32,
    },

    /// Show tracking entries waiting to be synced
    Pending {
        /// Discard all pending entries
        #[arg(long)]
        clear: bool,
    },

    /// Sync pending tracking entries now
    Sync,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Run Command Arguments
// ============================================================================

/// Arguments for the run command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Built-in preset to play
    #[arg(short, long, default_value = "default-1", value_parser = validate_preset_id)]
    pub preset: String,

    /// JSON file with a custom list of steps (overrides --preset)
    #[arg(short, long, value_name = "FILE", conflicts_with = "preset")]
    pub steps: Option<PathBuf>,

    /// Start over from the first step after the last one
    #[arg(short, long = "loop")]
    pub looping: bool,

    /// Treat the device as offline (completions go to the pending queue)
    #[arg(long)]
    pub offline: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            preset: "default-1".to_string(),
            steps: None,
            looping: false,
            offline: false,
        }
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validates the preset id.
///
/// - Must not be empty
/// - Must name a built-in preset
fn validate_preset_id(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("preset id cannot be empty".to_string());
    }
    if crate::presets::find_preset(s).is_none() {
        let known: Vec<String> = crate::presets::default_presets()
            .into_iter()
            .map(|p| p.id)
            .collect();
        return Err(format!("unknown preset (available: {})", known.join(", ")));
    }
    Ok(s.to_string())
}

// ============================================================================
// Tests
// ============================================================================
