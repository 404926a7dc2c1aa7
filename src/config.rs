//! Application configuration.
//!
//! Settings are stored as JSON at `<data_dir>/config.json`. Every field has
//! a default, so a missing file or a partial file both load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tracking::TrackingConfig;

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Name of the data directory under the user's home.
const DATA_DIR_NAME: &str = ".yoga-timer";

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_transition_delay_ms() -> u64 {
    3000
}

fn default_base_url() -> String {
    crate::tracking::clockify::CLOCKIFY_BASE_URL.to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_config_debounce_secs() -> u64 {
    5
}

fn default_session_gap_minutes() -> i64 {
    crate::history::DEFAULT_SESSION_GAP_MINUTES
}

// ============================================================================
// TimerSettings
// ============================================================================

/// Timing knobs of the timer engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    /// Tick period of the engine loop
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Pause between a completed step and the next one
    #[serde(default = "default_transition_delay_ms")]
    pub transition_delay_ms: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            transition_delay_ms: default_transition_delay_ms(),
        }
    }
}

impl TimerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn transition_delay(&self) -> Duration {
        Duration::from_millis(self.transition_delay_ms)
    }
}

// ============================================================================
// TrackingSettings
// ============================================================================

/// Clockify credentials and the account completions are tracked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSettings {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    /// Account owning tracked entries; nothing is tracked without one
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            project_name: None,
            api_key: None,
            workspace_id: None,
            owner_id: None,
            base_url: default_base_url(),
        }
    }
}

impl TrackingSettings {
    /// Returns the three-field tracking configuration.
    pub fn tracking_config(&self) -> TrackingConfig {
        TrackingConfig {
            project_name: self.project_name.clone().unwrap_or_default(),
            api_key: self.api_key.clone().unwrap_or_default(),
            workspace_id: self.workspace_id.clone().unwrap_or_default(),
        }
    }
}

// ============================================================================
// SyncSettings
// ============================================================================

/// Retry behavior of the tracking sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Failed deliveries after which a pending entry is dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Minimum spacing of config-triggered drains
    #[serde(default = "default_config_debounce_secs")]
    pub config_debounce_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            config_debounce_secs: default_config_debounce_secs(),
        }
    }
}

// ============================================================================
// HistorySettings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySettings {
    /// Idle minutes after which the next completion opens a new session
    #[serde(default = "default_session_gap_minutes")]
    pub session_gap_minutes: i64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            session_gap_minutes: default_session_gap_minutes(),
        }
    }
}

impl HistorySettings {
    pub fn session_gap(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_gap_minutes)
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub timer: TimerSettings,
    #[serde(default)]
    pub tracking: TrackingSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub history: HistorySettings,
}

impl AppConfig {
    /// Loads the configuration from `dir`, falling back to defaults when
    /// the file does not exist.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Writes the configuration to `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;
        let path = dir.join(CONFIG_FILE_NAME);
        let raw = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, raw)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.timer.tick_interval_ms == 0 {
            return Err("timer.tick_interval_ms must be greater than 0".to_string());
        }
        if self.sync.max_attempts == 0 {
            return Err("sync.max_attempts must be greater than 0".to_string());
        }
        if self.history.session_gap_minutes < 0 {
            return Err("history.session_gap_minutes must not be negative".to_string());
        }
        Ok(())
    }
}

/// Returns the default data directory (`~/.yoga-timer`).
pub fn default_data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(DATA_DIR_NAME))
}
