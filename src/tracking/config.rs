//! Tracking configuration and its change feed.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The three settings needed to reach the tracking service.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Project completions are logged under
    pub project_name: String,
    /// Clockify API key
    pub api_key: String,
    /// Clockify workspace id
    pub workspace_id: String,
}

impl TrackingConfig {
    pub fn new(
        project_name: impl Into<String>,
        api_key: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            api_key: api_key.into(),
            workspace_id: workspace_id.into(),
        }
    }

    /// Returns true only when all three fields are non-blank.
    pub fn is_complete(&self) -> bool {
        [&self.project_name, &self.api_key, &self.workspace_id]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

// the API key never goes to logs
impl fmt::Debug for TrackingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingConfig")
            .field("project_name", &self.project_name)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("workspace_id", &self.workspace_id)
            .finish()
    }
}

// ============================================================================
// ConfigSource
// ============================================================================

/// Current tracking configuration plus change notifications.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    tx: watch::Sender<TrackingConfig>,
}

impl ConfigSource {
    pub fn new(initial: TrackingConfig) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Returns a copy of the current configuration.
    pub fn current(&self) -> TrackingConfig {
        self.tx.borrow().clone()
    }

    /// Replaces the configuration, notifying subscribers if it changed.
    pub fn set(&self, config: TrackingConfig) {
        self.tx.send_if_modified(|current| {
            if *current == config {
                false
            } else {
                *current = config;
                true
            }
        });
    }

    /// Subscribes to configuration changes.
    pub fn subscribe(&self) -> watch::Receiver<TrackingConfig> {
        self.tx.subscribe()
    }
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::new(TrackingConfig::default())
    }
}
