//! Pending tracking queue.
//!
//! Completions that could not be delivered are kept here until a drain
//! pass succeeds or they run out of attempts. The queue lives in a
//! [`PersistentStore`] under a single key and every operation is a
//! read-modify-write of that value, so it survives restarts and picks up
//! entries written by other instances (last writer wins).

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{load_json, save_json, PersistentStore, StorageError};

/// Storage key of the pending queue.
pub const PENDING_QUEUE_KEY: &str = "clockify_pending_queue";

/// Storage key a corrupt queue value is moved to before starting fresh.
const CORRUPT_QUEUE_KEY: &str = "clockify_pending_queue.corrupt";

/// Failed deliveries after which an entry is dropped.
pub const DEFAULT_MAX_SYNC_ATTEMPTS: u32 = 3;

// ============================================================================
// PendingTrackingEntry
// ============================================================================

/// A completion waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTrackingEntry {
    /// Entry id
    pub id: String,
    /// Task name reported to the tracking service
    #[serde(rename = "taskName")]
    pub task_label: String,
    /// Tracked duration in seconds
    #[serde(rename = "duration")]
    pub duration_seconds: u32,
    /// When the entry was queued
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Account the entry belongs to
    #[serde(rename = "userId")]
    pub owner_id: String,
    /// Failed delivery attempts so far
    #[serde(rename = "syncAttempts")]
    pub sync_attempts: u32,
}

impl PendingTrackingEntry {
    /// Creates a fresh entry with a random id.
    pub fn new(
        task_label: impl Into<String>,
        duration_seconds: u32,
        owner_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_label: task_label.into(),
            duration_seconds,
            created_at,
            owner_id: owner_id.into(),
            sync_attempts: 0,
        }
    }
}

/// On-disk shape; older records lack `syncAttempts`.
#[derive(Deserialize)]
struct StoredEntry {
    id: String,
    #[serde(rename = "taskName")]
    task_label: String,
    #[serde(rename = "duration")]
    duration_seconds: u32,
    #[serde(rename = "timestamp")]
    created_at: DateTime<Utc>,
    #[serde(rename = "userId")]
    owner_id: String,
    #[serde(rename = "syncAttempts", default)]
    sync_attempts: Option<u32>,
}

impl From<StoredEntry> for PendingTrackingEntry {
    fn from(stored: StoredEntry) -> Self {
        Self {
            id: stored.id,
            task_label: stored.task_label,
            duration_seconds: stored.duration_seconds,
            created_at: stored.created_at,
            owner_id: stored.owner_id,
            sync_attempts: stored.sync_attempts.unwrap_or(0),
        }
    }
}

// ============================================================================
// PendingQueue
// ============================================================================

/// Durable queue of undelivered tracking entries.
pub struct PendingQueue {
    store: Arc<dyn PersistentStore>,
    max_attempts: u32,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl PendingQueue {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self::with_max_attempts(store, DEFAULT_MAX_SYNC_ATTEMPTS)
    }

    pub fn with_max_attempts(store: Arc<dyn PersistentStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            lock: Mutex::new(()),
        }
    }

    /// Returns the attempt limit.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns every queued entry in insertion order.
    pub fn entries(&self) -> Result<Vec<PendingTrackingEntry>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read()
    }

    /// Appends an entry.
    pub fn append(&self, entry: PendingTrackingEntry) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read()?;
        tracing::info!(task = %entry.task_label, id = %entry.id, "Added to pending queue");
        entries.push(entry);
        self.write(&entries)
    }

    /// Removes the entry with `id`. Returns false if it was not queued.
    pub fn remove(&self, id: &str) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.write(&entries)?;
        tracing::debug!(id, "Removed from pending queue");
        Ok(true)
    }

    /// Returns the entries owned by `owner_id`, in insertion order.
    pub fn list_for_owner(&self, owner_id: &str) -> Result<Vec<PendingTrackingEntry>, StorageError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.owner_id == owner_id)
            .collect())
    }

    /// Records a failed attempt for `id`.
    ///
    /// Returns true once the entry has reached the attempt limit. Unknown
    /// ids return false.
    pub fn increment_attempts(&self, id: &str) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read()?;
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };

        entry.sync_attempts += 1;
        let attempts = entry.sync_attempts;
        tracing::debug!(
            task = %entry.task_label,
            attempts,
            max = self.max_attempts,
            "Sync attempt failed"
        );
        let reached = attempts >= self.max_attempts;

        self.write(&entries)?;
        Ok(reached)
    }

    /// Returns the number of queued entries across all owners.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.entries()?.len())
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Drops every queued entry.
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.store.remove(PENDING_QUEUE_KEY)?;
        tracing::info!("Cleared pending queue");
        Ok(())
    }

    fn read(&self) -> Result<Vec<PendingTrackingEntry>, StorageError> {
        let stored = match load_json::<Vec<StoredEntry>>(self.store.as_ref(), PENDING_QUEUE_KEY) {
            Ok(stored) => stored.unwrap_or_default(),
            Err(StorageError::Serialization { source, .. }) => {
                // keep the unreadable value around instead of overwriting it
                tracing::error!("Pending queue is unreadable, setting it aside: {}", source);
                if let Some(raw) = self.store.get(PENDING_QUEUE_KEY)? {
                    self.store.set(CORRUPT_QUEUE_KEY, &raw)?;
                }
                self.store.remove(PENDING_QUEUE_KEY)?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let needs_migration = stored.iter().any(|e| e.sync_attempts.is_none());
        let entries: Vec<PendingTrackingEntry> = stored.into_iter().map(Into::into).collect();
        if needs_migration {
            tracing::debug!("Migrating pending entries without attempt counters");
            self.write(&entries)?;
        }
        Ok(entries)
    }

    fn write(&self, entries: &[PendingTrackingEntry]) -> Result<(), StorageError> {
        save_json(self.store.as_ref(), PENDING_QUEUE_KEY, entries)
    }
}

// ============================================================================
// Tests
// ============================================================================
