//! Progress side channel for running transforms.
//!
//! The engine only sees the [`ProgressStore`] trait; whoever owns the job
//! decides where progress lives. [`MemoryProgressStore`] keeps entries in a
//! moka cache with a per-entry time-to-live, so a stalled job's last report
//! disappears instead of lingering forever.

use std::path::Path;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;
use thiserror::Error;

use crate::services::csv::types::ProgressRecord;

pub const PROGRESS_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
#[error("Progress store unavailable: {0}")]
pub struct ProgressError(pub String);

/// Narrow key-value interface the engine reports progress through.
pub trait ProgressStore: Send + Sync {
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), ProgressError>;

    fn get(&self, key: &str) -> Option<String>;
}

pub fn progress_key(path: &Path) -> String {
    format!("progress:{}", path.display())
}

/// Last reported progress for the job reading `path`. `None` means unknown.
pub fn read_progress(store: &dyn ProgressStore, path: &Path) -> Option<ProgressRecord> {
    let raw = store.get(&progress_key(path))?;
    match serde_json::from_str(&raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable progress record");
            None
        }
    }
}

pub fn write_progress(store: &dyn ProgressStore, path: &Path, rows_processed: usize, ttl: Duration) {
    let record = ProgressRecord { rows_processed };
    let value = match serde_json::to_string(&record) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode progress record");
            return;
        }
    };
    if let Err(e) = store.set(&progress_key(path), value, ttl) {
        tracing::warn!(error = %e, rows_processed, "Failed to write progress");
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct MemoryProgressStore {
    entries: Cache<String, Entry>,
}

impl MemoryProgressStore {
    pub fn new(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();
        Self { entries }
    }
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl ProgressStore for MemoryProgressStore {
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), ProgressError> {
        self.entries.insert(key.to_string(), Entry { value, ttl });
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value)
    }
}
