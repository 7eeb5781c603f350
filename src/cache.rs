//! In-memory conversion cache.
//!
//! Entries map a request fingerprint to a file already sitting in the output
//! directory. Expiry is lazy: every insert sweeps entries older than the
//! retention window and deletes their files.

use std::{collections::HashMap, fs, path::PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::files::DownloadedFile;

pub const DEFAULT_RETENTION_SECS: i64 = 3600;

/// Stable cache key over the request fields.
pub fn fingerprint(url: &str, format: &str, quality: &str) -> String {
    blake3::hash(format!("{url}_{format}_{quality}").as_bytes())
        .to_hex()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub filename: String,
    pub path: PathBuf,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(fingerprint: String, file: DownloadedFile, title: String) -> Self {
        Self {
            fingerprint,
            filename: file.filename,
            path: file.path,
            title,
            created_at: Utc::now(),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>, retention: TimeDelta) -> bool {
        now.signed_duration_since(self.created_at) > retention
    }
}

pub struct ConversionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    retention: TimeDelta,
}

impl Default for ConversionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionCache {
    pub fn new() -> Self {
        Self::with_retention(TimeDelta::seconds(DEFAULT_RETENTION_SECS))
    }

    pub fn with_retention(retention: TimeDelta) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Returns the entry for `fingerprint` if its file still exists. Entries
    /// whose file has disappeared are dropped.
    pub fn lookup(&self, fingerprint: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        let entry = entries.get(fingerprint)?;
        if entry.path.is_file() {
            return Some(entry.clone());
        }
        debug!(fingerprint, path = %entry.path.display(), "cached file missing, dropping entry");
        entries.remove(fingerprint);
        None
    }

    /// Stores `entry`, replacing any previous entry for the same fingerprint,
    /// then evicts expired entries. Returns how many entries were evicted.
    pub fn insert(&self, entry: CacheEntry) -> usize {
        self.insert_at(entry, Utc::now())
    }

    pub fn insert_at(&self, entry: CacheEntry, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        entries.insert(entry.fingerprint.clone(), entry);
        sweep(&mut entries, now, self.retention)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn sweep(entries: &mut HashMap<String, CacheEntry>, now: DateTime<Utc>, retention: TimeDelta) -> usize {
    let expired: Vec<String> = entries
        .values()
        .filter(|entry| entry.is_expired(now, retention))
        .map(|entry| entry.fingerprint.clone())
        .collect();

    for key in &expired {
        if let Some(entry) = entries.remove(key)
            && let Err(err) = fs::remove_file(&entry.path)
        {
            // Deletion is best-effort; the entry is gone either way.
            debug!(path = %entry.path.display(), error = %err, "failed to delete expired file");
        }
    }
    expired.len()
}
