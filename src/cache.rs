//! Resolved-selector cache with trust-gated persistence.
//!
//! A cache maps step indexes to the selector/strategy that located each
//! element in a previous run. Caches are keyed by
//! `(recording_id, locale, template_hash)`: editing the recording changes
//! the hash, so old entries surface as misses, never as corruption. The
//! executor persists a cache at run end only when every attempted step
//! succeeded; a run with failures never overwrites a previously good cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::backend::ProbeStrategy;
use crate::config;

/// How many hash characters go into a cache filename
const FILENAME_HASH_LEN: usize = 16;

/// One cached resolution for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Index of the step this entry belongs to
    pub step_index: usize,

    /// Digest of the original selector bundle the resolution was made for
    pub selector_digest: String,

    /// The selector string that located the element
    pub resolved_selector: String,

    /// The probe strategy that located the element
    pub strategy: ProbeStrategy,

    /// When the resolution was recorded
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(
        step_index: usize,
        selector_digest: impl Into<String>,
        resolved_selector: impl Into<String>,
        strategy: ProbeStrategy,
    ) -> Self {
        Self {
            step_index,
            selector_digest: selector_digest.into(),
            resolved_selector: resolved_selector.into(),
            strategy,
            timestamp: Utc::now(),
        }
    }
}

/// A per-(recording, locale, template) selector cache.
///
/// Owned exclusively by the step executor for the duration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorCache {
    /// Recording this cache belongs to
    pub recording_id: String,

    /// Locale the recording was played in
    pub locale: String,

    /// Template hash of the recording at resolution time
    pub template_hash: String,

    /// Entries, at most one per step index
    pub entries: Vec<CacheEntry>,
}

impl SelectorCache {
    /// Create an empty cache for the given key tuple
    pub fn new(
        recording_id: impl Into<String>,
        locale: impl Into<String>,
        template_hash: impl Into<String>,
    ) -> Self {
        Self {
            recording_id: recording_id.into(),
            locale: locale.into(),
            template_hash: template_hash.into(),
            entries: Vec::new(),
        }
    }

    /// Look up the entry for a step index
    pub fn entry(&self, step_index: usize) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| e.step_index == step_index)
    }

    /// Append an entry, replacing any existing entry for the same step
    pub fn add_entry(&mut self, entry: CacheEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.step_index == entry.step_index)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// Number of cached resolutions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no resolutions are cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Error types for cache operations
#[derive(Debug)]
pub enum CacheError {
    /// I/O error
    Io(std::io::Error),

    /// Serialization error
    Serialization(serde_json::Error),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "I/O error: {}", err),
            CacheError::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err),
            CacheError::Serialization(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err)
    }
}

/// Trait for selector cache storage.
///
/// The storage medium is opaque to the playback engine; `load` returns
/// `Ok(None)` for a missing or unusable cache.
pub trait CacheStore {
    /// Load the cache for a key tuple, if one exists
    fn load(
        &self,
        recording_id: &str,
        locale: &str,
        template_hash: &str,
    ) -> CacheResult<Option<SelectorCache>>;

    /// Persist a cache
    fn save(&self, cache: &SelectorCache) -> CacheResult<()>;
}

/// File-backed cache store: one pretty-printed JSON file per key tuple
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Create a store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create a store rooted at the configured cache directory
    pub fn from_env() -> Self {
        Self::new(config::cache_dir())
    }

    /// The root directory of this store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache file for a key tuple
    pub fn file_path(&self, recording_id: &str, locale: &str, template_hash: &str) -> PathBuf {
        let hash_prefix = &template_hash[..FILENAME_HASH_LEN.min(template_hash.len())];
        let filename = format!(
            "{}_{}_{}.json",
            sanitize_component(recording_id),
            sanitize_component(locale),
            hash_prefix
        );
        self.dir.join(filename)
    }

    /// Remove every cache file for a `(recording, locale)` pair, across all
    /// template hashes. Returns the number of files removed.
    pub fn clear(&self, recording_id: &str, locale: &str) -> CacheResult<usize> {
        let prefix = format!(
            "{}_{}_",
            sanitize_component(recording_id),
            sanitize_component(locale)
        );
        let mut removed = 0;
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with(&prefix) && name.ends_with(".json") {
                    fs::remove_file(entry.path())?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

impl CacheStore for FileCacheStore {
    fn load(
        &self,
        recording_id: &str,
        locale: &str,
        template_hash: &str,
    ) -> CacheResult<Option<SelectorCache>> {
        let path = self.file_path(recording_id, locale, template_hash);
        if !path.exists() {
            debug!(path = %path.display(), "no selector cache on disk");
            return Ok(None);
        }

        let data = fs::read_to_string(&path)?;
        match serde_json::from_str::<SelectorCache>(&data) {
            Ok(cache) if cache.template_hash == template_hash => Ok(Some(cache)),
            Ok(cache) => {
                // Filename prefix collided with a different full hash
                debug!(
                    stored = %cache.template_hash,
                    requested = %template_hash,
                    "cache template hash mismatch, treating as miss"
                );
                Ok(None)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable selector cache, treating as miss");
                Ok(None)
            }
        }
    }

    fn save(&self, cache: &SelectorCache) -> CacheResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_path(&cache.recording_id, &cache.locale, &cache.template_hash);
        fs::write(&path, serde_json::to_string_pretty(cache)?)?;
        debug!(path = %path.display(), entries = cache.len(), "selector cache saved");
        Ok(())
    }
}

/// Sanitize a key component for use in filenames
fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
