//! Time-bounded result cache for accepted discovery results.
//!
//! Entries are keyed by a [`Fingerprint`] of the request and expire after a
//! per-kind TTL. With a cache directory configured, every entry is also
//! written to `<fingerprint>.json` so results survive restarts; a memory miss
//! falls back to disk. Unreadable files are treated as misses and removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::types::Topic;

/// What a cached result answers. Each kind has its own TTL and fingerprint space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Category,
    Topic,
    PaperQuality,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Category => "category",
            RequestKind::Topic => "topic",
            RequestKind::PaperQuality => "paper_quality",
        }
    }

    /// Built-in TTL in seconds.
    pub fn default_ttl_secs(&self) -> u64 {
        match self {
            RequestKind::Category => 12 * 60 * 60,
            RequestKind::Topic => 60 * 60,
            RequestKind::PaperQuality => 30 * 24 * 60 * 60,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex SHA-256 of `kind:normalized_text`.
///
/// Normalization lowercases and collapses whitespace, so " Nutrition " and
/// "nutrition" share a fingerprint while a category and a topic with the same
/// text do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(kind: RequestKind, text: &str) -> Self {
        let normalized = crate::fold_whitespace(&text.to_lowercase());
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(normalized.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false, every lookup misses and nothing is stored.
    pub enabled: bool,
    /// TTL in seconds per request kind. Missing kinds use built-in TTLs.
    pub ttl_seconds: BTreeMap<RequestKind, u64>,
    /// Maximum in-memory entries; the oldest entry is evicted first.
    pub max_entries: usize,
    /// Directory for persisted entries. `None` keeps the cache in memory only.
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: [
                RequestKind::Category,
                RequestKind::Topic,
                RequestKind::PaperQuality,
            ]
            .into_iter()
            .map(|k| (k, k.default_ttl_secs()))
            .collect(),
            max_entries: 1000,
            directory: None,
        }
    }
}

/// One stored result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub kind: RequestKind,
    pub topics: Vec<Topic>,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Live while `now - created_at < ttl`. A zero TTL is never live; a
    /// `created_at` in the future counts as age zero.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.created_at).num_milliseconds().max(0);
        (age_ms as u128) < u128::from(self.ttl_seconds) * 1000
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub persisted: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub corrupt: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Fingerprint-keyed store of accepted topics.
///
/// Writers replace whole entries under the write lock, so readers see either
/// the previous entry or the new one. Last writer wins.
pub struct ResultCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    corrupt: AtomicU64,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            corrupt: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn max_entries(&self) -> usize {
        self.config.max_entries
    }

    /// TTL for a request kind.
    pub fn ttl_for(&self, kind: RequestKind) -> Duration {
        let secs = self
            .config
            .ttl_seconds
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_ttl_secs());
        Duration::from_secs(secs)
    }

    /// Live topics for `fingerprint`, if any. Expired entries are evicted.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Vec<Topic>> {
        if !self.config.enabled {
            return None;
        }
        let now = Utc::now();

        let cached = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.get(fingerprint).map(|e| (e.is_live(now), e.topics.clone()))
        };
        match cached {
            Some((true, topics)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(topics);
            }
            Some((false, _)) => {
                // A concurrent put may have replaced the entry since the read.
                if let Some(topics) = self.evict_expired(fingerprint) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(topics);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            None => {}
        }

        match self.load_persisted(fingerprint, now) {
            Some(entry) => {
                let topics = entry.topics.clone();
                self.insert_memory(entry);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(topics)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `topics`, replacing any previous entry.
    ///
    /// Persistence failures are logged; the in-memory entry is kept either way.
    pub fn put(&self, fingerprint: Fingerprint, kind: RequestKind, topics: Vec<Topic>, ttl: Duration) {
        if !self.config.enabled {
            return;
        }
        let entry = CacheEntry {
            fingerprint,
            kind,
            topics,
            created_at: Utc::now(),
            ttl_seconds: ttl.as_secs(),
        };
        if let Err(e) = self.persist(&entry) {
            warn!(error = %e, "Failed to persist cache entry");
        }
        self.insert_memory(entry);
    }

    /// Remove an entry. Returns whether anything was removed.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.remove(fingerprint)
    }

    /// Remove every expired entry, in memory and on disk.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut removed = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            let before = entries.len();
            entries.retain(|_, e| e.is_live(now));
            before - entries.len()
        };

        for path in self.persisted_paths() {
            match read_entry(&path) {
                Ok(entry) if entry.is_live(now) => {}
                Ok(entry) => {
                    if remove_file_logged(&path) && !self.contains(&entry.fingerprint) {
                        removed += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Removing corrupt cache entry");
                    self.corrupt.fetch_add(1, Ordering::Relaxed);
                    if remove_file_logged(&path) {
                        removed += 1;
                    }
                }
            }
        }
        removed
    }

    /// Remove every entry. Returns the number of distinct entries removed.
    pub fn clear(&self) -> usize {
        let mut removed: Vec<String> = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.drain().map(|(fp, _)| fp.0).collect()
        };
        for path in self.persisted_paths() {
            if remove_file_logged(&path)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                removed.push(stem.to_string());
            }
        }
        removed.sort();
        removed.dedup();
        removed.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().unwrap_or_else(|e| e.into_inner()).len(),
            persisted: self.persisted_paths().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
        }
    }

    fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(fingerprint)
    }

    fn insert_memory(&self, entry: CacheEntry) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(&entry.fingerprint) {
            while !entries.is_empty() && entries.len() >= self.config.max_entries.max(1) {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, v)| v.created_at)
                    .map(|(k, _)| k.clone());
                let Some(key) = oldest else { break };
                entries.remove(&key);
                if let Some(path) = self.entry_path(&key) {
                    remove_file_logged(&path);
                }
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        entries.insert(entry.fingerprint.clone(), entry);
    }

    /// Evict `fingerprint` only if what is stored now is still expired.
    /// Returns the topics of a live replacement instead.
    fn evict_expired(&self, fingerprint: &Fingerprint) -> Option<Vec<Topic>> {
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            match entries.get(fingerprint) {
                Some(entry) if entry.is_live(Utc::now()) => return Some(entry.topics.clone()),
                Some(_) => {
                    debug!(fingerprint = %fingerprint, "Evicting expired cache entry");
                    entries.remove(fingerprint);
                }
                None => {}
            }
        }
        if let Some(path) = self.entry_path(fingerprint)
            && path.exists()
            && read_entry(&path).map_or(true, |entry| !entry.is_live(Utc::now()))
        {
            remove_file_logged(&path);
        }
        None
    }

    fn remove(&self, fingerprint: &Fingerprint) -> bool {
        let in_memory = self
            .entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(fingerprint)
            .is_some();
        let on_disk = self
            .entry_path(fingerprint)
            .is_some_and(|p| p.exists() && remove_file_logged(&p));
        in_memory || on_disk
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> Option<PathBuf> {
        self.config
            .directory
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", fingerprint.as_str())))
    }

    fn persist(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let Some(path) = self.entry_path(&entry.fingerprint) else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(entry).map_err(|e| CacheError::Persistence {
            path: path.clone(),
            source: io::Error::other(e),
        })?;
        atomic_write(&path, json.as_bytes()).map_err(|source| CacheError::Persistence {
            path: path.clone(),
            source,
        })
    }

    /// Read a persisted entry. Corrupt or expired files are removed.
    fn load_persisted(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Option<CacheEntry> {
        let path = self.entry_path(fingerprint)?;
        if !path.exists() {
            return None;
        }
        match read_entry(&path) {
            Ok(entry) if entry.fingerprint == *fingerprint && entry.is_live(now) => Some(entry),
            Ok(_) => {
                debug!(path = %path.display(), "Removing expired persisted cache entry");
                remove_file_logged(&path);
                None
            }
            Err(e) => {
                warn!(error = %e, "Cache entry unreadable, treating as miss");
                self.corrupt.fetch_add(1, Ordering::Relaxed);
                remove_file_logged(&path);
                None
            }
        }
    }

    fn persisted_paths(&self) -> Vec<PathBuf> {
        let Some(dir) = self.config.directory.as_ref() else {
            return Vec::new();
        };
        let Ok(read_dir) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }
}

fn read_entry(path: &Path) -> Result<CacheEntry, CacheError> {
    let data = std::fs::read_to_string(path).map_err(|source| CacheError::Persistence {
        path: path.to_path_buf(),
        source,
    })?;
    let entry: CacheEntry = serde_json::from_str(&data).map_err(|e| CacheError::Corruption {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if let Some(topic) = entry.topics.iter().find(|t| t.citations.is_empty()) {
        return Err(CacheError::Corruption {
            path: path.to_path_buf(),
            message: format!("topic '{}' has no citations", topic.name),
        });
    }
    Ok(entry)
}

/// Write to a `.tmp` sibling, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

fn remove_file_logged(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            false
        }
    }
}
