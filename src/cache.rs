//! Content-addressed extraction cache.
//!
//! Maps a page's content fingerprint to the text previously extracted from
//! it, so a scanned page is only OCR'd once no matter how many documents it
//! appears in.
//!
//! ## Why failures degrade to a miss
//!
//! The cache is an optimisation. A corrupt entry, a permissions problem or a
//! full disk must never fail a run: reads log and report a miss, and the
//! driver logs (and otherwise ignores) write failures.
//!
//! ## On-disk layout
//!
//! ```text
//! <cache_dir>/
//!   3f/
//!     3f9a…e1.json   { fingerprint, text, method, extracted_at }
//! ```
//!
//! Entries are written to a temp file in the shard directory and renamed into
//! place, so readers never observe a half-written entry and concurrent
//! writers of the same content converge on identical bytes.

use crate::document::ExtractionMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// One cached extraction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub text: String,
    pub method: ExtractionMethod,
    pub extracted_at: DateTime<Utc>,
}

/// Errors from cache writes. Reads never error; they miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid fingerprint '{0}'")]
    InvalidFingerprint(String),

    #[error("cache I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache entry encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Hit/miss/write counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Point-lookup store keyed by page fingerprint.
///
/// Implementations must tolerate concurrent readers, and `put` must be
/// idempotent: storing identical text twice is observably a no-op. Methods
/// may block; async callers run them with `spawn_blocking`.
pub trait ExtractionCache: Send + Sync {
    /// Cached entry for `fingerprint`, or `None` on a miss.
    fn get(&self, fingerprint: &str) -> Option<CacheEntry>;

    /// Store `text` under `fingerprint`.
    fn put(&self, fingerprint: &str, text: &str, method: ExtractionMethod) -> Result<(), CacheError>;

    /// Counters since construction.
    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

fn validate_fingerprint(fp: &str) -> Result<(), CacheError> {
    let ok = fp.len() >= 2 && fp.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    if ok {
        Ok(())
    } else {
        Err(CacheError::InvalidFingerprint(fp.to_string()))
    }
}

// ── Disk cache ───────────────────────────────────────────────────────────

/// Persistent cache of JSON entries sharded by fingerprint prefix.
#[derive(Debug)]
pub struct DiskExtractionCache {
    root: PathBuf,
    counters: Counters,
}

impl DiskExtractionCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self {
            root,
            counters: Counters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shard_dir(&self, fp: &str) -> PathBuf {
        self.root.join(&fp[..2])
    }

    fn entry_path(&self, fp: &str) -> PathBuf {
        self.shard_dir(fp).join(format!("{fp}.json"))
    }

    fn read_entry(&self, fp: &str) -> Option<CacheEntry> {
        if validate_fingerprint(fp).is_err() {
            return None;
        }
        let path = self.entry_path(fp);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.fingerprint == fp => Some(entry),
            Ok(entry) => {
                warn!(
                    "Cache entry {} holds fingerprint {}; treating as miss",
                    path.display(),
                    entry.fingerprint
                );
                None
            }
            Err(e) => {
                warn!("Corrupt cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Number of entries currently on disk.
    pub fn len(&self) -> usize {
        self.entry_files().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove entries extracted more than `max_age` ago. Returns how many were removed.
    ///
    /// Unparseable entries are removed as well.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize, CacheError> {
        let max_age =
            chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(365_000));
        let cutoff = Utc::now().checked_sub_signed(max_age);
        let mut removed = 0;
        for path in self.entry_files().collect::<Vec<_>>() {
            let stale = match fs::read(&path)
                .ok()
                .and_then(|b| serde_json::from_slice::<CacheEntry>(&b).ok())
            {
                Some(entry) => cutoff.is_some_and(|c| entry.extracted_at < c),
                None => true,
            };
            if stale {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => return Err(CacheError::Io { path, source }),
                }
            }
        }
        debug!("Pruned {} cache entries from {}", removed, self.root.display());
        Ok(removed)
    }

    fn entry_files(&self) -> impl Iterator<Item = PathBuf> {
        fs::read_dir(&self.root)
            .into_iter()
            .flatten()
            .flatten()
            .filter(|shard| shard.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .flat_map(|shard| fs::read_dir(shard.path()).into_iter().flatten().flatten())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
    }
}

impl ExtractionCache for DiskExtractionCache {
    fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let entry = self.read_entry(fingerprint);
        match entry {
            Some(_) => {
                debug!("Cache hit: {}", fingerprint);
                self.counters.hit();
            }
            None => self.counters.miss(),
        }
        entry
    }

    fn put(&self, fingerprint: &str, text: &str, method: ExtractionMethod) -> Result<(), CacheError> {
        validate_fingerprint(fingerprint)?;

        if let Some(existing) = self.read_entry(fingerprint) {
            if existing.text == text {
                return Ok(());
            }
        }

        let shard = self.shard_dir(fingerprint);
        fs::create_dir_all(&shard).map_err(|source| CacheError::Io {
            path: shard.clone(),
            source,
        })?;

        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            text: text.to_string(),
            method,
            extracted_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry)?;

        let final_path = self.entry_path(fingerprint);
        let mut tmp = tempfile::NamedTempFile::new_in(&shard).map_err(|source| CacheError::Io {
            path: shard.clone(),
            source,
        })?;
        tmp.write_all(&bytes).map_err(|source| CacheError::Io {
            path: tmp.path().to_path_buf(),
            source,
        })?;
        tmp.persist(&final_path).map_err(|e| CacheError::Io {
            path: final_path.clone(),
            source: e.error,
        })?;

        self.counters.write();
        debug!("Cached {} chars for {}", text.len(), fingerprint);
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

// ── Memory cache ─────────────────────────────────────────────────────────

/// Process-local cache used when no cache directory is configured.
#[derive(Debug, Default)]
pub struct MemoryExtractionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    counters: Counters,
}

impl MemoryExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ExtractionCache for MemoryExtractionCache {
    fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
        let entry = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned();
        match entry {
            Some(_) => self.counters.hit(),
            None => self.counters.miss(),
        }
        entry
    }

    fn put(&self, fingerprint: &str, text: &str, method: ExtractionMethod) -> Result<(), CacheError> {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if map.get(fingerprint).is_some_and(|e| e.text == text) {
            return Ok(());
        }
        map.insert(
            fingerprint.to_string(),
            CacheEntry {
                fingerprint: fingerprint.to_string(),
                text: text.to_string(),
                method,
                extracted_at: Utc::now(),
            },
        );
        self.counters.write();
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::fingerprint;
    use tempfile::TempDir;

    #[test]
    fn disk_put_then_get_returns_same_text() {
        let dir = TempDir::new().unwrap();
        let cache = DiskExtractionCache::open(dir.path()).unwrap();
        let fp = fingerprint(b"page one");

        assert!(cache.get(&fp).is_none());
        cache
            .put(&fp, "Revenue grew 4%.", ExtractionMethod::OpticalCharacterRecognition)
            .unwrap();

        let entry = cache.get(&fp).unwrap();
        assert_eq!(entry.text, "Revenue grew 4%.");
        assert_eq!(entry.method, ExtractionMethod::OpticalCharacterRecognition);
        assert!(dir.path().join(&fp[..2]).join(format!("{fp}.json")).exists());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
    }

    #[test]
    fn disk_second_identical_put_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = DiskExtractionCache::open(dir.path()).unwrap();
        let fp = fingerprint(b"cover");

        cache.put(&fp, "Cover", ExtractionMethod::EmbeddedText).unwrap();
        let first = cache.get(&fp).unwrap();
        cache.put(&fp, "Cover", ExtractionMethod::EmbeddedText).unwrap();
        let second = cache.get(&fp).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.stats().writes, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn disk_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let fp = fingerprint(b"persist");
        DiskExtractionCache::open(dir.path())
            .unwrap()
            .put(&fp, "kept", ExtractionMethod::EmbeddedText)
            .unwrap();

        let reopened = DiskExtractionCache::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&fp).unwrap().text, "kept");
    }

    #[test]
    fn corrupt_entry_is_a_miss_and_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let cache = DiskExtractionCache::open(dir.path()).unwrap();
        let fp = fingerprint(b"corrupt");
        let shard = dir.path().join(&fp[..2]);
        fs::create_dir_all(&shard).unwrap();
        fs::write(shard.join(format!("{fp}.json")), b"{not json").unwrap();

        assert!(cache.get(&fp).is_none());
        cache.put(&fp, "fresh", ExtractionMethod::EmbeddedText).unwrap();
        assert_eq!(cache.get(&fp).unwrap().text, "fresh");
    }

    #[test]
    fn mismatched_fingerprint_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = DiskExtractionCache::open(dir.path()).unwrap();
        let a = fingerprint(b"a");
        let b = fingerprint(b"b");
        cache.put(&a, "A", ExtractionMethod::EmbeddedText).unwrap();

        let shard = dir.path().join(&b[..2]);
        fs::create_dir_all(&shard).unwrap();
        fs::copy(
            dir.path().join(&a[..2]).join(format!("{a}.json")),
            shard.join(format!("{b}.json")),
        )
        .unwrap();

        assert!(cache.get(&b).is_none());
    }

    #[test]
    fn invalid_fingerprint_rejected_on_put() {
        let dir = TempDir::new().unwrap();
        let cache = DiskExtractionCache::open(dir.path()).unwrap();
        let err = cache
            .put("../escape", "x", ExtractionMethod::EmbeddedText)
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidFingerprint(_)));
        assert!(cache.get("../escape").is_none());
    }

    #[test]
    fn prune_removes_old_and_corrupt_entries() {
        let dir = TempDir::new().unwrap();
        let cache = DiskExtractionCache::open(dir.path()).unwrap();
        let fresh = fingerprint(b"fresh");
        let old = fingerprint(b"old");
        cache.put(&fresh, "fresh", ExtractionMethod::EmbeddedText).unwrap();

        let stale = CacheEntry {
            fingerprint: old.clone(),
            text: "old".into(),
            method: ExtractionMethod::EmbeddedText,
            extracted_at: Utc::now() - chrono::Duration::days(30),
        };
        let shard = dir.path().join(&old[..2]);
        fs::create_dir_all(&shard).unwrap();
        fs::write(
            shard.join(format!("{old}.json")),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        let removed = cache
            .prune_older_than(Duration::from_secs(7 * 24 * 3600))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get(&old).is_none());
        assert!(cache.get(&fresh).is_some());
    }

    #[test]
    fn memory_cache_is_idempotent() {
        let cache = MemoryExtractionCache::new();
        cache.put("ab", "text", ExtractionMethod::EmbeddedText).unwrap();
        cache.put("ab", "text", ExtractionMethod::EmbeddedText).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().writes, 1);
        assert_eq!(cache.get("ab").unwrap().text, "text");
        assert!(cache.get("cd").is_none());
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
