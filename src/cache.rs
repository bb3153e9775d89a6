//! Persistent travel-cost cache.
//!
//! Keys are [`Fingerprint`]s derived from the backend, the rounded
//! coordinates and, for time-dependent backends, the departure minute. There
//! is no other expiry: a new departure minute simply misses.
//!
//! The whole file is rewritten after every insert (temp file + rename), so a
//! crash mid-write leaves the previous file intact.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::traits::BackendKind;

const CACHE_VERSION: u32 = 1;

/// Minute-granularity departure bucket, e.g. `2026-10-20-08-00`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeBucket(String);

impl TimeBucket {
    pub fn from_departure(departure: NaiveDateTime) -> Self {
        Self(departure.format("%Y-%m-%d-%H-%M").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Deterministic cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Coordinates are rounded to 6 decimals (about 0.1 m).
    pub fn new(kind: BackendKind, points: &[(f64, f64)], bucket: Option<&TimeBucket>) -> Self {
        let coords = points
            .iter()
            .map(|(lat, lng)| format!("{:.6},{:.6}", round6(*lat), round6(*lng)))
            .collect::<Vec<_>>()
            .join(";");
        let time = bucket.map(TimeBucket::as_str).unwrap_or("static");
        Self(format!("{}|{}|{}", kind.tag(), coords, time))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Rounds to 6 decimals; `+ 0.0` folds `-0.0` so both sides of the
/// meridian and equator share a key.
fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6 + 0.0
}

/// Cached payload for one fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub distance_m: f64,
    pub duration_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_no_traffic_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polyline: Option<Vec<(f64, f64)>>,
    pub provider: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_bucket: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub cache_file: Option<PathBuf>,
    pub file_size_bytes: u64,
}

#[derive(Deserialize)]
struct CacheFile {
    version: u32,
    entries: HashMap<String, CostEntry>,
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    entries: BTreeMap<&'a str, &'a CostEntry>,
}

/// Thread-safe fingerprint → [`CostEntry`] store with optional file backing.
#[derive(Debug)]
pub struct CostCache {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, CostEntry>>,
}

impl CostCache {
    /// Cache that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Open (or lazily create) a cache file.
    ///
    /// A missing file yields an empty cache. An unreadable, corrupt or
    /// outdated file is logged and also treated as empty; it is replaced on
    /// the next insert.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load_entries(&path) {
            Ok(Some(entries)) => {
                info!(path = %path.display(), entries = entries.len(), "loaded cost cache");
                entries
            }
            Ok(None) => HashMap::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cost cache unreadable, starting empty");
                HashMap::new()
            }
        };
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &Fingerprint) -> Option<CostEntry> {
        self.lock().get(key.as_str()).cloned()
    }

    /// Insert and persist. Concurrent writers are serialised; the last write
    /// for a fingerprint wins.
    pub fn insert(&self, key: Fingerprint, entry: CostEntry) -> Result<(), CacheError> {
        let mut entries = self.lock();
        entries.insert(key.0, entry);
        match &self.path {
            Some(path) => persist(path, &entries),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.lock();
        entries.clear();
        match &self.path {
            Some(path) => persist(path, &entries),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let file_size_bytes = self
            .path
            .as_ref()
            .and_then(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .unwrap_or(0);
        CacheStats {
            total_entries: self.len(),
            cache_file: self.path.clone(),
            file_size_bytes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CostEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_entries(path: &Path) -> Result<Option<HashMap<String, CostEntry>>, CacheError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    let file: CacheFile = serde_json::from_str(&data)?;
    if file.version != CACHE_VERSION {
        warn!(
            path = %path.display(),
            found = file.version,
            expected = CACHE_VERSION,
            "cost cache version mismatch, ignoring file"
        );
        return Ok(None);
    }
    Ok(Some(file.entries))
}

fn persist(path: &Path, entries: &HashMap<String, CostEntry>) -> Result<(), CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = CacheFileRef {
        version: CACHE_VERSION,
        entries: entries.iter().map(|(k, v)| (k.as_str(), v)).collect(),
    };

    let tmp_path = path.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp_path)?);
    serde_json::to_writer_pretty(&mut writer, &file)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);
    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), entries = entries.len(), "persisted cost cache");
    Ok(())
}
