use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::DataKind;

/// Each kind lives in its own document so keys never collide across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Location,
    Weather,
    AirQuality,
}

impl CacheKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Weather => "weather",
            Self::AirQuality => "air_quality",
        }
    }

    /// Location keeps every resolved descriptor; the forecast kinds keep only
    /// the latest record.
    fn keeps_history(self) -> bool {
        matches!(self, Self::Location)
    }
}

impl From<DataKind> for CacheKind {
    fn from(kind: DataKind) -> Self {
        match kind {
            DataKind::Weather => Self::Weather,
            DataKind::AirQuality => Self::AirQuality,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn encode<T: Serialize>(
        key: impl Into<String>,
        value: &T,
        stored_at: DateTime<Utc>,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            key: key.into(),
            payload: serde_json::to_value(value)?,
            stored_at,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct KeyedRecord {
    payload: Value,
    stored_at: DateTime<Utc>,
}

pub trait CacheStore {
    /// Returns `None` for a miss, a key mismatch, or an unreadable document.
    fn get(&self, kind: CacheKind, key: &str) -> Option<CacheEntry>;
    fn put(&self, kind: CacheKind, entry: &CacheEntry) -> io::Result<()>;
}

pub fn age_secs(stored_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    now.signed_duration_since(stored_at)
        .num_seconds()
        .max(0)
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Fresh while `now - stored_at < ttl`.
pub fn is_fresh(stored_at: DateTime<Utc>, now: DateTime<Utc>, ttl_secs: u64) -> bool {
    age_secs(stored_at, now) < ttl_secs
}

#[derive(Debug, Clone)]
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            root: cache_dir.join("display-feed"),
        }
    }

    pub fn document_path(&self, kind: CacheKind) -> PathBuf {
        self.root.join(format!("{}.json", kind.as_str()))
    }

    fn read_document<T: DeserializeOwned>(&self, kind: CacheKind) -> Option<T> {
        let path = self.document_path(kind);
        if !path.exists() {
            tracing::debug!(kind = kind.as_str(), "cache document missing");
            return None;
        }

        let payload = match fs::read_to_string(&path) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "cache document unreadable");
                return None;
            }
        };

        match serde_json::from_str::<T>(&payload) {
            Ok(document) => Some(document),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "cache document corrupt, ignoring");
                None
            }
        }
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, kind: CacheKind, key: &str) -> Option<CacheEntry> {
        if kind.keeps_history() {
            let document = self.read_document::<BTreeMap<String, KeyedRecord>>(kind)?;
            return document.get(key).map(|record| CacheEntry {
                key: key.to_string(),
                payload: record.payload.clone(),
                stored_at: record.stored_at,
            });
        }

        let entry = self.read_document::<CacheEntry>(kind)?;
        if entry.key != key {
            tracing::debug!(
                kind = kind.as_str(),
                cached = %entry.key,
                requested = key,
                "cache record belongs to another key"
            );
            return None;
        }
        Some(entry)
    }

    fn put(&self, kind: CacheKind, entry: &CacheEntry) -> io::Result<()> {
        let encoded = if kind.keeps_history() {
            let mut document = self
                .read_document::<BTreeMap<String, KeyedRecord>>(kind)
                .unwrap_or_default();
            document.insert(
                entry.key.clone(),
                KeyedRecord {
                    payload: entry.payload.clone(),
                    stored_at: entry.stored_at,
                },
            );
            serde_json::to_vec(&document)
        } else {
            serde_json::to_vec(entry)
        };
        let bytes = encoded
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error.to_string()))?;

        write_atomic(&self.document_path(kind), &bytes)
    }
}

/// In-process store, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RefCell<HashMap<CacheKind, BTreeMap<String, CacheEntry>>>,
    read_only: Cell<bool>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent `put` fails with `PermissionDenied`.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.set(read_only);
    }

    pub fn len(&self, kind: CacheKind) -> usize {
        self.entries.borrow().get(&kind).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, kind: CacheKind) -> bool {
        self.len(kind) == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, kind: CacheKind, key: &str) -> Option<CacheEntry> {
        self.entries
            .borrow()
            .get(&kind)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    fn put(&self, kind: CacheKind, entry: &CacheEntry) -> io::Result<()> {
        if self.read_only.get() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "memory cache is read-only",
            ));
        }

        let mut entries = self.entries.borrow_mut();
        let slot = entries.entry(kind).or_default();
        if !kind.keeps_history() {
            slot.clear();
        }
        slot.insert(entry.key.clone(), entry.clone());
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "cache path must have a parent directory",
        )
    })?;
    fs::create_dir_all(parent)?;

    let tmp_path = path.with_extension(format!("{}.tmp", std::process::id()));
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
