//! Check-in persistence
//!
//! The whole log is stored as one JSON array under a fixed key and rewritten
//! on every save. Loading is forgiving: a missing key, unreadable storage or
//! corrupt JSON all yield an empty log, and individual malformed entries are
//! dropped without failing the rest.

use crate::error::EngineError;
use crate::types::{CalendarDate, CheckInLog, CheckInRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Key the check-in log is stored under
pub const DEFAULT_LOG_KEY: &str = "trichmind.checkins.v1";

/// Key/value storage the log is persisted into
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, EngineError>;
    fn write(&self, key: &str, value: &str) -> Result<(), EngineError>;
}

/// One JSON file per key inside a data directory
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, EngineError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), EngineError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(key);
        // Write-then-rename so a crash never leaves a half-written log behind
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

/// Process-local storage, used by tests and embedders without a filesystem
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value, bypassing the store's encoder
    pub fn with_raw(key: &str, raw: &str) -> Self {
        let backend = Self::new();
        backend
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.to_string(), raw.to_string());
        backend
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, EngineError> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Persistence for the per-day check-in log
pub struct CheckInStore {
    backend: Box<dyn StorageBackend>,
    key: String,
}

impl CheckInStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self::with_key(backend, DEFAULT_LOG_KEY)
    }

    pub fn with_key(backend: Box<dyn StorageBackend>, key: &str) -> Self {
        Self {
            backend,
            key: key.to_string(),
        }
    }

    /// Store backed by JSON files in `dir`
    pub fn open_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(FileBackend::new(dir)))
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted log. Never fails; degrades to an empty log.
    pub fn load(&self) -> CheckInLog {
        let raw = match self.backend.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(key = %self.key, "no persisted check-in log, starting empty");
                return CheckInLog::new();
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "check-in storage unreadable, starting empty");
                return CheckInLog::new();
            }
        };

        let (log, dropped) = decode_log(&raw);
        if dropped > 0 {
            warn!(key = %self.key, dropped, kept = log.len(), "dropped invalid check-in entries");
        }
        log
    }

    /// Persist the entire log, replacing whatever was stored before
    pub fn save(&self, log: &CheckInLog) -> Result<(), EngineError> {
        let json = serde_json::to_string(log)?;
        self.backend.write(&self.key, &json)?;
        debug!(key = %self.key, records = log.len(), "saved check-in log");
        Ok(())
    }

    /// New log with `record` replacing any record for the same date.
    ///
    /// Idempotent: upserting the same `(date, relapsed)` pair again yields an
    /// equal log.
    pub fn upsert(log: &CheckInLog, record: CheckInRecord) -> CheckInLog {
        log.upsert(record)
    }
}

/// Decode a persisted log, returning it with the number of entries dropped.
///
/// Anything that is not a JSON array decodes to an empty log; each array
/// entry must carry a strict `YYYY-MM-DD` date and a boolean `relapsed`.
pub fn decode_log(raw: &str) -> (CheckInLog, usize) {
    let entries = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(other) => {
            warn!(kind = json_kind(&other), "persisted check-in log is not an array");
            return (CheckInLog::new(), 0);
        }
        Err(e) => {
            warn!(error = %e, "persisted check-in log is not valid JSON");
            return (CheckInLog::new(), 0);
        }
    };

    let total = entries.len();
    let records: Vec<CheckInRecord> = entries.iter().filter_map(decode_entry).collect();
    let dropped = total - records.len();
    (CheckInLog::from_records(records), dropped)
}

fn decode_entry(entry: &Value) -> Option<CheckInRecord> {
    let date = entry.get("date")?.as_str()?;
    let relapsed = entry.get("relapsed")?.as_bool()?;
    let date = CalendarDate::parse_strict(date).ok()?;
    Some(CheckInRecord::new(date, relapsed))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
