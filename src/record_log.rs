//! ==============================================================================
//! record_log.rs - durable history of every reading
//! ==============================================================================
//!
//! the log is a pretty-printed json array of readings. each append reads the
//! whole array, pushes one entry and writes the whole array back through a
//! temporary sibling file that is renamed into place, so the log on disk is
//! always either the old or the new sequence.
//!
//! a missing or undecodable file loads as an empty sequence. the next append
//! then replaces any corrupt content.
//!
//! ==============================================================================

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::Reading;
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct RecordLog {
    path: PathBuf,
    /// serializes read-modify-write cycles
    lock: Arc<Mutex<()>>,
}

impl RecordLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Arc::new(Mutex::new(())) }
    }

    /// file the log is persisted to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// every persisted reading in insertion order
    pub fn load(&self) -> Vec<Reading> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_all()
    }

    /// append one reading, rewriting the full sequence
    pub fn append(&self, reading: &Reading) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.read_all();
        records.push(reading.clone());
        self.write_all(&records)
    }

    fn read_all(&self) -> Vec<Reading> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!("Record log {} unreadable, treating as empty: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Record log {} corrupt, rebuilding: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn write_all(&self, records: &[Reading]) -> Result<()> {
        let encoded = serde_json::to_string_pretty(records)?;
        let tmp = self.tmp_path();

        let result = File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(encoded.as_bytes())?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &self.path));

        result.map_err(|source| {
            let _ = fs::remove_file(&tmp);
            Error::Persistence { path: self.path.clone(), source }
        })
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn reading(key: &str, value: &str) -> Reading {
        Reading {
            timestamp: "2025-01-01T12:00:00".to_string(),
            key: key.to_string(),
            unit: String::new(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::new(dir.path().join("values.json"));
        assert_eq!(log.path(), dir.path().join("values.json"));
        assert!(log.load().is_empty());
    }

    #[test]
    fn test_append_then_reload_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.json");
        let log = RecordLog::new(&path);

        let written: Vec<_> = (0..5).map(|i| reading("temperature", &i.to_string())).collect();
        for r in &written {
            log.append(r).unwrap();
        }

        // fresh handle, as after a restart
        assert_eq!(RecordLog::new(&path).load(), written);
        assert!(!dir.path().join("values.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.json");
        fs::write(&path, "[{\"timestamp\": \"trunc").unwrap();

        let log = RecordLog::new(&path);
        assert!(log.load().is_empty());

        log.append(&reading("humidity", "60")).unwrap();
        assert_eq!(log.load(), vec![reading("humidity", "60")]);
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.json");
        let log = RecordLog::new(&path);
        let mut r = reading("temperature", "21.5");
        r.unit = "°C".to_string();
        log.append(&r).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("°C"), "units are written as raw utf-8");
        let ts = text.find("\"timestamp\"").unwrap();
        let key = text.find("\"key\"").unwrap();
        let unit = text.find("\"unit\"").unwrap();
        let value = text.find("\"value\"").unwrap();
        assert!(ts < key && key < unit && unit < value);
        assert!(text.contains("\n    \"key\""), "two-space indent inside the array");
    }

    #[test]
    fn test_unwritable_location_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::new(dir.path().join("missing-dir").join("values.json"));
        let err = log.append(&reading("temperature", "1")).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::new(dir.path().join("values.json"));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        log.append(&reading("temperature", &format!("{t}-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(log.load().len(), 40);
    }
}
