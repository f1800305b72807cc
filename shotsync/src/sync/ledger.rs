use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("ledger encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable filename -> last uploaded modification time (epoch seconds).
///
/// Entries only move forward in time and are never removed, so stale names for
/// files deleted locally stay around harmlessly.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, f64>,
}

impl Ledger {
    pub fn in_memory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Never fails: a missing or unreadable ledger only costs dedup memory.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(raw) => match serde_json::from_slice::<BTreeMap<String, f64>>(&raw) {
                Ok(entries) => {
                    info!(path = %path.display(), entries = entries.len(), "upload ledger loaded");
                    entries
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "upload ledger is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no upload ledger yet");
                BTreeMap::new()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "upload ledger unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn save(&self) -> Result<(), LedgerError> {
        let payload = serde_json::to_vec_pretty(&self.entries)?;
        write_atomically(&self.path, &payload)?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "upload ledger saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, filename: &str) -> Option<f64> {
        self.entries.get(filename).copied()
    }

    /// True when the stored time is at or past `modified`.
    pub fn is_uploaded(&self, filename: &str, modified: f64) -> bool {
        self.get(filename).is_some_and(|stored| stored >= modified)
    }

    pub fn record(&mut self, filename: &str, modified: f64) {
        let entry = self
            .entries
            .entry(filename.to_string())
            .or_insert(modified);
        if modified > *entry {
            *entry = modified;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes next to the target and renames over it, so readers see either the
/// old or the new file.
pub(crate) fn write_atomically(target: &Path, payload: &[u8]) -> io::Result<()> {
    write_atomically_with(target, payload, std::fs::OpenOptions::new())
}

/// Same as [`write_atomically`], with `options` deciding how the temporary
/// file is created (for example its Unix mode).
pub(crate) fn write_atomically_with(
    target: &Path,
    payload: &[u8],
    mut options: std::fs::OpenOptions,
) -> io::Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let temp = temp_path(target);
    // A leftover temp file would keep its old mode.
    match std::fs::remove_file(&temp) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
        _ => {}
    }
    {
        let mut file = options.write(true).create_new(true).open(&temp)?;
        file.write_all(payload)?;
        file.flush()?;
        file.sync_all()?;
    }
    std::fs::rename(&temp, target)
}

fn temp_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}tmp",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("upload_log.json"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("upload_log.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let ledger = Ledger::load(&path);
        assert!(ledger.is_empty());
    }

    #[test]
    fn reads_historical_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("upload_log.json");
        std::fs::write(&path, br#"{ "a.jpg": 1700000000.5, "b.jpg": 1700000100 }"#).unwrap();

        let ledger = Ledger::load(&path);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("a.jpg"), Some(1_700_000_000.5));
        assert_eq!(ledger.get("b.jpg"), Some(1_700_000_100.0));
    }

    #[test]
    fn save_then_load_preserves_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state/upload_log.json");
        let mut ledger = Ledger::load(&path);
        ledger.record("b.jpg", 20.0);
        ledger.save().unwrap();

        let reloaded = Ledger::load(&path);
        assert_eq!(reloaded.get("b.jpg"), Some(20.0));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn record_never_moves_backwards() {
        let mut ledger = Ledger::in_memory("unused.json");
        ledger.record("a.jpg", 20.0);
        ledger.record("a.jpg", 10.0);
        assert_eq!(ledger.get("a.jpg"), Some(20.0));
        ledger.record("a.jpg", 30.0);
        assert_eq!(ledger.get("a.jpg"), Some(30.0));
    }

    #[test]
    fn is_uploaded_compares_with_stored_time() {
        let mut ledger = Ledger::in_memory("unused.json");
        ledger.record("a.jpg", 20.0);
        assert!(ledger.is_uploaded("a.jpg", 20.0));
        assert!(ledger.is_uploaded("a.jpg", 19.0));
        assert!(!ledger.is_uploaded("a.jpg", 21.0));
        assert!(!ledger.is_uploaded("other.jpg", 1.0));
    }

    #[test]
    fn save_fails_when_target_is_a_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("taken");
        std::fs::create_dir_all(&path).unwrap();

        let ledger = Ledger::in_memory(&path);
        assert!(ledger.save().is_err());
    }
}
