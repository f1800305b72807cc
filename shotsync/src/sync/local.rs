use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LocalScanError {
    #[error("local directory does not exist: {0}")]
    MissingDirectory(PathBuf),
    #[error("I/O error while scanning {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalFileRecord {
    pub path: PathBuf,
    pub filename: String,
    /// Seconds since the Unix epoch.
    pub modified: f64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct LocalScanner {
    extension: String,
}

impl LocalScanner {
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Lists matching files directly inside `dir`, oldest first.
    pub fn scan(&self, dir: &Path) -> Result<Vec<LocalFileRecord>, LocalScanError> {
        if !dir.is_dir() {
            return Err(LocalScanError::MissingDirectory(dir.to_path_buf()));
        }
        let entries = std::fs::read_dir(dir).map_err(|source| LocalScanError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if !self.matches(&path) {
                continue;
            }
            // Follows symlinks; a dangling link or a file removed mid-scan is skipped.
            let meta = match std::fs::metadata(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable file");
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                debug!(path = %path.display(), "skipping non UTF-8 filename");
                continue;
            };
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            records.push(LocalFileRecord {
                filename: filename.to_string(),
                path,
                modified,
                size: meta.len(),
            });
        }

        sort_oldest_first(&mut records);
        info!(
            dir = %dir.display(),
            extension = %self.extension,
            files = records.len(),
            "local folder scanned"
        );
        Ok(records)
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }
}

pub(crate) fn sort_oldest_first(records: &mut [LocalFileRecord]) {
    records.sort_by(|a, b| {
        a.modified
            .total_cmp(&b.modified)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str, secs: u64) {
        let path = dir.join(name);
        std::fs::write(&path, name.as_bytes()).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn missing_directory_is_distinguishable() {
        let dir = tempdir().unwrap();
        let err = LocalScanner::new("jpg")
            .scan(&dir.path().join("nope"))
            .expect_err("missing dir should fail");
        assert!(matches!(err, LocalScanError::MissingDirectory(_)));
    }

    #[test]
    fn matches_extension_without_recursing() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a.jpg", 100);
        touch(dir.path(), "B.JPG", 200);
        touch(dir.path(), "c.png", 300);
        touch(dir.path(), "notes.jpg.txt", 400);
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        touch(&dir.path().join("sub"), "deep.jpg", 50);

        let records = LocalScanner::new(".jpg").scan(dir.path()).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "B.JPG"]);
        assert_eq!(records[0].size, "a.jpg".len() as u64);
        assert_eq!(records[0].modified, 100.0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_image_is_listed_with_target_metadata() {
        let dir = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        touch(dir.path(), "plain.jpg", 100);
        touch(elsewhere.path(), "real.jpg", 200);
        std::os::unix::fs::symlink(elsewhere.path().join("real.jpg"), dir.path().join("shot.jpg"))
            .unwrap();

        let records = LocalScanner::new("jpg").scan(dir.path()).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["plain.jpg", "shot.jpg"]);
        assert_eq!(records[1].modified, 200.0);
        assert_eq!(records[1].size, "real.jpg".len() as u64);
    }

    #[cfg(unix)]
    #[test]
    fn broken_entry_does_not_abort_the_scan() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "good.jpg", 100);
        std::os::unix::fs::symlink(dir.path().join("gone.jpg"), dir.path().join("dangling.jpg"))
            .unwrap();

        let records = LocalScanner::new("jpg").scan(dir.path()).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["good.jpg"]);
    }

    #[test]
    fn orders_by_modification_time() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "new.jpg", 300);
        touch(dir.path(), "old.jpg", 100);
        touch(dir.path(), "mid.jpg", 200);

        let records = LocalScanner::new("jpg").scan(dir.path()).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["old.jpg", "mid.jpg", "new.jpg"]);
    }
}
