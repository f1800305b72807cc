use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use super::batch::ExecutionReport;

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    PartialFailure,
    NothingToDo,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialFailure => "partial_failure",
            RunStatus::NothingToDo => "nothing_to_do",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub mode: String,
    pub status: RunStatus,
    pub files: usize,
    pub error: Option<String>,
}

impl RunRecord {
    fn to_line(&self, timestamp: &str) -> String {
        let mut line = format!(
            "{timestamp}\tmode={}\tstatus={}\tfiles={}",
            self.mode, self.status, self.files
        );
        if let Some(error) = &self.error {
            // Keep one record per line.
            let flat: String = error
                .chars()
                .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
                .collect();
            line.push_str("\terror=");
            line.push_str(&flat);
        }
        line
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")
}

/// Append-only text log with one line per run.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: RunRecord) {
        let line = record.to_line(&now_rfc3339());
        if let Err(err) = append_line(&self.path, &line) {
            warn!(path = %self.path.display(), error = %err, "failed to write run log");
        }
    }
}

/// Detailed per-batch reports, one JSON object per line.
#[derive(Debug, Clone)]
pub struct ReportLog {
    path: PathBuf,
}

impl ReportLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, report: &ExecutionReport) {
        let line = match serde_json::to_string(report) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to encode execution report");
                return;
            }
        };
        if let Err(err) = append_line(&self.path, &line) {
            warn!(path = %self.path.display(), error = %err, "failed to write execution report");
        }
    }
}
