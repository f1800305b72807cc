use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::sync::batch::DEFAULT_PACING;
use crate::sync::retry::DEFAULT_MAX_ATTEMPTS;

const DEFAULT_EXTENSION: &str = "jpg";
const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 180;
const STATE_DIR_NAME: &str = "shotsync";

const LEDGER_FILE: &str = "upload_log.json";
const RUN_LOG_FILE: &str = "execution.log";
const REPORT_FILE: &str = "upload_report.jsonl";
const TOKEN_FILE: &str = "token.json";

#[derive(Clone, Debug, PartialEq)]
pub struct SyncConfig {
    pub local_dir: PathBuf,
    pub folder_id: String,
    pub extension: String,
    pub state_dir: PathBuf,
    pub max_attempts: u32,
    pub pacing: Duration,
    /// Static access token; bypasses stored state and the browser flow.
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub oauth_timeout: Duration,
    pub api_base_url: Option<String>,
    pub oauth_base_url: Option<String>,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        Self::from_lookup(|name| std::env::var(name).ok(), &home)
    }

    pub fn from_lookup<F>(lookup: F, home: &Path) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let local_dir = var("SHOTSYNC_LOCAL_DIR")
            .map(|value| expand_with_home(&value, home))
            .context("SHOTSYNC_LOCAL_DIR is not set")?;
        let folder_id = var("SHOTSYNC_FOLDER_ID").context("SHOTSYNC_FOLDER_ID is not set")?;
        let extension = var("SHOTSYNC_EXTENSION")
            .map(|value| value.trim().trim_start_matches('.').to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        let state_dir = var("SHOTSYNC_STATE_DIR")
            .map(|value| expand_with_home(&value, home))
            .unwrap_or_else(default_state_dir);
        let max_attempts = read_u64(
            var("SHOTSYNC_MAX_ATTEMPTS"),
            u64::from(DEFAULT_MAX_ATTEMPTS),
        )
        .min(u64::from(u32::MAX)) as u32;
        let pacing = var("SHOTSYNC_PACING_MS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PACING);
        let oauth_timeout = Duration::from_secs(read_u64(
            var("SHOTSYNC_OAUTH_TIMEOUT_SECS"),
            DEFAULT_OAUTH_TIMEOUT_SECS,
        ));

        Ok(Self {
            local_dir,
            folder_id,
            extension,
            state_dir,
            max_attempts,
            pacing,
            access_token: var("SHOTSYNC_TOKEN"),
            client_id: var("SHOTSYNC_CLIENT_ID"),
            client_secret: var("SHOTSYNC_CLIENT_SECRET"),
            oauth_timeout,
            api_base_url: var("SHOTSYNC_API_BASE_URL"),
            oauth_base_url: var("SHOTSYNC_OAUTH_BASE_URL"),
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join(LEDGER_FILE)
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.state_dir.join(RUN_LOG_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.state_dir.join(REPORT_FILE)
    }

    pub fn token_path(&self) -> PathBuf {
        self.state_dir.join(TOKEN_FILE)
    }
}

/// Token file location without requiring the rest of the configuration.
pub fn token_path_from_env() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("home directory is unavailable")?;
    let state_dir = std::env::var("SHOTSYNC_STATE_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(|value| expand_with_home(&value, &home))
        .unwrap_or_else(default_state_dir);
    Ok(state_dir.join(TOKEN_FILE))
}

pub(crate) fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(STATE_DIR_NAME)
}

fn read_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
