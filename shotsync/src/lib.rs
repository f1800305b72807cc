pub mod auth;
pub mod config;
pub mod preview;
pub mod runner;
pub mod sync;

pub use config::SyncConfig;
pub use runner::{RunError, RunMode, RunSummary, Runner};
