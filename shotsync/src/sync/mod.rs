pub mod backoff;
pub mod batch;
pub mod classify;
pub mod executor;
pub mod ledger;
pub mod local;
pub mod reconcile;
pub mod remote;
pub mod report;
pub mod retry;
#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{BatchRunner, ExecutionReport, FileOutcome};
pub use classify::{Classification, ErrorCategory};
pub use executor::{UploadExecutor, UploadOutcome};
pub use ledger::Ledger;
pub use local::{LocalFileRecord, LocalScanner};
pub use reconcile::{ReconcileSummary, UploadTask};
pub use remote::{DriveStore, RemoteInventory, RemoteScanner, RemoteStore, StoreError};
pub use retry::RetryController;
