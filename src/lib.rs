//! Student records: students, per-subject grades, averages and toppers over
//! SQLite or PostgreSQL, with CSV/JSON/zip export and a JSON-lines sidecar.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ipc;
pub mod records;
pub mod store;
pub mod validate;

pub use config::{BackendConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use records::{ExportRow, StudentRecord, StudentSummary, Topper};
pub use store::Store;
