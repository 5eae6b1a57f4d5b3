//! 🍃🪣 mgx: stream a whole MongoDB database into an object store, and back out again.
//!
//! Backups are one BSON object per collection under
//! `{upload_path}/{database}/{database}{YYYY-MM-DD_HH_MM_SS}/`, streamed through a fixed-size
//! transfer buffer so memory stays flat no matter how big the database is.
//!
//! 🧠 Knowledge graph:
//! - `streaming`: the resumable, bounded-buffer reader (many cursors in, one byte stream out)
//! - `supervisors`: upload orchestration, latest-backup lookup, restore, pattern restore
//! - `backends`: MongoDB source; S3 and local-directory stores
//! - `app_config`: figment config (`MGX_*` env + TOML)
//!
//! 🦆 The duck is load-bearing. Do not remove the duck.

pub mod app_config;
pub(crate) mod backends;
pub mod common;
pub mod errors;
pub(crate) mod progress;
pub mod streaming;
pub mod supervisors;

use anyhow::Result;

use crate::app_config::AppConfig;
use crate::supervisors::Supervisor;

pub use crate::backends::{DirectoryStoreConfig, MongoSourceConfig, S3StoreConfig};
pub use crate::errors::VaultError;
pub use crate::supervisors::{
    BackupReport, ErrorPolicy, MatchSummary, RestoreOutcome, RestoreReport, RestoreRequest,
};

/// 📤 Back up the configured database into the configured store.
pub async fn run_backup(app_config: AppConfig) -> Result<BackupReport> {
    Supervisor::new(app_config).backup().await
}

/// 📥 Restore according to `request`.
pub async fn run_restore(app_config: AppConfig, request: RestoreRequest) -> Result<RestoreOutcome> {
    Supervisor::new(app_config).restore(&request).await
}
