//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where databases vanish without warning..."
//! 🎬 "One supervisor dared to back them all up."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module: builds the backends from config, then hands the real work to
//! its crew: the uploader, the locator, the restorer, and the matcher.
//!
//! 🧠 Knowledge graph:
//! - `Supervisor::backup`: MongoSource → StreamingDocumentReader → ChunkedUploadOrchestrator → store
//! - `Supervisor::restore`: BackupLocator (or PatternMatcher) → RestoreOrchestrator → local disk
//! - The crew is generic over `DocumentSource`/`ObjectStore`; only this file knows about config.
//!
//! ⚠️ The crew modules stay private. Their reports are re-exported; their machinery is not.

mod locator;
mod matcher;
mod restorer;
mod uploader;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::app_config::{AppConfig, BackupConfig, RuntimeConfig, SourceConfig, StoreConfig};
use crate::backends::directory::DirectoryStore;
use crate::backends::mongo::MongoSource;
use crate::backends::s3::S3Store;
use crate::backends::{DocumentSource, ObjectStore, StoreBackend};
use crate::common::{BackupInstance, BackupPath, BackupTarget};
use crate::progress::ProgressMetrics;
use crate::streaming::StreamingDocumentReader;

pub use matcher::{ErrorPolicy, MatchSummary};
pub use restorer::{RestoreReport, RestoredFile};
pub use uploader::{BackupReport, CommittedObject};

use locator::locate_latest;
use matcher::PatternMatcher;
use restorer::RestoreOrchestrator;
use uploader::ChunkedUploadOrchestrator;

/// 📝 What the caller wants restored, straight from the command line.
#[derive(Debug, Clone, Default)]
pub struct RestoreRequest {
    /// `bucket[/uploadPath]/database` with `latest`, the full instance path without it,
    /// or `bucket[/uploadPath]` with a `pattern`.
    pub path: String,
    pub latest: bool,
    pub pattern: Option<String>,
    /// Overrides `runtime.show_progress` when set.
    pub show_progress: Option<bool>,
    /// Overrides `runtime.match_error_policy` when set.
    pub error_policy: Option<ErrorPolicy>,
}

/// 🧾 One instance restored, or a pattern's worth of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Single(RestoreReport),
    Matched(MatchSummary),
}

/// 📦 The Supervisor: holds the config, builds the backends, runs one operation at a time.
#[derive(Debug)]
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    async fn build_store(&self) -> Result<StoreBackend> {
        Ok(match &self.app_config.store_config {
            StoreConfig::S3(config) => StoreBackend::S3(S3Store::new(config.clone()).await?),
            StoreConfig::Directory(config) => {
                StoreBackend::Directory(DirectoryStore::new(config.clone()))
            }
        })
    }

    /// 📤 Back up the configured database into the configured bucket.
    pub(crate) async fn backup(&self) -> Result<BackupReport> {
        let source_config = self.app_config.source_config.as_ref().ok_or_else(|| {
            anyhow!("💀 `store` needs a [source_config.Mongo] section. Nothing to back up without a database.")
        })?;
        let backup_config = self.app_config.backup.as_ref().ok_or_else(|| {
            anyhow!("💀 `store` needs a [backup] section with at least a bucket.")
        })?;

        let SourceConfig::Mongo(mongo_config) = source_config;
        let source = MongoSource::new(mongo_config.clone())
            .await
            .context("💀 could not connect to the source database")?;
        let database = source.database_name().to_string();
        let store = self.build_store().await?;

        back_up(
            source,
            &database,
            &store,
            backup_config,
            &self.app_config.runtime,
            Utc::now(),
        )
        .await
    }

    /// 📥 Restore one instance, the latest of one database, or the latest of every match.
    pub(crate) async fn restore(&self, request: &RestoreRequest) -> Result<RestoreOutcome> {
        // -- 🙅 bad paths are rejected before we go build a network client
        BackupPath::parse(&request.path)?;
        let store = self.build_store().await?;
        restore(&store, request, &self.app_config.runtime).await
    }
}

/// 📤 One backup run, start to finish, against any source and store.
async fn back_up<Src: DocumentSource, St: ObjectStore>(
    source: Src,
    database: &str,
    store: &St,
    backup: &BackupConfig,
    runtime: &RuntimeConfig,
    at: DateTime<Utc>,
) -> Result<BackupReport> {
    let target = BackupTarget::new(&backup.bucket, &backup.upload_path, database, at);
    let label = format!("{database} → {}/{}", target.bucket, target.instance_prefix());
    let metrics = if runtime.show_progress {
        ProgressMetrics::new(label, 0)
    } else {
        ProgressMetrics::hidden(label, 0)
    };

    let mut reader = StreamingDocumentReader::new(source);
    let report = ChunkedUploadOrchestrator::new(store, target, runtime.transfer_buffer_bytes, metrics)
        .run(&mut reader)
        .await
        .with_context(|| format!("💀 backup of database '{database}' did not finish"))?;
    Ok(report)
}

/// 📥 One restore request against any store.
async fn restore<St: ObjectStore>(
    store: &St,
    request: &RestoreRequest,
    runtime: &RuntimeConfig,
) -> Result<RestoreOutcome> {
    let path = BackupPath::parse(&request.path)?;
    let show_progress = request.show_progress.unwrap_or(runtime.show_progress);
    let restorer = RestoreOrchestrator::new(store, &runtime.dump_dir, show_progress);

    if let Some(pattern) = &request.pattern {
        let policy = request.error_policy.unwrap_or(runtime.match_error_policy);
        let summary = PatternMatcher::new(&restorer, policy)
            .restore_matching(&path, pattern, request.latest)
            .await
            .with_context(|| format!("💀 restoring databases matching '{pattern}' under {path}"))?;
        info!(
            "🎯 {} databases matched, {} restored",
            summary.matched.len(),
            summary.restored.len()
        );
        return Ok(RestoreOutcome::Matched(summary));
    }

    let instance = if request.latest {
        locate_latest(store, &path).await?
    } else {
        BackupInstance::from_path(&path)?
    };
    let report = restorer
        .restore(&instance)
        .await
        .with_context(|| format!("💀 restoring {}/{}", instance.bucket, instance.prefix))?;
    Ok(RestoreOutcome::Single(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::{InMemorySource, InMemoryStore};
    use crate::errors::VaultError;
    use crate::streaming::tests::{docs, split_bson};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn runtime(dump: &TempDir) -> RuntimeConfig {
        RuntimeConfig {
            transfer_buffer_bytes: 128,
            show_progress: false,
            dump_dir: dump.path().to_path_buf(),
            match_error_policy: ErrorPolicy::AbortOnFirstError,
        }
    }

    fn shop() -> InMemorySource {
        InMemorySource::new()
            .with_collection("users", docs("u", 3))
            .with_collection("orders", docs("o", 5))
    }

    #[tokio::test]
    async fn the_one_where_a_database_goes_up_and_comes_back_down_intact() {
        let store = InMemoryStore::new();
        let dump = TempDir::new().unwrap();
        let runtime = runtime(&dump);
        let backup = BackupConfig {
            bucket: "vault".to_string(),
            upload_path: "/".to_string(),
        };

        for month in [1, 6] {
            let at = Utc.with_ymd_and_hms(2023, month, 1, 0, 0, 0).unwrap();
            back_up(shop(), "testdb", &store, &backup, &runtime, at)
                .await
                .unwrap();
        }

        let request = RestoreRequest {
            path: "vault/testdb".to_string(),
            latest: true,
            ..Default::default()
        };
        let outcome = restore(&store, &request, &runtime).await.unwrap();

        let RestoreOutcome::Single(report) = outcome else {
            panic!("💀 a plain latest restore should restore exactly one instance");
        };
        assert_eq!(report.instance.name, "testdb2023-06-01_00_00_00");
        let dir = dump.path().join("testdb2023-06-01_00_00_00");
        let users = std::fs::read(dir.join("users.bson")).unwrap();
        let orders = std::fs::read(dir.join("orders.bson")).unwrap();
        assert_eq!(split_bson(&users), docs("u", 3));
        assert_eq!(split_bson(&orders), docs("o", 5));
    }

    #[tokio::test]
    async fn the_one_where_an_explicit_instance_skips_the_search() {
        let store = InMemoryStore::new();
        let dump = TempDir::new().unwrap();
        let runtime = runtime(&dump);
        let backup = BackupConfig {
            bucket: "vault".to_string(),
            upload_path: "nightly".to_string(),
        };
        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        back_up(shop(), "testdb", &store, &backup, &runtime, at)
            .await
            .unwrap();

        let request = RestoreRequest {
            path: "vault/nightly/testdb/testdb2023-01-01_00_00_00".to_string(),
            ..Default::default()
        };
        let outcome = restore(&store, &request, &runtime).await.unwrap();
        assert!(matches!(outcome, RestoreOutcome::Single(ref r) if r.files.len() == 2));
    }

    #[tokio::test]
    async fn the_one_where_a_database_path_without_latest_keeps_every_instance_apart() {
        let store = InMemoryStore::new();
        store
            .seed("vault", "testdb/testdb2023-01-01_00_00_00/users.bson", b"JANUARY".to_vec())
            .await;
        store
            .seed("vault", "testdb/testdb2023-06-01_00_00_00/users.bson", b"JUNE".to_vec())
            .await;
        let dump = TempDir::new().unwrap();

        let request = RestoreRequest {
            path: "vault/testdb".to_string(),
            ..Default::default()
        };
        let outcome = restore(&store, &request, &runtime(&dump)).await.unwrap();

        let RestoreOutcome::Single(report) = outcome else {
            panic!("💀 an explicit path restores exactly one prefix");
        };
        assert_eq!(report.files.len(), 2);
        assert_eq!(
            std::fs::read(dump.path().join("testdb2023-01-01_00_00_00/users.bson")).unwrap(),
            b"JANUARY"
        );
        assert_eq!(
            std::fs::read(dump.path().join("testdb2023-06-01_00_00_00/users.bson")).unwrap(),
            b"JUNE"
        );
    }

    #[tokio::test]
    async fn the_one_where_match_without_latest_is_a_usage_error() {
        let store = InMemoryStore::new();
        let dump = TempDir::new().unwrap();
        let request = RestoreRequest {
            path: "vault".to_string(),
            pattern: Some("^alpha".to_string()),
            ..Default::default()
        };
        let err = restore(&store, &request, &runtime(&dump)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VaultError>(),
            Some(VaultError::Usage(_))
        ));
    }
}
