//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every on-call engineer, 3am) 🦆
//!
//! 🧠 Knowledge graph:
//! - `MGX_*` environment variables are the base layer; a TOML file, when given, merges on top.
//! - Backend enums are externally tagged: `[source_config.Mongo]`, `[store_config.S3]`,
//!   `[store_config.Directory]`. Each backend owns its own config struct.
//! - `source_config` and `backup` are only needed by `store`; `restore` runs without them.
//! - `runtime` holds the knobs, every one of them with a default.
//!
//! ```toml
//! [source_config.Mongo]
//! hostname = "localhost"
//! database = "shop"
//!
//! [store_config.S3]
//! region = "us-east-1"
//!
//! [backup]
//! bucket = "vault"
//! upload_path = "nightly"
//!
//! [runtime]
//! transfer_buffer_bytes = 10485760
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{DirectoryStoreConfig, MongoSourceConfig, S3StoreConfig};
use crate::supervisors::ErrorPolicy;

/// 📦 Everything the app needs to know about itself.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🍃 Where documents come from. Required for `store`.
    #[serde(default)]
    pub source_config: Option<SourceConfig>,
    /// 🪣 Where backups go and come back from.
    pub store_config: StoreConfig,
    /// 🎯 Destination of `store`. Required for `store`.
    #[serde(default)]
    pub backup: Option<BackupConfig>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🚰 The database side.
#[derive(Debug, Deserialize, Clone)]
pub enum SourceConfig {
    Mongo(MongoSourceConfig),
}

/// 🪣 The object store side.
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    S3(S3StoreConfig),
    Directory(DirectoryStoreConfig),
}

/// 🎯 Where a backup lands: `{bucket}/{upload_path}/{database}/{database}{timestamp}/`.
#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    pub bucket: String,
    /// Empty and `/` both mean "bucket root".
    #[serde(default)]
    pub upload_path: String,
}

/// ⚙️ Knobs that shape a run but not its destination.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 📏 Transfer buffer size. Also the largest single document a backup can carry.
    #[serde(default = "default_transfer_buffer_bytes")]
    pub transfer_buffer_bytes: usize,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
    /// 📁 Restores land in `{dump_dir}/{instance}/`.
    #[serde(default = "default_dump_dir")]
    pub dump_dir: PathBuf,
    #[serde(default)]
    pub match_error_policy: ErrorPolicy,
}

// -- 📏 10 MiB: fits any document MongoDB will store (16 MiB limit) that anyone sane stores
fn default_transfer_buffer_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_show_progress() -> bool {
    true
}

fn default_dump_dir() -> PathBuf {
    PathBuf::from("dump")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            transfer_buffer_bytes: default_transfer_buffer_bytes(),
            show_progress: default_show_progress(),
            dump_dir: default_dump_dir(),
            match_error_policy: ErrorPolicy::default(),
        }
    }
}

/// 🚀 Load the config: `MGX_*` env vars, plus the TOML file when one is given. TOML wins on conflicts.
///
/// Nested keys in env vars use a double underscore: `MGX_RUNTIME__DUMP_DIR=/srv/dump`.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("MGX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (MGX_*). \
             The file exists in our hearts, but apparently not in a shape serde likes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (MGX_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_test_config(contents: &str) -> NamedTempFile {
        // 🧪 Figment wants TOML from disk, like it's method acting.
        let mut file = NamedTempFile::new().expect("💀 temp file refused to exist");
        file.write_all(contents.as_bytes())
            .expect("💀 the filesystem said 'new phone who dis'");
        file
    }

    #[test]
    fn the_one_where_a_full_backup_config_parses() {
        let file = write_test_config(
            r#"
            [source_config.Mongo]
            hostname = "db.internal"
            username = "backup"
            password = "hunter2"
            database = "shop"

            [store_config.S3]
            region = "eu-central-1"
            endpoint = "http://localhost:9000"
            force_path_style = true

            [backup]
            bucket = "vault"
            upload_path = "nightly"

            [runtime]
            transfer_buffer_bytes = 4096
            show_progress = false
            match_error_policy = "continue_on_error"
            "#,
        );

        let app_config = load_config(Some(file.path()))
            .expect("💀 A complete config should parse. The schema drift goblin does not get this win.");

        match app_config.source_config {
            Some(SourceConfig::Mongo(mongo)) => {
                assert_eq!(mongo.hostname, "db.internal");
                assert_eq!(mongo.port, 27017);
                assert_eq!(mongo.database, "shop");
            }
            honestly_who_knows => panic!("💀 expected a Mongo source, got {honestly_who_knows:?}"),
        }
        match app_config.store_config {
            StoreConfig::S3(s3) => {
                assert_eq!(s3.region, "eu-central-1");
                assert!(s3.force_path_style);
            }
            other => panic!("💀 expected an S3 store, got {other:?}"),
        }
        let backup = app_config.backup.unwrap();
        assert_eq!(backup.bucket, "vault");
        assert_eq!(backup.upload_path, "nightly");
        assert_eq!(app_config.runtime.transfer_buffer_bytes, 4096);
        assert!(!app_config.runtime.show_progress);
        assert_eq!(
            app_config.runtime.match_error_policy,
            ErrorPolicy::ContinueOnError
        );
    }

    #[test]
    fn the_one_where_runtime_defaults_show_up_uninvited_but_helpful() {
        let file = write_test_config(
            r#"
            [store_config.Directory]
            root = "/srv/backups"
            "#,
        );

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(file.path()))
            .extract()
            .expect("💀 Default runtime config should exist. Serde left us on read otherwise.");

        assert!(app_config.source_config.is_none());
        assert!(app_config.backup.is_none());
        assert_eq!(app_config.runtime.transfer_buffer_bytes, 10 * 1024 * 1024);
        assert!(app_config.runtime.show_progress);
        assert_eq!(app_config.runtime.dump_dir, PathBuf::from("dump"));
        assert_eq!(
            app_config.runtime.match_error_policy,
            ErrorPolicy::AbortOnFirstError
        );
        match app_config.store_config {
            StoreConfig::Directory(dir) => assert_eq!(dir.root, PathBuf::from("/srv/backups")),
            other => panic!("💀 expected a Directory store, got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_a_store_is_not_optional() {
        let file = write_test_config(
            r#"
            [backup]
            bucket = "vault"
            "#,
        );
        let parsed: Result<AppConfig, _> = Figment::new().merge(Toml::file(file.path())).extract();
        assert!(parsed.is_err());
    }
}
