//! 📦 Common data structures: the building blocks of mongostash.
//!
//! 🎬 COLD OPEN. INT. OBJECT STORE, 3:47 AM
//!
//! Thousands of keys, all looking the same. `prod/prod2024-...`, `prod/prod2024-...`.
//! Somewhere among them is last night's backup. The only thing standing between the
//! on-call engineer and a good night's sleep is a timestamp that sorts like it means it.
//!
//! 🧠 Knowledge graph:
//! - Object key: `{upload_prefix}{database}/{database}{timestamp}/{collection}.bson`
//! - Timestamp: `YYYY-MM-DD_HH_MM_SS`, UTC, fixed width, so string order == time order.
//! - `BackupPath`: what a human types (`bucket/uploads/db`), split into bucket + key prefix.
//! - `BackupInstance`: one resolved snapshot (`bucket`, `uploads/db/db2024-01-01_00_00_00/`).

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::VaultError;

/// 📄 Every collection object ends in this. BSON in, BSON out.
pub const BACKUP_EXTENSION: &str = "bson";

/// 🕰️ Fixed width, zero padded, most significant first. Sorts as text, sorts as time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// 🕰️ Render an instant in the backup-key timestamp format.
pub fn backup_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// 🔧 Upload prefixes come from humans, so: empty stays empty, `/` means root,
/// anything else gets exactly one trailing slash.
pub fn normalize_upload_prefix(raw: &str) -> String {
    match raw {
        "" | "/" => String::new(),
        p if p.ends_with('/') => p.to_string(),
        p => format!("{p}/"),
    }
}

/// 🏷️ Last path segment of a key. `a/b/users.bson` → `users.bson`.
pub(crate) fn key_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// 📁 Second-to-last segment of a key, i.e. the "directory" holding it.
/// `a/db2024-01-01_00_00_00/users.bson` → `db2024-01-01_00_00_00`. `None` for a top-level key.
pub(crate) fn key_parent_name(key: &str) -> Option<&str> {
    key.rsplit('/').nth(1).filter(|parent| !parent.is_empty())
}

/// 🕰️ Is `name` shaped like `{database}{YYYY-MM-DD_HH_MM_SS}`?
pub(crate) fn is_instance_name(name: &str, database: &str) -> bool {
    name.strip_prefix(database)
        .is_some_and(|stamp| NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok())
}

/// 📂 Distinct first-level "directories" under `prefix`, sorted.
///
/// Keys under `prefix` that have no further `/` are plain objects, not directories, and are skipped.
pub(crate) fn child_directories<'a, I>(keys: I, prefix: &str) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    keys.into_iter()
        .filter_map(|key| key.strip_prefix(prefix))
        .filter_map(|rest| rest.split_once('/'))
        .map(|(dir, _)| dir)
        .filter(|dir| !dir.is_empty())
        .map(str::to_string)
        .collect()
}

/// 🎯 Where one backup run writes its objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTarget {
    pub bucket: String,
    /// Already normalized, see [`normalize_upload_prefix`].
    pub upload_prefix: String,
    pub database: String,
    pub timestamp: String,
}

impl BackupTarget {
    pub fn new(bucket: &str, upload_prefix: &str, database: &str, at: DateTime<Utc>) -> Self {
        Self {
            bucket: bucket.to_string(),
            upload_prefix: normalize_upload_prefix(upload_prefix),
            database: database.to_string(),
            timestamp: backup_timestamp(at),
        }
    }

    /// 🏷️ `{database}{timestamp}`, the name of this backup instance.
    pub fn instance_name(&self) -> String {
        format!("{}{}", self.database, self.timestamp)
    }

    /// 📂 `{upload_prefix}{database}/{instance}/`
    pub fn instance_prefix(&self) -> String {
        format!(
            "{}{}/{}/",
            self.upload_prefix,
            self.database,
            self.instance_name()
        )
    }

    /// 🗝️ The object key for one collection of this backup.
    pub fn object_key(&self, collection: &str) -> String {
        format!(
            "{}{}.{}",
            self.instance_prefix(),
            collection,
            BACKUP_EXTENSION
        )
    }
}

/// 🧭 A user-supplied `bucket[/key/prefix...]` path.
///
/// `key_prefix` is empty (bucket root) or ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPath {
    pub bucket: String,
    pub key_prefix: String,
}

impl BackupPath {
    /// 🔍 Parse `bucket/a/b` (trailing slash optional). Empty paths and empty segments are usage errors.
    pub fn parse(raw: &str) -> Result<Self, VaultError> {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(VaultError::Usage(
                "back-up path is empty; expected bucket[/uploadPath]/database".to_string(),
            ));
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(VaultError::Usage(format!(
                "back-up path '{raw}' has an empty segment"
            )));
        }
        let key_prefix = segments[1..]
            .iter()
            .map(|s| format!("{s}/"))
            .collect::<String>();
        Ok(Self {
            bucket: segments[0].to_string(),
            key_prefix,
        })
    }

    /// 🔢 Number of `/`-separated segments, bucket included.
    pub fn depth(&self) -> usize {
        1 + self.key_prefix.matches('/').count()
    }

    /// 🏷️ The last segment: the bucket itself when there is no key prefix.
    pub fn last_segment(&self) -> &str {
        self.key_prefix
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(self.bucket.as_str())
    }

    /// 📂 One level deeper: `bucket/a/` + `b` → `bucket/a/b/`.
    pub fn child(&self, name: &str) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key_prefix: format!("{}{}/", self.key_prefix, name),
        }
    }
}

impl fmt::Display for BackupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.bucket,
            self.key_prefix.trim_end_matches('/')
        )
    }
}

/// 📸 One resolved backup snapshot: every object under `prefix` belongs to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInstance {
    pub bucket: String,
    /// Ends with `/`.
    pub prefix: String,
    /// `{database}{timestamp}` when resolved by the locator, otherwise the last path segment.
    pub name: String,
}

impl BackupInstance {
    /// 🎯 Treat a path as an already-resolved instance (the non-`latest` restore mode).
    pub fn from_path(path: &BackupPath) -> Result<Self, VaultError> {
        if path.key_prefix.is_empty() {
            return Err(VaultError::Usage(format!(
                "'{}' names a bucket, not a back-up; expected bucket[/uploadPath]/database/databaseYYYY-MM-DD_HH_MM_SS",
                path.bucket
            )));
        }
        Ok(Self {
            bucket: path.bucket.clone(),
            prefix: path.key_prefix.clone(),
            name: path.last_segment().to_string(),
        })
    }
}
