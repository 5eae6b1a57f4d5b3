use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::{self, File};
use tokio::io::{self, AsyncWriteExt};
use tracing::{debug, trace};

use crate::backends::{ObjectDownload, ObjectStore, ObjectUpload};

// -- 🚧 in-flight uploads wear this suffix until commit renames them
const PARTIAL_SUFFIX: &str = ".partial";

/// 🔧 Where the "buckets" live.
#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryStoreConfig {
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub(crate) struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub(crate) fn new(config: DirectoryStoreConfig) -> Self {
        Self { root: config.root }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
            bail!("💀 '{bucket}' is not a usable bucket name for a directory store");
        }
        Ok(self.root.join(bucket))
    }

    /// 🗺️ Key → file path, refusing anything that would climb out of the bucket.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            bail!("💀 key '{key}' does not stay inside bucket '{bucket}'");
        }
        Ok(self.bucket_dir(bucket)?.join(relative))
    }
}

/// 🚶 Every file under `dir`, as `/`-joined paths relative to `base`.
fn walk_keys(base: &Path, dir: &Path, keys: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_keys(base, &path, keys)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            keys.push(key);
        }
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    type Upload = DirectoryUpload;

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        let dir = self.bucket_dir(bucket)?;
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("💀 could not create bucket directory '{}'", dir.display()))
    }

    async fn stat_bucket(&self, bucket: &str) -> Result<()> {
        let dir = self.bucket_dir(bucket)?;
        let metadata = fs::metadata(&dir)
            .await
            .with_context(|| format!("💀 bucket directory '{}' not found", dir.display()))?;
        if !metadata.is_dir() {
            bail!("💀 '{}' exists but is not a directory", dir.display());
        }
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.stat_bucket(bucket).await?;
        let dir = self.bucket_dir(bucket)?;
        let prefix = prefix.to_string();

        // -- 🧵 std::fs recursion is blocking; keep it off the async workers
        let mut keys = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<String>> {
            let mut keys = Vec::new();
            walk_keys(&dir, &dir, &mut keys)?;
            Ok(keys)
        })
        .await
        .context("💀 directory listing task panicked")?
        .with_context(|| format!("💀 could not walk bucket '{bucket}'"))?;

        keys.retain(|key| key.starts_with(&prefix) && !key.ends_with(PARTIAL_SUFFIX));
        keys.sort();
        trace!("📋 {bucket}/{prefix}: {} keys", keys.len());
        Ok(keys)
    }

    async fn open_upload(&self, bucket: &str, key: &str) -> Result<DirectoryUpload> {
        let final_path = self.object_path(bucket, key)?;
        let parent = final_path
            .parent()
            .ok_or_else(|| anyhow!("💀 key '{key}' has no parent directory"))?;
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("💀 could not create '{}'", parent.display()))?;

        let mut partial = final_path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial_path = PathBuf::from(partial);
        let file = File::create(&partial_path)
            .await
            .with_context(|| format!("💀 could not create '{}'", partial_path.display()))?;
        debug!("📂 writing '{}'", partial_path.display());

        Ok(DirectoryUpload {
            writer: io::BufWriter::new(file),
            partial_path,
            final_path,
        })
    }

    async fn open_download(&self, bucket: &str, key: &str) -> Result<ObjectDownload> {
        let path = self.object_path(bucket, key)?;
        let file = File::open(&path)
            .await
            .with_context(|| format!("💀 could not open '{}'", path.display()))?;
        let content_length = file.metadata().await.map(|m| m.len()).unwrap_or(0);
        Ok(ObjectDownload {
            content_length,
            reader: Box::new(io::BufReader::new(file)),
        })
    }
}

/// 📤 Writes to `{key}.partial`; `commit` flushes and renames it to `{key}`.
#[derive(Debug)]
pub(crate) struct DirectoryUpload {
    writer: io::BufWriter<File>,
    partial_path: PathBuf,
    final_path: PathBuf,
}

#[async_trait]
impl ObjectUpload for DirectoryUpload {
    async fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .await
            .with_context(|| format!("💀 write to '{}' failed", self.partial_path.display()))
    }

    async fn commit(&mut self) -> Result<()> {
        self.writer
            .flush()
            .await
            .with_context(|| format!("💀 flush of '{}' failed", self.partial_path.display()))?;
        self.writer.get_ref().sync_all().await.with_context(|| {
            format!("💀 fsync of '{}' failed", self.partial_path.display())
        })?;
        fs::rename(&self.partial_path, &self.final_path)
            .await
            .with_context(|| {
                format!(
                    "💀 could not move '{}' into place",
                    self.final_path.display()
                )
            })
    }
}
