//! 📥 RestoreOrchestrator: pulls every object of one backup instance down to local disk.
//!
//! Layout on disk: `{dump_dir}/{parent directory of the key}/{file name}`. The local directory
//! comes from each key, not from the request, so a prefix that spans several instances lands
//! in one directory per instance. Folder-marker keys (ending in `/`) carry no data and are skipped.
//! Files already written stay written if a later one fails. There is no rollback, and there is
//! no partial-file cleanup.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::backends::ObjectStore;
use crate::common::{BackupInstance, key_file_name, key_parent_name};
use crate::errors::VaultError;
use crate::progress::{ProgressMetrics, ProgressReader};

// -- 📏 chunk size for the download pump
const PUMP_CHUNK_BYTES: usize = 64 * 1024;

/// 📄 One object that landed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredFile {
    pub key: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// 🧾 Everything one restore wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub instance: BackupInstance,
    /// Root every file was written under; each instance gets its own subdirectory.
    pub dump_dir: PathBuf,
    pub files: Vec<RestoredFile>,
}

impl RestoreReport {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }
}

#[derive(Debug)]
pub(crate) struct RestoreOrchestrator<'s, St: ObjectStore> {
    store: &'s St,
    dump_dir: PathBuf,
    show_progress: bool,
}

impl<'s, St: ObjectStore> RestoreOrchestrator<'s, St> {
    pub(crate) fn new(store: &'s St, dump_dir: impl Into<PathBuf>, show_progress: bool) -> Self {
        Self {
            store,
            dump_dir: dump_dir.into(),
            show_progress,
        }
    }

    pub(crate) fn store(&self) -> &'s St {
        self.store
    }

    /// 🚀 Download every object under `instance.prefix`, in key order.
    pub(crate) async fn restore(
        &self,
        instance: &BackupInstance,
    ) -> Result<RestoreReport, VaultError> {
        let mut keys: Vec<String> = self
            .store
            .list_keys(&instance.bucket, &instance.prefix)
            .await
            .map_err(|err| VaultError::StoreListing {
                bucket: instance.bucket.clone(),
                prefix: instance.prefix.clone(),
                source: err.into(),
            })?
            .into_iter()
            // -- 📁 zero-byte folder markers have no file name to land on
            .filter(|key| !key.ends_with('/'))
            .collect();
        if keys.is_empty() {
            return Err(VaultError::BackupNotFound {
                bucket: instance.bucket.clone(),
                prefix: instance.prefix.clone(),
            });
        }
        keys.sort();

        info!(
            "📥 restoring {}/{} ({} objects) into {}",
            instance.bucket,
            instance.prefix,
            keys.len(),
            self.dump_dir.display()
        );

        let mut files = Vec::with_capacity(keys.len());
        for key in keys {
            let directory = self
                .dump_dir
                .join(key_parent_name(&key).unwrap_or(instance.name.as_str()));
            fs::create_dir_all(&directory)
                .await
                .map_err(|source| VaultError::LocalWrite {
                    path: directory.clone(),
                    source,
                })?;
            let path = directory.join(key_file_name(&key));
            let bytes = self.download(&instance.bucket, &key, &path).await?;
            debug!("📄 {key} → {} ({bytes} bytes)", path.display());
            files.push(RestoredFile { key, path, bytes });
        }

        let report = RestoreReport {
            instance: instance.clone(),
            dump_dir: self.dump_dir.clone(),
            files,
        };
        info!(
            "✅ restored '{}': {} files, {} bytes",
            instance.name,
            report.files.len(),
            report.total_bytes()
        );
        Ok(report)
    }

    /// 🚰 Stream one object into one local file through the progress proxy.
    async fn download(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, VaultError> {
        let download_error = |err: anyhow::Error| VaultError::Download {
            key: key.to_string(),
            source: err.into(),
        };
        let local_error = |source: std::io::Error| VaultError::LocalWrite {
            path: path.to_path_buf(),
            source,
        };

        let download = self
            .store
            .open_download(bucket, key)
            .await
            .map_err(download_error)?;

        let label = key_file_name(key).to_string();
        let metrics = if self.show_progress {
            ProgressMetrics::new(label, download.content_length)
        } else {
            ProgressMetrics::hidden(label, download.content_length)
        };
        let mut reader = ProgressReader::new(download.reader, metrics);

        let mut file = fs::File::create(path).await.map_err(local_error)?;
        let mut chunk = vec![0u8; PUMP_CHUNK_BYTES];
        loop {
            let read = reader
                .read(&mut chunk)
                .await
                .map_err(|err| download_error(err.into()))?;
            if read == 0 {
                break;
            }
            file.write_all(&chunk[..read]).await.map_err(local_error)?;
        }
        file.flush().await.map_err(local_error)?;

        Ok(reader.finish().total_bytes())
    }
}
