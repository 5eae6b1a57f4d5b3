//! 🔍 BackupLocator: "which of these four hundred snapshots is last night's?"
//!
//! Instance names are `{database}{YYYY-MM-DD_HH_MM_SS}`. Same database, fixed-width UTC
//! timestamp, so the lexicographic max is the newest. Directories that are not shaped like an
//! instance (`testdb/notes/`, `testdb/testdb-old/`) are ignored, or they would sort last and win.

use tracing::debug;

use crate::backends::ObjectStore;
use crate::common::{BackupInstance, BackupPath, child_directories, is_instance_name};
use crate::errors::VaultError;

/// 🎯 Resolve `bucket/…/database` to its most recent backup instance.
pub(crate) async fn locate_latest<St: ObjectStore>(
    store: &St,
    path: &BackupPath,
) -> Result<BackupInstance, VaultError> {
    if path.key_prefix.is_empty() {
        return Err(VaultError::Usage(format!(
            "'{}' is only a bucket; expected bucket[/uploadPath]/database",
            path.bucket
        )));
    }

    let keys = store
        .list_keys(&path.bucket, &path.key_prefix)
        .await
        .map_err(|err| VaultError::StoreListing {
            bucket: path.bucket.clone(),
            prefix: path.key_prefix.clone(),
            source: err.into(),
        })?;

    let database = path.last_segment();
    let (instances, strays): (Vec<String>, Vec<String>) = child_directories(&keys, &path.key_prefix)
        .into_iter()
        .partition(|name| is_instance_name(name, database));
    if !strays.is_empty() {
        debug!("🙈 skipping non-instance directories under {path}: {strays:?}");
    }
    debug!("🔍 {} instances under {path}: {instances:?}", instances.len());

    let name = instances
        .into_iter()
        .next_back()
        .ok_or_else(|| VaultError::BackupNotFound {
            bucket: path.bucket.clone(),
            prefix: path.key_prefix.clone(),
        })?;

    Ok(BackupInstance {
        bucket: path.bucket.clone(),
        prefix: format!("{}{}/", path.key_prefix, name),
        name,
    })
}
