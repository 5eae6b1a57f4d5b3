use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::{ObjectDownload, ObjectStore, ObjectUpload};

/// 🗄️ Everything the store knows, behind one lock.
#[derive(Debug, Default)]
struct StoreState {
    buckets: BTreeSet<String>,
    objects: BTreeMap<(String, String), Vec<u8>>,
    /// 📜 keys in the order they were committed
    commit_log: Vec<String>,
    fail_open: Vec<String>,
    fail_commit: Vec<String>,
    fail_download: Vec<String>,
}

/// 📦 A bucket that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// Clone-able because tests need to peek inside after handing a reference to the
/// orchestrator. The `Arc` means every clone sees the same objects.
///
/// 🧨 `fail_open_matching`/`fail_commit_matching`/`fail_download_matching` take a substring;
/// any key containing it fails that operation. Every time, not once. Buckets hold grudges.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 🌱 Drop an object straight into the store, no upload ceremony.
    pub(crate) async fn seed(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        let mut state = self.state.lock().await;
        state.buckets.insert(bucket.to_string());
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), bytes);
    }

    pub(crate) async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .await
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub(crate) async fn commit_log(&self) -> Vec<String> {
        self.state.lock().await.commit_log.clone()
    }

    pub(crate) async fn fail_open_matching(&self, needle: &str) {
        self.state.lock().await.fail_open.push(needle.to_string());
    }

    pub(crate) async fn fail_commit_matching(&self, needle: &str) {
        self.state.lock().await.fail_commit.push(needle.to_string());
    }

    pub(crate) async fn fail_download_matching(&self, needle: &str) {
        self.state.lock().await.fail_download.push(needle.to_string());
    }
}

fn matches_any(needles: &[String], key: &str) -> bool {
    needles.iter().any(|needle| key.contains(needle.as_str()))
}

/// 📤 Bytes pile up in a Vec and only land in the store on commit.
#[derive(Debug)]
pub(crate) struct InMemoryUpload {
    state: Arc<Mutex<StoreState>>,
    bucket: String,
    key: String,
    buffer: Vec<u8>,
}

#[async_trait]
impl ObjectUpload for InMemoryUpload {
    async fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        if matches_any(&state.fail_commit, &self.key) {
            return Err(anyhow!("💀 injected commit failure for '{}'", self.key));
        }
        let bytes = std::mem::take(&mut self.buffer);
        state
            .objects
            .insert((self.bucket.clone(), self.key.clone()), bytes);
        state.commit_log.push(self.key.clone());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    type Upload = InMemoryUpload;

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        self.state.lock().await.buckets.insert(bucket.to_string());
        Ok(())
    }

    async fn stat_bucket(&self, bucket: &str) -> Result<()> {
        if self.state.lock().await.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(anyhow!("💀 bucket '{bucket}' not found"))
        }
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        if !state.buckets.contains(bucket) {
            return Err(anyhow!("💀 bucket '{bucket}' not found"));
        }
        Ok(state
            .objects
            .keys()
            .filter(|(b, key)| b == bucket && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn open_upload(&self, bucket: &str, key: &str) -> Result<InMemoryUpload> {
        let state = self.state.lock().await;
        if matches_any(&state.fail_open, key) {
            return Err(anyhow!("💀 injected open failure for '{key}'"));
        }
        Ok(InMemoryUpload {
            state: Arc::clone(&self.state),
            bucket: bucket.to_string(),
            key: key.to_string(),
            buffer: Vec::new(),
        })
    }

    async fn open_download(&self, bucket: &str, key: &str) -> Result<ObjectDownload> {
        let state = self.state.lock().await;
        if matches_any(&state.fail_download, key) {
            return Err(anyhow!("💀 injected download failure for '{key}'"));
        }
        let bytes = state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("💀 no object '{bucket}/{key}'"))?;
        Ok(ObjectDownload {
            content_length: bytes.len() as u64,
            reader: Box::new(std::io::Cursor::new(bytes)),
        })
    }
}
