//! 📤 The ChunkedUploadOrchestrator: cuts one byte stream into one object per collection.
//!
//! 🎬 INT. TRANSFER BUFFER: 10 MiB OF PURE POTENTIAL
//!
//! The reader fills the buffer. The orchestrator looks at the spans, slices the buffer at
//! the collection boundaries, and appends each slice to the object that owns it. When a span
//! says "drained", that object is committed and the orchestrator goes back to `Idle`.
//!
//! 🧠 Knowledge graph:
//! - `UploadPhase::Idle` → a span arrives → open upload → `Collecting(OpenObject)`
//! - `Collecting` + drained span → commit → `Idle`
//! - `EndOfStream` → commit whatever is open → `Finished`
//! - One object per collection, empty collections included (they get a zero-byte object).
//! - Sink failures are fatal. Already-committed objects stay where they are.

use tracing::{debug, info, warn};

use crate::backends::{DocumentSource, ObjectStore, ObjectUpload};
use crate::common::BackupTarget;
use crate::errors::VaultError;
use crate::progress::ProgressMetrics;
use crate::streaming::{CollectionSpan, ReadStatus, StreamingDocumentReader};

/// ✅ One object that made it into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedObject {
    pub collection: String,
    pub key: String,
    pub bytes: u64,
    pub documents: u64,
}

/// 🧾 What a finished backup left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub bucket: String,
    pub instance_name: String,
    pub instance_prefix: String,
    pub objects: Vec<CommittedObject>,
}

impl BackupReport {
    pub fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.bytes).sum()
    }

    pub fn total_documents(&self) -> u64 {
        self.objects.iter().map(|o| o.documents).sum()
    }
}

/// 📂 The object currently being written.
#[derive(Debug)]
struct OpenObject<U> {
    collection: String,
    key: String,
    upload: U,
    bytes: u64,
    documents: u64,
}

/// 🚦 Where the orchestrator is between spans.
#[derive(Debug)]
enum UploadPhase<U> {
    Idle,
    Collecting(OpenObject<U>),
    Finished,
}

pub(crate) struct ChunkedUploadOrchestrator<'s, St: ObjectStore> {
    store: &'s St,
    target: BackupTarget,
    transfer_buffer_bytes: usize,
    phase: UploadPhase<St::Upload>,
    committed: Vec<CommittedObject>,
    metrics: ProgressMetrics,
}

impl<'s, St: ObjectStore> ChunkedUploadOrchestrator<'s, St> {
    pub(crate) fn new(
        store: &'s St,
        target: BackupTarget,
        transfer_buffer_bytes: usize,
        metrics: ProgressMetrics,
    ) -> Self {
        Self {
            store,
            target,
            transfer_buffer_bytes,
            phase: UploadPhase::Idle,
            committed: Vec::new(),
            metrics,
        }
    }

    /// 🚀 Drain `reader` into the store. Returns once every collection has its object.
    pub(crate) async fn run<Src: DocumentSource>(
        mut self,
        reader: &mut StreamingDocumentReader<Src>,
    ) -> Result<BackupReport, VaultError> {
        let bucket = self.target.bucket.clone();
        self.store
            .ensure_bucket(&bucket)
            .await
            .map_err(|err| VaultError::SinkOpen {
                key: bucket.clone(),
                source: err.into(),
            })?;

        info!(
            "📤 backing up '{}' into {}/{} ({} byte transfer buffer)",
            self.target.database,
            bucket,
            self.target.instance_prefix(),
            self.transfer_buffer_bytes
        );

        let mut buffer = vec![0u8; self.transfer_buffer_bytes];
        loop {
            let outcome = match reader.read(&mut buffer).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        "💀 backup of '{}' stopped; reader checkpoint {}",
                        self.target.database,
                        reader.state().to_json()
                    );
                    return Err(err);
                }
            };

            let mut offset = 0;
            for span in &outcome.spans {
                let chunk = &buffer[offset..offset + span.bytes];
                offset += span.bytes;
                if let Err(err) = self.forward(span, chunk).await {
                    warn!(
                        "💀 backup of '{}' stopped at the sink; reader checkpoint {}",
                        self.target.database,
                        reader.state().to_json()
                    );
                    return Err(err);
                }
            }

            if outcome.status == ReadStatus::EndOfStream {
                return self.finish().await;
            }
        }
    }

    /// ➡️ Route one span's bytes to the object that owns them.
    async fn forward(&mut self, span: &CollectionSpan, chunk: &[u8]) -> Result<(), VaultError> {
        let owns_span =
            matches!(&self.phase, UploadPhase::Collecting(open) if open.collection == span.collection);
        if !owns_span {
            // -- spans only change collection after a drained span, so this is normally a no-op
            self.commit_open().await?;
            self.open(&span.collection).await?;
        }

        if let UploadPhase::Collecting(open) = &mut self.phase {
            if !chunk.is_empty() {
                open.upload
                    .append(chunk)
                    .await
                    .map_err(|err| VaultError::SinkWrite {
                        key: open.key.clone(),
                        source: err.into(),
                    })?;
            }
            open.bytes += chunk.len() as u64;
            open.documents += span.documents;
        }
        self.metrics.update(chunk.len() as u64, span.documents);

        if span.drained {
            self.commit_open().await?;
        }
        Ok(())
    }

    async fn open(&mut self, collection: &str) -> Result<(), VaultError> {
        let key = self.target.object_key(collection);
        debug!("📂 opening upload '{key}'");
        let upload = self
            .store
            .open_upload(&self.target.bucket, &key)
            .await
            .map_err(|err| VaultError::SinkOpen {
                key: key.clone(),
                source: err.into(),
            })?;
        self.phase = UploadPhase::Collecting(OpenObject {
            collection: collection.to_string(),
            key,
            upload,
            bytes: 0,
            documents: 0,
        });
        Ok(())
    }

    /// ✅ Commit the open object, if there is one, and go back to `Idle`.
    async fn commit_open(&mut self) -> Result<(), VaultError> {
        match std::mem::replace(&mut self.phase, UploadPhase::Idle) {
            UploadPhase::Collecting(mut open) => {
                open.upload
                    .commit()
                    .await
                    .map_err(|err| VaultError::SinkCommit {
                        key: open.key.clone(),
                        source: err.into(),
                    })?;
                info!(
                    "✅ committed '{}' ({} documents, {} bytes)",
                    open.key, open.documents, open.bytes
                );
                self.committed.push(CommittedObject {
                    collection: open.collection,
                    key: open.key,
                    bytes: open.bytes,
                    documents: open.documents,
                });
            }
            other => self.phase = other,
        }
        Ok(())
    }

    async fn finish(mut self) -> Result<BackupReport, VaultError> {
        self.commit_open().await?;
        self.phase = UploadPhase::Finished;
        self.metrics.finish();

        let report = BackupReport {
            bucket: self.target.bucket.clone(),
            instance_name: self.target.instance_name(),
            instance_prefix: self.target.instance_prefix(),
            objects: self.committed,
        };
        info!(
            "🏁 backup '{}' finished: {} objects, {} documents, {} bytes",
            report.instance_name,
            report.objects.len(),
            report.total_documents(),
            report.total_bytes()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::{InMemorySource, InMemoryStore};
    use crate::streaming::tests::{docs, encoded_len, split_bson};
    use chrono::{TimeZone, Utc};

    fn target() -> BackupTarget {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        BackupTarget::new("vault", "nightly", "shop", at)
    }

    fn shop() -> InMemorySource {
        InMemorySource::new()
            .with_collection("users", docs("u", 3))
            .with_collection("orders", docs("o", 5))
    }

    fn two_doc_buffer() -> usize {
        docs("o", 5).iter().map(encoded_len).max().unwrap() * 2
    }

    async fn back_up(
        store: &InMemoryStore,
        source: InMemorySource,
        buffer: usize,
    ) -> Result<BackupReport, VaultError> {
        let mut reader = StreamingDocumentReader::new(source);
        ChunkedUploadOrchestrator::new(store, target(), buffer, ProgressMetrics::hidden("shop", 0))
            .run(&mut reader)
            .await
    }

    #[tokio::test]
    async fn the_one_where_users_and_orders_each_get_their_own_object() {
        let store = InMemoryStore::new();
        let report = back_up(&store, shop(), two_doc_buffer()).await.unwrap();

        let users_key = "nightly/shop/shop2024-05-01_12_00_00/users.bson";
        let orders_key = "nightly/shop/shop2024-05-01_12_00_00/orders.bson";
        assert_eq!(store.commit_log().await, vec![users_key, orders_key]);

        let users = store.object("vault", users_key).await.unwrap();
        let orders = store.object("vault", orders_key).await.unwrap();
        assert_eq!(split_bson(&users), docs("u", 3));
        assert_eq!(split_bson(&orders), docs("o", 5));

        assert_eq!(report.instance_name, "shop2024-05-01_12_00_00");
        assert_eq!(report.objects.len(), 2);
        assert_eq!(report.objects[0].documents, 3);
        assert_eq!(report.objects[1].documents, 5);
        assert_eq!(report.total_bytes(), (users.len() + orders.len()) as u64);
    }

    #[tokio::test]
    async fn the_one_where_buffer_size_changes_nothing_but_the_call_count() {
        let small = InMemoryStore::new();
        let big = InMemoryStore::new();
        back_up(&small, shop(), two_doc_buffer() / 2).await.unwrap();
        back_up(&big, shop(), 1 << 20).await.unwrap();

        for collection in ["users", "orders"] {
            let key = target().object_key(collection);
            assert_eq!(
                small.object("vault", &key).await,
                big.object("vault", &key).await
            );
        }
    }

    #[tokio::test]
    async fn the_one_where_an_empty_collection_still_gets_an_object() {
        let store = InMemoryStore::new();
        let source = InMemorySource::new()
            .with_collection("ghosts", vec![])
            .with_collection("users", docs("u", 2));
        let report = back_up(&store, source, 4096).await.unwrap();

        let ghosts = store
            .object("vault", &target().object_key("ghosts"))
            .await
            .unwrap();
        assert!(ghosts.is_empty());
        assert_eq!(report.objects.len(), 2);
        assert_eq!(report.objects[0].collection, "ghosts");
        assert_eq!(report.objects[0].documents, 0);
    }

    #[tokio::test]
    async fn the_one_where_a_document_too_big_for_the_buffer_is_fatal() {
        let store = InMemoryStore::new();
        let err = back_up(&store, shop(), 8).await.unwrap_err();
        assert!(matches!(err, VaultError::CapacityTooSmall { .. }));
        assert!(store.commit_log().await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_the_sink_refuses_to_open_orders() {
        let store = InMemoryStore::new();
        store.fail_open_matching("orders").await;
        let err = back_up(&store, shop(), two_doc_buffer()).await.unwrap_err();

        match err {
            VaultError::SinkOpen { key, .. } => assert!(key.ends_with("orders.bson")),
            other => panic!("💀 expected SinkOpen, got {other:?}"),
        }
        // 🧪 users was already committed and stays committed
        assert_eq!(
            store.commit_log().await,
            vec![target().object_key("users")]
        );
    }

    #[tokio::test]
    async fn the_one_where_the_commit_bounces() {
        let store = InMemoryStore::new();
        store.fail_commit_matching("users").await;
        let err = back_up(&store, shop(), two_doc_buffer()).await.unwrap_err();
        assert!(matches!(err, VaultError::SinkCommit { ref key, .. } if key.ends_with("users.bson")));
        assert!(store.commit_log().await.is_empty());
    }
}
