//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Sources pour documents out of a database, one cursor per collection.
//! 🪣 Stores hold the objects: list them, upload them, download them.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → enum dispatcher (`StoreBackend`, `UploadBackend`)
//! - `DocumentSource` + `DocumentCursor`: the database side. Cursors are restartable via `skip`.
//! - `ObjectStore` + `ObjectUpload`: the bucket side. Uploads are append-then-commit.
//! - The streaming core (`crate::streaming`, `crate::supervisors`) is generic over these traits,
//!   so tests plug in the in-memory doubles and production plugs in Mongo + S3/Directory.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use anyhow::Result;
use async_trait::async_trait;
use bson::Document;
use tokio::io::AsyncRead;

pub(crate) mod directory;
#[cfg(test)]
pub(crate) mod in_mem;
pub(crate) mod mongo;
pub(crate) mod s3;

// 🎯 Re-export backend-specific configs so callers can do `backends::S3StoreConfig`
// instead of spelunking into `backends::s3::S3StoreConfig`.
pub use directory::DirectoryStoreConfig;
pub use mongo::MongoSourceConfig;
pub use s3::S3StoreConfig;

// ===== Source side =====

/// 📜 A forward-only walk over one collection's documents.
///
/// `Ok(None)` = the collection is drained. `Err` = the walk broke; whoever opened the
/// cursor can reopen it with the same `skip` and pick up where the last good document left off.
#[async_trait]
pub(crate) trait DocumentCursor: Send {
    async fn next_document(&mut self) -> Result<Option<Document>>;
}

/// 🚰 A database that can name its collections and open a cursor over each one.
///
/// # Contract 📜
/// - `list_collection_names` returns the same order every time it is asked. The reader
///   treats that order as the backup order.
/// - `open_cursor(name, skip)` yields the collection in a stable order, starting after
///   the first `skip` documents. Same `skip`, same remaining sequence (no concurrent writers assumed).
#[async_trait]
pub(crate) trait DocumentSource: std::fmt::Debug + Send {
    type Cursor: DocumentCursor;

    async fn list_collection_names(&mut self) -> Result<Vec<String>>;

    async fn open_cursor(&mut self, collection: &str, skip: u64) -> Result<Self::Cursor>;
}

// ===== Store side =====

/// 🧠 Boxed async reader for downloads. Struct fields can't hold `impl AsyncRead`,
/// so we pay one vtable hop per read. The network round trip laughs at this cost.
pub(crate) type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// 📥 An object being downloaded: its size (0 = unknown) and the byte stream.
pub(crate) struct ObjectDownload {
    pub(crate) content_length: u64,
    pub(crate) reader: ObjectReader,
}

impl std::fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🐛 the reader is a trait object with no Debug. Nobody wanted to see it anyway.
        f.debug_struct("ObjectDownload")
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// 📤 One object on its way up. Bytes go in with `append`, the object becomes visible on `commit`.
///
/// Nothing is visible in the store until `commit` returns `Ok`. After that the handle is spent.
#[async_trait]
pub(crate) trait ObjectUpload: std::fmt::Debug + Send {
    async fn append(&mut self, bytes: &[u8]) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
}

/// 🪣 An object store: buckets full of keys full of bytes.
///
/// `list_keys` is recursive: every key under `prefix`, no delimiters, no "directories".
/// Directory-ish views are derived by the callers from the key paths.
#[async_trait]
pub(crate) trait ObjectStore: std::fmt::Debug + Send + Sync {
    type Upload: ObjectUpload;

    /// 🏗️ Make sure the bucket exists, creating it if needed.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    /// 🔍 Fail if the bucket does not exist. Creates nothing.
    async fn stat_bucket(&self, bucket: &str) -> Result<()>;

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    async fn open_upload(&self, bucket: &str, key: &str) -> Result<Self::Upload>;

    async fn open_download(&self, bucket: &str, key: &str) -> Result<ObjectDownload>;
}

/// 🎭 The many faces of a store. The supervisor holds one of these and never asks which.
#[derive(Debug)]
pub(crate) enum StoreBackend {
    S3(s3::S3Store),
    Directory(directory::DirectoryStore),
}

/// 🎭 The upload handle that matches whichever `StoreBackend` opened it.
#[derive(Debug)]
pub(crate) enum UploadBackend {
    S3(s3::S3Upload),
    Directory(directory::DirectoryUpload),
}

#[async_trait]
impl ObjectUpload for UploadBackend {
    async fn append(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            UploadBackend::S3(u) => u.append(bytes).await,
            UploadBackend::Directory(u) => u.append(bytes).await,
        }
    }

    async fn commit(&mut self) -> Result<()> {
        match self {
            UploadBackend::S3(u) => u.commit().await,
            UploadBackend::Directory(u) => u.commit().await,
        }
    }
}

#[async_trait]
impl ObjectStore for StoreBackend {
    type Upload = UploadBackend;

    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        match self {
            StoreBackend::S3(s) => s.ensure_bucket(bucket).await,
            StoreBackend::Directory(d) => d.ensure_bucket(bucket).await,
        }
    }

    async fn stat_bucket(&self, bucket: &str) -> Result<()> {
        match self {
            StoreBackend::S3(s) => s.stat_bucket(bucket).await,
            StoreBackend::Directory(d) => d.stat_bucket(bucket).await,
        }
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        match self {
            StoreBackend::S3(s) => s.list_keys(bucket, prefix).await,
            StoreBackend::Directory(d) => d.list_keys(bucket, prefix).await,
        }
    }

    async fn open_upload(&self, bucket: &str, key: &str) -> Result<UploadBackend> {
        match self {
            StoreBackend::S3(s) => Ok(UploadBackend::S3(s.open_upload(bucket, key).await?)),
            StoreBackend::Directory(d) => Ok(UploadBackend::Directory(
                d.open_upload(bucket, key).await?,
            )),
        }
    }

    async fn open_download(&self, bucket: &str, key: &str) -> Result<ObjectDownload> {
        match self {
            StoreBackend::S3(s) => s.open_download(bucket, key).await,
            StoreBackend::Directory(d) => d.open_download(bucket, key).await,
        }
    }
}
