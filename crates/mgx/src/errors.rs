//! 💀 errors.rs: the museum of things that went wrong, neatly labeled.
//!
//! 🧠 Knowledge graph:
//! - Backends speak `anyhow` (context chains, 3am-friendly messages).
//! - The transfer core speaks `VaultError`, because callers need to tell a
//!   "your buffer is too small, forever" apart from "the cursor hiccuped, try again".
//! - The continuation status is NOT in here. Running out of buffer is Tuesday, not a tragedy.
//!
//! 🦆 The duck reviewed every variant. The duck has no further questions.

use std::path::PathBuf;

use crate::streaming::ReadOutcome;

/// 📦 Type-erased backend error, so `anyhow::Error` can ride along as a `#[source]`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 🚨 Every way a backup or restore can fail, sorted by who to blame.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// 🚰 The source cursor failed mid-collection. Progress up to the last delivered
    /// document is kept; calling `read` again resumes from there.
    #[error(
        "💀 source iteration failed in '{}' after {} bytes this call; call read again to resume",
        .collection.as_deref().unwrap_or("<collection listing>"),
        .delivered.bytes_written
    )]
    SourceIteration {
        collection: Option<String>,
        /// 📦 what this call managed to put in the buffer before things went sideways
        delivered: ReadOutcome,
        #[source]
        source: BoxError,
    },

    /// 📏 A single document is bigger than the whole transfer buffer. Retrying with the
    /// same buffer is an infinite loop with extra steps.
    #[error(
        "💀 a document in '{collection}' is {document_size} bytes but the transfer buffer only holds {capacity}; raise transfer_buffer_bytes"
    )]
    CapacityTooSmall {
        collection: String,
        document_size: usize,
        capacity: usize,
    },

    #[error("💀 could not encode a document from '{collection}' as BSON")]
    DocumentEncoding {
        collection: String,
        #[source]
        source: bson::ser::Error,
    },

    #[error("💀 could not open upload for '{key}'")]
    SinkOpen {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("💀 could not write to upload '{key}'")]
    SinkWrite {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("💀 could not commit upload '{key}'; the backup set is incomplete")]
    SinkCommit {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("💀 could not list '{bucket}/{prefix}'")]
    StoreListing {
        bucket: String,
        prefix: String,
        #[source]
        source: BoxError,
    },

    #[error("💀 could not download '{key}'")]
    Download {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("💀 could not write restored file '{}'", .path.display())]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 🔍 We looked under the prefix. Nothing. Not even a stray `.bson`.
    #[error("💀 no back-up to restore under '{bucket}/{prefix}'")]
    BackupNotFound { bucket: String, prefix: String },

    /// 🙅 Caller asked for something that can't work. Caught before any I/O where possible.
    #[error("💀 {0}")]
    Usage(String),
}

impl VaultError {
    /// 🔁 Whether calling the same operation again might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceIteration { .. })
    }
}
