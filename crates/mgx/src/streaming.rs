//! 🎬 *[a buffer sits empty. a cursor waits. somewhere, forty million documents hold their breath.]*
//!
//! 🚰 The StreamingDocumentReader: turns a whole database into one byte stream,
//! one bounded buffer at a time, without ever holding more than a buffer's worth.
//!
//! 🧠 Knowledge graph:
//! - State: `StreamingReadState { pending_collections, document_offset }`. Explicit,
//!   serde-serializable, owned by exactly one reader. No globals, no "current collection"
//!   floating around the process.
//! - Each `read(buf)` fills `buf` with whole BSON documents. A document is never split
//!   across two calls. Documents are self-framing (first 4 bytes = length), so the
//!   stream needs no delimiters.
//! - `ReadOutcome.spans` says which collection owns which run of bytes, so the upload
//!   side can cut objects at exactly the right byte.
//! - `Continuation` = "buffer full, call again". NOT an error. `EndOfStream` = done.
//! - Rule of the house: a collection leaves `pending_collections` only once drained.
//!
//! ```text
//! pending: [users, orders]  offset: 0
//!   read → [u0 u1]            Continuation   (users, 2 docs, not drained)
//!   read → [u2] [o0]          Continuation   (users drained) (orders, 1 doc)
//!   ...
//!   read → [o4]               EndOfStream    (orders drained)
//! ```
//!
//! 🦆 The duck has read every document. The duck will not be taking questions.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backends::{DocumentCursor, DocumentSource};
use crate::errors::VaultError;

/// 📍 Where the reader is in the database. Small, explicit, and JSON-able.
///
/// `pending_collections` is `None` until the first `read` lists the collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingReadState {
    pending_collections: Option<VecDeque<String>>,
    document_offset: u64,
}

impl StreamingReadState {
    /// 🎯 Start from a known collection list instead of asking the source.
    pub fn with_collections<I, T>(collections: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            pending_collections: Some(collections.into_iter().map(Into::into).collect()),
            document_offset: 0,
        }
    }

    pub fn pending_collections(&self) -> Option<&VecDeque<String>> {
        self.pending_collections.as_ref()
    }

    /// 🔢 Documents already delivered from the head collection.
    pub fn document_offset(&self) -> u64 {
        self.document_offset
    }

    pub fn current_collection(&self) -> Option<&str> {
        self.pending_collections
            .as_ref()
            .and_then(|pending| pending.front())
            .map(String::as_str)
    }

    pub fn is_finished(&self) -> bool {
        self.pending_collections
            .as_ref()
            .is_some_and(VecDeque::is_empty)
    }

    /// 🧾 Checkpoint as JSON. Handy in logs when a run dies halfway.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("<unprintable state>"))
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    fn delivered_one(&mut self) {
        self.document_offset += 1;
    }

    /// 🏁 Head collection is drained: pop it and reset the offset in the same breath.
    fn drain_head(&mut self) {
        if let Some(pending) = self.pending_collections.as_mut() {
            pending.pop_front();
        }
        self.document_offset = 0;
    }
}

/// 🚦 What the caller should do next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadStatus {
    /// Buffer is full for now. Call again. Nothing is wrong.
    #[default]
    Continuation,
    /// Every collection is drained.
    EndOfStream,
}

/// 📏 A run of bytes in the buffer that belongs to one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpan {
    pub collection: String,
    pub bytes: usize,
    pub documents: u64,
    /// The collection's last document is in this span (or it had none at all).
    pub drained: bool,
}

/// 📦 Result of one `read`: bytes written at the front of the buffer, who owns them, what's next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    pub bytes_written: usize,
    pub spans: Vec<CollectionSpan>,
    pub status: ReadStatus,
}

impl ReadOutcome {
    pub fn documents(&self) -> u64 {
        self.spans.iter().map(|span| span.documents).sum()
    }

    fn push_span(&mut self, span: CollectionSpan) {
        // -- 🧹 a zero-byte span that isn't a drain tells the caller nothing
        if span.bytes > 0 || span.drained {
            self.spans.push(span);
        }
    }
}

/// 🅿️ A cursor left open between calls, plus the one document that didn't fit.
struct ParkedCursor<C> {
    collection: String,
    offset: u64,
    cursor: C,
    held: Option<Vec<u8>>,
}

/// 🚰 Many cursors in, one bounded byte stream out.
pub(crate) struct StreamingDocumentReader<S: DocumentSource> {
    source: S,
    state: StreamingReadState,
    // -- 🅿️ pure speed-up: valid only while it matches (head collection, offset). Otherwise reopen + skip.
    parked: Option<ParkedCursor<S::Cursor>>,
}

impl<S: DocumentSource> std::fmt::Debug for StreamingDocumentReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDocumentReader")
            .field("source", &self.source)
            .field("state", &self.state)
            .field("parked", &self.parked.as_ref().map(|p| &p.collection))
            .finish()
    }
}

impl<S: DocumentSource> StreamingDocumentReader<S> {
    pub(crate) fn new(source: S) -> Self {
        Self::with_state(source, StreamingReadState::default())
    }

    /// 🔁 Resume from a checkpoint. The source must be the same database, unchanged.
    pub(crate) fn with_state(source: S, state: StreamingReadState) -> Self {
        Self {
            source,
            state,
            parked: None,
        }
    }

    pub(crate) fn state(&self) -> &StreamingReadState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    /// 📖 Fill `buf` with as many whole documents as fit, starting where the last call stopped.
    ///
    /// - `Ok` + `Continuation`: more remains. Call again (with the buffer emptied).
    /// - `Ok` + `EndOfStream`: done. Further calls keep returning an empty `EndOfStream`.
    /// - `Err(SourceIteration)`: the source broke. `delivered` holds what made it into `buf`
    ///   this call; state covers exactly those documents; calling again resumes.
    /// - `Err(CapacityTooSmall)`: the next document is bigger than `buf`. Same buffer, same error.
    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, VaultError> {
        let mut outcome = ReadOutcome::default();

        if self.state.pending_collections.is_none() {
            let names = self
                .source
                .list_collection_names()
                .await
                .map_err(|err| VaultError::SourceIteration {
                    collection: None,
                    delivered: ReadOutcome::default(),
                    source: err.into(),
                })?;
            debug!(
                "📋 {} collections lined up for the trip: {:?}",
                names.len(),
                names
            );
            self.state.pending_collections = Some(names.into());
        }

        let capacity = buf.len();

        while let Some(collection) = self.state.current_collection().map(str::to_string) {
            let mut parked = match self.resume_cursor(&collection).await {
                Ok(parked) => parked,
                Err(err) => {
                    return Err(VaultError::SourceIteration {
                        collection: Some(collection),
                        delivered: outcome,
                        source: err.into(),
                    });
                }
            };

            let mut span = CollectionSpan {
                collection: collection.clone(),
                bytes: 0,
                documents: 0,
                drained: false,
            };

            loop {
                let next = match parked.held.take() {
                    Some(bytes) => Some(bytes),
                    None => match parked.cursor.next_document().await {
                        Ok(Some(document)) => Some(bson::to_vec(&document).map_err(|source| {
                            VaultError::DocumentEncoding {
                                collection: collection.clone(),
                                source,
                            }
                        })?),
                        Ok(None) => None,
                        Err(err) => {
                            debug!(
                                "💥 cursor over '{}' broke after {} documents; checkpoint {}",
                                collection,
                                self.state.document_offset(),
                                self.state.to_json()
                            );
                            outcome.push_span(span);
                            return Err(VaultError::SourceIteration {
                                collection: Some(collection),
                                delivered: outcome,
                                source: err.into(),
                            });
                        }
                    },
                };

                let Some(bytes) = next else {
                    trace!(
                        "🏁 '{}' drained ({} documents this call)",
                        collection,
                        span.documents
                    );
                    span.drained = true;
                    outcome.push_span(span);
                    self.state.drain_head();
                    break;
                };

                let written = outcome.bytes_written;
                if bytes.len() <= capacity - written {
                    buf[written..written + bytes.len()].copy_from_slice(&bytes);
                    outcome.bytes_written += bytes.len();
                    span.bytes += bytes.len();
                    span.documents += 1;
                    parked.offset += 1;
                    self.state.delivered_one();
                    continue;
                }

                // 🅿️ doesn't fit. keep it warm for the next call, touch nothing else.
                let document_size = bytes.len();
                parked.held = Some(bytes);
                self.parked = Some(parked);

                if written == 0 && outcome.spans.is_empty() {
                    return Err(VaultError::CapacityTooSmall {
                        collection,
                        document_size,
                        capacity,
                    });
                }

                outcome.push_span(span);
                outcome.status = ReadStatus::Continuation;
                trace!(
                    "🪣 buffer full at {} of {} bytes; '{}' resumes at document #{}",
                    outcome.bytes_written,
                    capacity,
                    collection,
                    self.state.document_offset()
                );
                return Ok(outcome);
            }
        }

        outcome.status = ReadStatus::EndOfStream;
        Ok(outcome)
    }

    /// 🔑 Reuse the parked cursor if it is exactly where the state says we are; otherwise reopen.
    async fn resume_cursor(
        &mut self,
        collection: &str,
    ) -> anyhow::Result<ParkedCursor<S::Cursor>> {
        let offset = self.state.document_offset();
        if let Some(parked) = self.parked.take() {
            if parked.collection == collection && parked.offset == offset {
                return Ok(parked);
            }
        }
        trace!("📂 opening cursor over '{collection}', skipping {offset} documents");
        let cursor = self.source.open_cursor(collection, offset).await?;
        Ok(ParkedCursor {
            collection: collection.to_string(),
            offset,
            cursor,
            held: None,
        })
    }
}
