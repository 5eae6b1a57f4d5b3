//! 🍃 Mongo backend: the database side of a backup.
//!
//! 🧠 Knowledge graph:
//! - Config co-located: `MongoSourceConfig` lives in `mongo_source.rs`
//! - Trait impl: `impl DocumentSource for MongoSource`, `impl DocumentCursor for MongoCursor`
//! - Collections are listed sorted by name; documents are scanned sorted by `_id`,
//!   so `skip(n)` on a fresh cursor lands exactly where the last one stopped.
//!
//! 🦆 The duck does not have a MongoDB Atlas account. The duck is on the free tier of life.

mod mongo_source;

pub use mongo_source::MongoSourceConfig;
pub(crate) use mongo_source::MongoSource;
