//! # Previously, on mongostash...
//!
//! 🎬 The data was trapped. Stranded in a database nobody had backed up since the
//! intern left. Someone had to test the backup engine without spinning up a real
//! cluster and a real bucket. Someone had to be brave. Someone had to live entirely
//! in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! `in_mem` provides an in-memory [`DocumentSource`](super::DocumentSource) and
//! [`ObjectStore`](super::ObjectStore) for tests. Both can be told to fail on purpose,
//! because a backup engine that has never seen a failure has never been tested.
//!
//! ⚠️ This is NOT for production. It is compiled for tests only. If you're deploying
//! this to prod, please also deploy a therapist.

mod in_mem_source;
mod in_mem_store;

pub(crate) use in_mem_source::InMemorySource;
pub(crate) use in_mem_store::InMemoryStore;
