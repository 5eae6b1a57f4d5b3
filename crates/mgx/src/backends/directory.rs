//! 📁 Directory backend: a plain local directory pretending to be an object store.
//!
//! Bucket = first-level subdirectory, key = relative path inside it. Good for air-gapped
//! boxes, NFS mounts, and anyone who wants to `ls` their backups.
//!
//! 🧠 Knowledge graph:
//! - Config co-located: `DirectoryStoreConfig` lives in `directory_store.rs`
//! - Trait impls: `impl ObjectStore for DirectoryStore`, `impl ObjectUpload for DirectoryUpload`
//! - Uploads land in `{key}.partial`, renamed into place on commit. Listing skips `.partial`.

mod directory_store;

pub use directory_store::DirectoryStoreConfig;
pub(crate) use directory_store::{DirectoryStore, DirectoryUpload};
