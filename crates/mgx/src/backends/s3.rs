//! 🪣 S3 backend: buckets full of backups, one object per collection.
//!
//! INT. AWS CONSOLE: NIGHT. A bucket named `backups-final-v2-REAL` waits in us-east-1.
//! It has been waiting since the last reorg. Tonight it gets fed.
//!
//! 🧠 Knowledge graph:
//! - Same pattern as `directory/` and `mongo/`: config co-located in `s3_store.rs`
//! - Trait impls: `impl ObjectStore for S3Store`, `impl ObjectUpload for S3Upload`
//! - Enum variants: `StoreBackend::S3`, `UploadBackend::S3`
//! - Uploads: multipart in 8 MiB parts, started lazily; small objects go up as one `PutObject`
//! - Downloads: `GetObject` → `ByteStream::into_async_read()`, boxed as an `ObjectReader`
//! - `endpoint` + `force_path_style` point it at S3-compatible gateways (MinIO, Storj, Ceph...)
//!
//! 🦆 The duck has no clearance for AWS. It watches from the edge of the VPC.

mod s3_store;

pub use s3_store::S3StoreConfig;
pub(crate) use s3_store::{S3Store, S3Upload};
