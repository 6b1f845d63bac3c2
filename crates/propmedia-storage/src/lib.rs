//! Object store gateway for listing media.
//!
//! # Object key layout
//!
//! - **Raw uploads**: `{listingId}/raw/{mediaType}/{reference}-{filename}`
//! - **Derivatives**: `{listingId}/processed/{mediaType}/{resolution}/{filename}`
//! - **Archives**: `{listingId}/zip/complete_{batchId}_{unixSeconds}.zip`
//!
//! Keys are deterministic so that retried uploads overwrite rather than
//! proliferate. Derivation lives in the `keys` module and is shared with the
//! pipeline workers.

pub mod checksum;
pub mod error;
pub mod factory;
pub mod gateway;
pub mod keys;
pub mod object;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

pub use factory::create_storage;
pub use gateway::{MediaStorageGateway, SignedUrl};
pub use keys::Resolution;
pub use object::ObjectStoreStorage;
pub use propmedia_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteStream, ObjectInfo, PresignedRequest, Storage, StorageError, StorageResult};
