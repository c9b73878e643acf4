//! Object storage.
//!
//! [`ObjectStore`] is the backend seam, with an S3 implementation and a
//! local-directory implementation. [`ObjectStoreGateway`] layers key
//! validation, read-back verification and public URL derivation on top.

mod gateway;
mod key;
mod local_store;
mod object_store;
mod public_url;
mod s3_store;

pub use gateway::{ObjectStoreGateway, UploadResult};
pub use key::{file_name, validate_key, MAX_KEY_LEN};
pub use local_store::LocalDirStore;
pub use object_store::{ObjectStore, StorageObject, StoredObjectInfo};
pub use public_url::PublicUrlBuilder;
pub use s3_store::{create_s3_client, S3Store, DEFAULT_CACHE_CONTROL};
