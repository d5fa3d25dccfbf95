//! # bale-store
//!
//! Object store interface used by the bale archive engine.
//!
//! The engine needs four things from a store: list objects under a prefix,
//! fetch a body with its metadata, upload a body, and delete keys in batches
//! of at most [`MAX_DELETE_BATCH`]. Objects are addressed as
//! `s3://bucket/key` ([`ObjectUrl`]).
//!
//! ## Backends
//!
//! - [`MemoryStore`]: in-process buckets, used by tests
//! - [`LocalStore`]: one directory per bucket under a root directory
//!
//! [`Location`] wraps "a local path or an object URL" for archive and
//! manifest endpoints.

mod local;
mod location;
mod memory;
mod url;

pub use bale_config::MAX_DELETE_BATCH;
pub use bale_stream::ReadSeek;
pub use local::LocalStore;
pub use location::{Location, LocationWriter};
pub use memory::MemoryStore;
pub use url::ObjectUrl;

use std::io::{self, Read};

use chrono::{DateTime, Utc};
use thiserror::Error;

use bale_stream::SpillBuffer;

/// Memory limit when a store body must be buffered to become seekable
pub const SEEKABLE_SPILL_THRESHOLD: usize = 10 * 1024 * 1024;

/// Errors that can occur during object store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Bucket not found: {bucket}")]
    NoSuchBucket { bucket: String },

    #[error("Object not found: s3://{bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    #[error("Invalid object URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid object key: {key}")]
    InvalidKey { key: String },

    #[error("Delete batch of {len} keys exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Store-side metadata for one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// Checksum without surrounding quotes
    pub etag: String,
    pub storage_class: Option<String>,
    pub version_id: Option<String>,
}

impl ObjectMeta {
    pub fn url(&self) -> ObjectUrl {
        ObjectUrl::new(&self.bucket, &self.key)
    }
}

/// Body and metadata returned by a fetch
pub struct GetObjectOutput {
    pub meta: ObjectMeta,
    pub body: Box<dyn Read + Send>,
}

/// Per-key failure reported by a batch delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub key: String,
    pub code: String,
    pub message: String,
}

/// Result of one batch delete request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutput {
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteFailure>,
}

/// Object store collaborator.
///
/// Implementations must be usable from the fetch worker threads.
pub trait ObjectStore: Send + Sync {
    /// All objects whose key starts with `prefix`, sorted by key. Bodies are
    /// not read, so `etag` may be empty where computing it needs the
    /// content. [`ObjectStore::get_object`] always fills it.
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Fetch an object body together with its current metadata.
    fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput>;

    /// Store `body` under `key`, replacing any existing object.
    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> Result<ObjectMeta>;

    /// Delete up to [`MAX_DELETE_BATCH`] keys. Per-key failures are reported
    /// in the output rather than as an error.
    fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<DeleteOutput>;

    fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Random-access reader over an object. The default buffers the whole
    /// body, spilling to a temporary file when it is large.
    fn open_seekable(&self, bucket: &str, key: &str) -> Result<Box<dyn ReadSeek + Send>> {
        let mut output = self.get_object(bucket, key)?;
        let buffer = SpillBuffer::fill(&mut output.body, SEEKABLE_SPILL_THRESHOLD)?;
        Ok(Box::new(buffer))
    }
}

/// Normalize a listing prefix to "directory" form: no trailing slash for the
/// empty prefix, exactly one otherwise.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

pub(crate) fn check_batch(keys: &[String]) -> Result<()> {
    if keys.len() > MAX_DELETE_BATCH {
        return Err(StoreError::BatchTooLarge {
            len: keys.len(),
            max: MAX_DELETE_BATCH,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("folders/some_folder"), "folders/some_folder/");
        assert_eq!(normalize_prefix("folders/some_folder//"), "folders/some_folder/");
    }

    #[test]
    fn test_batch_limit() {
        let keys: Vec<String> = (0..=MAX_DELETE_BATCH).map(|i| i.to_string()).collect();
        assert!(matches!(
            check_batch(&keys),
            Err(StoreError::BatchTooLarge { len: 1001, max: 1000 })
        ));
        assert!(check_batch(&keys[..MAX_DELETE_BATCH]).is_ok());
    }
}
