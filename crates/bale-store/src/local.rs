//! Directory-backed object store.
//!
//! ```text
//! <root>/
//! ├── <bucket>/
//! │   └── <key path>      # key "a/b.txt" → <root>/<bucket>/a/b.txt
//! └── .etags/
//!     └── <bucket>/<key path>   # "<etag> <size>:<mtime ns>" recorded at put time
//! ```
//!
//! Listing only stats files. The ETag recorded by `put_object` is reused
//! while the file's size and modification time still match it; files
//! written behind the store's back list with an empty ETag and are hashed
//! when fetched.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;

use bale_config::log_store_debug;
use bale_stream::{HashingStream, ReadSeek};

use crate::{
    check_batch, DeleteFailure, DeleteOutput, GetObjectOutput, ObjectMeta, ObjectStore, Result,
    StoreError,
};

const ETAG_DIR: &str = ".etags";

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_bucket(&self, bucket: &str) -> Result<()> {
        fs::create_dir_all(self.bucket_path(bucket)?)?;
        Ok(())
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        // Dot names would collide with the ETag directory
        if bucket.is_empty() || bucket.contains('/') || bucket.starts_with('.') {
            return Err(StoreError::InvalidUrl(format!("s3://{}/", bucket)));
        }
        Ok(self.root.join(bucket))
    }

    fn existing_bucket(&self, bucket: &str) -> Result<PathBuf> {
        let path = self.bucket_path(bucket)?;
        if !path.is_dir() {
            return Err(StoreError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        Ok(path)
    }

    /// Map a key to a file path, refusing anything that could escape the bucket.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = key.is_empty()
            || key.ends_with('/')
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.existing_bucket(bucket)?.join(relative))
    }

    fn etag_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(ETAG_DIR).join(bucket).join(key)
    }

    /// Metadata from a single stat. The ETag is the one recorded at put
    /// time, or empty when the file changed since or was never put.
    fn stat_meta(&self, bucket: &str, key: &str, path: &Path) -> Result<ObjectMeta> {
        let metadata = fs::metadata(path)?;
        let etag = self.recorded_etag(bucket, key, &metadata).unwrap_or_default();

        Ok(ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: metadata.len(),
            last_modified: DateTime::<Utc>::from(metadata.modified()?),
            etag,
            storage_class: None,
            version_id: None,
        })
    }

    fn recorded_etag(&self, bucket: &str, key: &str, metadata: &fs::Metadata) -> Option<String> {
        let text = fs::read_to_string(self.etag_path(bucket, key)).ok()?;
        let (etag, stamp) = text.trim_end().split_once(' ')?;
        (stamp == file_stamp(metadata)?).then(|| etag.to_string())
    }

    fn record_etag(
        &self,
        bucket: &str,
        key: &str,
        metadata: &fs::Metadata,
        etag: &str,
    ) -> Result<()> {
        let Some(stamp) = file_stamp(metadata) else {
            return Ok(());
        };
        let sidecar = self.etag_path(bucket, key);
        if let Some(parent) = sidecar.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(sidecar, format!("{} {}\n", etag, stamp))?;
        Ok(())
    }

    fn not_found(bucket: &str, key: &str) -> StoreError {
        StoreError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

/// Size and modification time; a recorded ETag is stale once either moves.
fn file_stamp(metadata: &fs::Metadata) -> Option<String> {
    let modified = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?;
    Some(format!("{}:{}", metadata.len(), modified.as_nanos()))
}

fn hash_file(path: &Path) -> Result<String> {
    let mut hashing = HashingStream::new(BufReader::new(File::open(path)?));
    io::copy(&mut hashing, &mut io::sink())?;
    Ok(hashing.hexdigest())
}

fn key_for(bucket_root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

impl ObjectStore for LocalStore {
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let bucket_root = self.existing_bucket(bucket)?;
        let mut listed = Vec::new();

        for entry in walkdir::WalkDir::new(&bucket_root).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Io(io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = key_for(&bucket_root, entry.path()) else {
                continue;
            };
            if key.starts_with(prefix) {
                listed.push(self.stat_meta(bucket, &key, entry.path())?);
            }
        }

        // Walk order is per-directory; keys compare as plain strings.
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        log_store_debug!("Listed objects", bucket = bucket, count = listed.len());
        Ok(listed)
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput> {
        let path = self.object_path(bucket, key)?;
        if !path.is_file() {
            return Err(Self::not_found(bucket, key));
        }
        let mut meta = self.stat_meta(bucket, key, &path)?;
        if meta.etag.is_empty() {
            meta.etag = hash_file(&path)?;
        }
        let body = BufReader::new(File::open(&path)?);
        Ok(GetObjectOutput {
            meta,
            body: Box::new(body),
        })
    }

    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> Result<ObjectMeta> {
        let path = self.object_path(bucket, key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;

        // Write beside the destination and rename into place
        let mut temp = NamedTempFile::new_in(parent)?;
        let etag = {
            let mut writer = HashingStream::new(io::BufWriter::new(temp.as_file_mut()));
            io::copy(body, &mut writer)?;
            writer.flush()?;
            writer.hexdigest()
        };
        temp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        let metadata = fs::metadata(&path)?;
        self.record_etag(bucket, key, &metadata, &etag)?;
        log_store_debug!("Stored object", bucket = bucket, key = key, etag = etag.as_str());

        Ok(ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: metadata.len(),
            last_modified: DateTime::<Utc>::from(metadata.modified()?),
            etag,
            storage_class: None,
            version_id: None,
        })
    }

    fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<DeleteOutput> {
        check_batch(keys)?;
        self.existing_bucket(bucket)?;

        let mut output = DeleteOutput::default();
        for key in keys {
            let outcome = self
                .object_path(bucket, key)
                .and_then(|path| fs::remove_file(path).map_err(StoreError::from));
            match outcome {
                Ok(()) => {
                    let _ = fs::remove_file(self.etag_path(bucket, key));
                    output.deleted.push(key.clone());
                }
                Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    output.errors.push(DeleteFailure {
                        key: key.clone(),
                        code: "NoSuchKey".to_string(),
                        message: "The specified key does not exist.".to_string(),
                    })
                }
                Err(e) => output.errors.push(DeleteFailure {
                    key: key.clone(),
                    code: "DeleteFailed".to_string(),
                    message: e.to_string(),
                }),
            }
        }
        Ok(output)
    }

    fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.object_path(bucket, key) {
            Ok(path) => Ok(path.is_file()),
            Err(StoreError::NoSuchBucket { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn open_seekable(&self, bucket: &str, key: &str) -> Result<Box<dyn ReadSeek + Send>> {
        let path = self.object_path(bucket, key)?;
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Self::not_found(bucket, key)),
            Err(e) => Err(e.into()),
        }
    }
}
