//! In-memory object store.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::RwLock;

use chrono::{DateTime, Timelike, Utc};

use bale_config::log_store_debug;
use bale_stream::{md5_hex, ReadSeek};

use crate::{
    check_batch, DeleteFailure, DeleteOutput, GetObjectOutput, ObjectMeta, ObjectStore, Result,
    StoreError,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    meta: ObjectMeta,
}

type Buckets = BTreeMap<String, BTreeMap<String, StoredObject>>;

/// Thread-safe in-memory buckets. ETags are the MD5 of the content, as for
/// single-part uploads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<Buckets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.write().entry(bucket.to_string()).or_default();
    }

    /// Convenience upload from a byte slice
    pub fn put_bytes(&self, bucket: &str, key: &str, data: &[u8]) -> Result<ObjectMeta> {
        let mut body = data;
        self.put_object(bucket, key, &mut body)
    }

    /// Overwrite the recorded ETag, e.g. to mimic a multipart upload.
    pub fn set_etag(&self, bucket: &str, key: &str, etag: &str) -> Result<()> {
        let mut buckets = self.write();
        let object = lookup_mut(&mut buckets, bucket, key)?;
        object.meta.etag = etag.to_string();
        Ok(())
    }

    /// Current content of an object
    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.read()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| o.data.clone())
    }

    /// All keys in a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.read()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Buckets> {
        self.buckets.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Buckets> {
        self.buckets.write().unwrap_or_else(|e| e.into_inner())
    }

    fn stored(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let buckets = self.read();
        let objects = buckets.get(bucket).ok_or_else(|| StoreError::NoSuchBucket {
            bucket: bucket.to_string(),
        })?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

fn lookup_mut<'a>(buckets: &'a mut Buckets, bucket: &str, key: &str) -> Result<&'a mut StoredObject> {
    buckets
        .get_mut(bucket)
        .ok_or_else(|| StoreError::NoSuchBucket {
            bucket: bucket.to_string(),
        })?
        .get_mut(key)
        .ok_or_else(|| StoreError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
}

/// Store timestamps have whole-second precision.
fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

impl ObjectStore for MemoryStore {
    fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let buckets = self.read();
        let objects = buckets.get(bucket).ok_or_else(|| StoreError::NoSuchBucket {
            bucket: bucket.to_string(),
        })?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, o)| o.meta.clone())
            .collect())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<GetObjectOutput> {
        let stored = self.stored(bucket, key)?;
        log_store_debug!("Fetched object", bucket = bucket, key = key);
        Ok(GetObjectOutput {
            meta: stored.meta,
            body: Box::new(Cursor::new(stored.data)),
        })
    }

    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> Result<ObjectMeta> {
        let mut data = Vec::new();
        body.read_to_end(&mut data)?;

        let meta = ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: data.len() as u64,
            last_modified: now_seconds(),
            etag: md5_hex(&data),
            storage_class: None,
            version_id: None,
        };

        let mut buckets = self.write();
        let objects = buckets.get_mut(bucket).ok_or_else(|| StoreError::NoSuchBucket {
            bucket: bucket.to_string(),
        })?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<DeleteOutput> {
        check_batch(keys)?;
        let mut buckets = self.write();
        let objects = buckets.get_mut(bucket).ok_or_else(|| StoreError::NoSuchBucket {
            bucket: bucket.to_string(),
        })?;

        let mut output = DeleteOutput::default();
        for key in keys {
            if objects.remove(key).is_some() {
                output.deleted.push(key.clone());
            } else {
                output.errors.push(DeleteFailure {
                    key: key.clone(),
                    code: "NoSuchKey".to_string(),
                    message: "The specified key does not exist.".to_string(),
                });
            }
        }
        Ok(output)
    }

    fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .read()
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    fn open_seekable(&self, bucket: &str, key: &str) -> Result<Box<dyn ReadSeek + Send>> {
        let stored = self.stored(bucket, key)?;
        Ok(Box::new(Cursor::new(stored.data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_bucket("source");
        store.put_bytes("source", "a/x.txt", b"1234").unwrap();
        store.put_bytes("source", "a/y.txt", b"12345").unwrap();
        store.put_bytes("source", "b/z.txt", b"z").unwrap();
        store
    }

    #[test]
    fn test_list_filters_by_prefix() {
        let store = store();
        let listed = store.list_objects("source", "a/").unwrap();
        let keys: Vec<_> = listed.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["a/x.txt", "a/y.txt"]);
        assert_eq!(listed[0].size, 4);
        assert_eq!(listed[0].etag, md5_hex(b"1234"));
        assert_eq!(store.list_objects("source", "").unwrap().len(), 3);
    }

    #[test]
    fn test_missing_bucket_and_key() {
        let store = store();
        assert!(matches!(
            store.list_objects("nope", ""),
            Err(StoreError::NoSuchBucket { .. })
        ));
        assert!(matches!(
            store.get_object("source", "a/missing"),
            Err(StoreError::NoSuchKey { .. })
        ));
    }

    #[test]
    fn test_get_returns_body() {
        let store = store();
        let mut out = store.get_object("source", "a/y.txt").unwrap();
        let mut body = Vec::new();
        out.body.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"12345");
        assert_eq!(out.meta.size, 5);
    }

    #[test]
    fn test_delete_reports_missing_keys() {
        let store = store();
        let output = store
            .delete_objects("source", &["a/x.txt".to_string(), "a/gone".to_string()])
            .unwrap();
        assert_eq!(output.deleted, vec!["a/x.txt"]);
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].key, "a/gone");
        assert!(!store.exists("source", "a/x.txt").unwrap());
        assert!(store.exists("source", "a/y.txt").unwrap());
    }
}
