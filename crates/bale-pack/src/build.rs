//! Consolidate every object under a prefix into one archive plus manifest.
//!
//! Objects are fetched concurrently (bounded by `workers`) into spill
//! buffers and appended to the archive in completion order. The manifest is
//! written last, sorted by key.

use std::sync::Arc;

use bale_config::{log_build_debug, log_build_error, log_build_info, ArchiveConfig};
use bale_manifest::{Manifest, ManifestRecord, DEFAULT_STORAGE_CLASS};
use bale_store::{normalize_prefix, Location, ObjectMeta, ObjectStore, ObjectUrl};
use bale_stream::{BoundedPipeline, HashingStream, SpillBuffer};

use crate::writer::{ArchiveWriter, EntryError, EntryMeta};
use crate::{BuildError, PackError, Result};

/// What to archive and where the results go
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Bucket and prefix to consolidate
    pub source: ObjectUrl,
    pub manifest: Location,
    pub archive: Location,
    /// Removed from the front of every key to form entry names
    pub strip_prefix: Option<String>,
    /// Replace existing manifest/archive destinations
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildSummary {
    pub entries: usize,
    /// Sum of archived content lengths
    pub bytes: u64,
    /// Total archive length including headers, padding and trailer
    pub archive_size: u64,
}

struct Fetched {
    meta: ObjectMeta,
    body: SpillBuffer,
}

pub(crate) fn build(
    store: &Arc<dyn ObjectStore>,
    request: &BuildRequest,
    config: &ArchiveConfig,
) -> Result<BuildSummary> {
    if !request.overwrite {
        for destination in [&request.archive, &request.manifest] {
            if destination.exists(store.as_ref())? {
                return Err(BuildError::DestinationExists {
                    location: destination.to_string(),
                }
                .into());
            }
        }
    }

    let prefix = normalize_prefix(&request.source.key);
    let objects = store.list_objects(&request.source.bucket, &prefix)?;
    if let Some(bad) = objects.iter().find(|o| o.key.ends_with('/')) {
        return Err(BuildError::InvalidKey {
            key: bad.key.clone(),
        }
        .into());
    }
    log_build_info!(
        "Archiving objects",
        source = request.source.to_string().as_str(),
        objects = objects.len(),
        workers = config.workers,
    );

    let strip_prefix = request.strip_prefix.as_deref().unwrap_or("");
    let mut archive_out = request.archive.create(store.as_ref(), config.spill_threshold)?;
    let mut writer = ArchiveWriter::new(&mut archive_out);

    let fetch_store = Arc::clone(store);
    let threshold = config.spill_threshold;
    let results = BoundedPipeline::new(config.workers)
        .thread_name("bale-fetch")
        .run(objects, move |listed: ObjectMeta| {
            fetch(fetch_store.as_ref(), &listed, threshold)
        })?;

    let mut manifest = Manifest::new();
    let mut bytes = 0u64;
    for fetched in results {
        let record = append_object(&mut writer, fetched?, strip_prefix).inspect_err(|e| {
            log_build_error!("Build aborted", error = e.to_string().as_str());
        })?;
        bytes += record.tar_size;
        manifest.push(record);
    }

    let (_, archive_size) = writer.finish()?;
    archive_out.finish()?;

    manifest.sort_by_key();
    let mut manifest_out = request.manifest.create(store.as_ref(), config.spill_threshold)?;
    manifest.write_to(&mut manifest_out)?;
    manifest_out.finish()?;

    let summary = BuildSummary {
        entries: manifest.len(),
        bytes,
        archive_size,
    };
    log_build_info!(
        "Archive complete",
        archive = request.archive.to_string().as_str(),
        manifest = request.manifest.to_string().as_str(),
        entries = summary.entries,
        bytes = summary.bytes,
    );
    Ok(summary)
}

fn fetch(store: &dyn ObjectStore, listed: &ObjectMeta, threshold: usize) -> Result<Fetched> {
    let mut output = store.get_object(&listed.bucket, &listed.key)?;
    let body = SpillBuffer::fill(&mut output.body, threshold)?;
    log_build_debug!(
        "Fetched object",
        key = listed.key.as_str(),
        size = body.len(),
        spilled = body.is_spilled(),
    );
    Ok(Fetched {
        meta: output.meta,
        body,
    })
}

fn append_object<W: std::io::Write>(
    writer: &mut ArchiveWriter<W>,
    fetched: Fetched,
    strip_prefix: &str,
) -> Result<ManifestRecord> {
    let Fetched { meta, body } = fetched;
    if body.len() != meta.size {
        return Err(BuildError::SizeMismatch {
            key: meta.key,
            expected: meta.size,
            actual: body.len(),
        }
        .into());
    }

    // Keys outside the strip prefix keep their full name
    let applied = if meta.key.starts_with(strip_prefix) {
        strip_prefix
    } else {
        ""
    };
    let entry = EntryMeta {
        name: meta.key[applied.len()..].to_string(),
        size: meta.size,
        mtime: meta.last_modified.timestamp().max(0) as u64,
    };

    let mut content = HashingStream::new(body);
    let offsets = match writer.append(&entry, &mut content) {
        Ok(offsets) => offsets,
        Err(EntryError::Io(e)) => return Err(PackError::Io(e)),
        Err(EntryError::UnrepresentableName) => {
            return Err(BuildError::UnrepresentableName {
                key: meta.key,
                name: entry.name,
            }
            .into())
        }
        Err(EntryError::ContentLength { expected, actual }) => {
            return Err(BuildError::SizeMismatch {
                key: meta.key,
                expected,
                actual,
            }
            .into())
        }
    };

    log_build_debug!(
        "Archived object",
        key = meta.key.as_str(),
        offset = offsets.header_offset,
        size = offsets.size,
    );

    Ok(ManifestRecord {
        bucket: meta.bucket,
        key: meta.key,
        size: meta.size,
        last_modified: meta.last_modified,
        etag: meta.etag,
        storage_class: meta
            .storage_class
            .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
        version_id: meta.version_id,
        tar_md5: content.hexdigest(),
        tar_offset: offsets.header_offset,
        tar_data_offset: offsets.data_offset,
        tar_size: offsets.size,
        tar_stripped_prefix: applied.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bale_store::MemoryStore;
    use bale_stream::md5_hex;
    use std::io::Cursor;

    fn fetched(store: &MemoryStore, key: &str) -> Fetched {
        let listed = store.list_objects("src", key).unwrap().remove(0);
        fetch(store, &listed, 1024).unwrap()
    }

    #[test]
    fn test_append_object_strips_prefix() {
        let store = MemoryStore::new();
        store.create_bucket("src");
        store.put_bytes("src", "base/dir/a.txt", b"alpha").unwrap();

        let mut writer = ArchiveWriter::new(Vec::new());
        let record = append_object(&mut writer, fetched(&store, "base/dir/a.txt"), "base/").unwrap();

        assert_eq!(record.key, "base/dir/a.txt");
        assert_eq!(record.archive_name(), "dir/a.txt");
        assert_eq!(record.tar_stripped_prefix, "base/");
        assert_eq!(record.tar_md5, md5_hex(b"alpha"));
        assert_eq!(record.storage_class, DEFAULT_STORAGE_CLASS);
        assert!(record.is_deletion_eligible());
        assert_eq!((record.tar_offset, record.tar_data_offset), (0, 512));
    }

    #[test]
    fn test_append_object_ignores_unrelated_prefix() {
        let store = MemoryStore::new();
        store.create_bucket("src");
        store.put_bytes("src", "other/a.txt", b"alpha").unwrap();

        let mut writer = ArchiveWriter::new(Vec::new());
        let record = append_object(&mut writer, fetched(&store, "other/a.txt"), "base/").unwrap();
        assert_eq!(record.tar_stripped_prefix, "");
        assert_eq!(record.archive_name(), "other/a.txt");
    }

    #[test]
    fn test_size_mismatch_is_fatal() {
        let store = MemoryStore::new();
        store.create_bucket("src");
        let mut meta = store.put_bytes("src", "k", b"four").unwrap();
        meta.size = 10;
        let body = SpillBuffer::fill(&mut Cursor::new(b"four".to_vec()), 1024).unwrap();

        let mut writer = ArchiveWriter::new(Vec::new());
        let err = append_object(&mut writer, Fetched { meta, body }, "").unwrap_err();
        assert!(matches!(
            err,
            PackError::Build(BuildError::SizeMismatch {
                expected: 10,
                actual: 4,
                ..
            })
        ));
    }
}
