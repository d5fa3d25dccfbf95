//! Check a manifest against its archive in one sequential pass.
//!
//! The archive stream is split into two lanes. The parsed lane feeds a tar
//! reader, which supplies entry names, offsets and content. The raw lane is
//! advanced straight to each recorded data offset so the content found there
//! can be compared byte for byte with what the tar reader produced. Both lanes
//! pull from the same source, so memory use is bounded by how far one lane
//! runs ahead of the other (at most one entry header plus padding).

use std::collections::VecDeque;
use std::io::{self, Read};

use bale_config::{log_validate_debug, log_validate_error, log_validate_info, ArchiveConfig};
use bale_manifest::{Manifest, ManifestRecord};
use bale_store::{Location, ObjectStore};
use bale_stream::{tee, HashingStream, TeeReader};

use crate::{OffsetField, Result, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationSummary {
    pub entries: usize,
    pub bytes: u64,
}

pub(crate) fn validate(
    store: &dyn ObjectStore,
    manifest: &Location,
    archive: &Location,
    config: &ArchiveConfig,
) -> Result<ValidationSummary> {
    let records = Manifest::read_from(manifest.open_read(store)?)?;
    let source = archive.open_read(store)?;
    let outcome = validate_streams(records, source, config.spill_threshold);
    match &outcome {
        Ok(summary) => log_validate_info!(
            "Archive is consistent with manifest",
            archive = archive.to_string().as_str(),
            entries = summary.entries,
            bytes = summary.bytes,
        ),
        Err(e) => log_validate_error!(
            "Validation failed",
            archive = archive.to_string().as_str(),
            error = e.to_string().as_str(),
        ),
    }
    outcome
}

/// Validate `archive` against `manifest`, comparing content in chunks of at
/// most `chunk_size` bytes. Stops at the first inconsistency.
pub fn validate_streams<R: Read>(
    manifest: Manifest,
    archive: R,
    chunk_size: usize,
) -> Result<ValidationSummary> {
    let mut manifest = manifest;
    manifest.sort_by_offset();
    let mut pending: VecDeque<ManifestRecord> = manifest.into_records().into();
    let first_offset = pending
        .front()
        .map(|r| r.tar_offset)
        .ok_or(ValidationError::EmptyManifest)?;

    let (parsed_lane, mut raw_lane) = tee(archive);
    raw_lane.skip(first_offset).map_err(ValidationError::Archive)?;

    let mut chunks = ChunkBuffers::new(chunk_size);
    let mut summary = ValidationSummary::default();
    let mut archive = tar::Archive::new(parsed_lane);

    for entry in archive.entries().map_err(ValidationError::Archive)? {
        let mut entry = entry.map_err(ValidationError::Archive)?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let record = pending
            .pop_front()
            .ok_or_else(|| ValidationError::InsufficientEntries { name: name.clone() })?;

        check_header(
            &name,
            &record,
            entry.raw_header_position(),
            entry.raw_file_position(),
            entry.size(),
        )?;
        advance_raw_lane(&mut raw_lane, &name, record.tar_data_offset)?;

        let mut content = HashingStream::new(&mut entry);
        chunks.compare(&mut content, &mut raw_lane, record.tar_size, &name)?;
        let digest = content.hexdigest();
        if digest != record.tar_md5 {
            return Err(ValidationError::HashMismatch {
                name,
                expected: record.tar_md5,
                actual: digest,
            }
            .into());
        }

        log_validate_debug!("Entry verified", name = name.as_str(), size = record.tar_size);
        summary.entries += 1;
        summary.bytes += record.tar_size;
    }

    if !pending.is_empty() {
        return Err(ValidationError::ExtraEntries {
            keys: pending.into_iter().map(|r| r.key).collect(),
        }
        .into());
    }
    Ok(summary)
}

fn check_header(
    name: &str,
    record: &ManifestRecord,
    header_offset: u64,
    data_offset: u64,
    size: u64,
) -> std::result::Result<(), ValidationError> {
    if name != record.archive_name() {
        return Err(ValidationError::NameMismatch {
            archive: name.to_string(),
            manifest: record.archive_name().to_string(),
        });
    }
    let offsets = [
        (OffsetField::Header, header_offset, record.tar_offset),
        (OffsetField::Data, data_offset, record.tar_data_offset),
    ];
    for (field, archive, manifest) in offsets {
        if archive != manifest {
            return Err(ValidationError::OffsetMismatch {
                name: name.to_string(),
                field,
                archive,
                manifest,
            });
        }
    }
    if size != record.tar_size {
        return Err(ValidationError::SizeMismatch {
            name: name.to_string(),
            archive: size,
            manifest: record.tar_size,
        });
    }
    Ok(())
}

fn advance_raw_lane<R: Read>(
    raw_lane: &mut TeeReader<R>,
    name: &str,
    data_offset: u64,
) -> std::result::Result<(), ValidationError> {
    let position = raw_lane.position();
    if position > data_offset {
        return Err(ValidationError::RawLaneOverrun {
            name: name.to_string(),
            position,
            data_offset,
        });
    }
    let wanted = data_offset - position;
    let skipped = raw_lane.skip(wanted).map_err(ValidationError::Archive)?;
    if skipped != wanted {
        return Err(ValidationError::Archive(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("archive ends before data offset {} of {}", data_offset, name),
        )));
    }
    Ok(())
}

/// Reusable pair of comparison buffers, grown on demand up to the chunk size.
struct ChunkBuffers {
    chunk_size: usize,
    parsed: Vec<u8>,
    raw: Vec<u8>,
}

impl ChunkBuffers {
    fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            parsed: Vec::new(),
            raw: Vec::new(),
        }
    }

    fn compare<A: Read, B: Read>(
        &mut self,
        parsed: &mut A,
        raw: &mut B,
        len: u64,
        name: &str,
    ) -> std::result::Result<(), ValidationError> {
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(self.chunk_size as u64) as usize;
            if self.parsed.len() < n {
                self.parsed.resize(n, 0);
                self.raw.resize(n, 0);
            }
            parsed
                .read_exact(&mut self.parsed[..n])
                .map_err(ValidationError::Archive)?;
            raw.read_exact(&mut self.raw[..n])
                .map_err(ValidationError::Archive)?;
            if self.parsed[..n] != self.raw[..n] {
                return Err(ValidationError::ContentMismatch {
                    name: name.to_string(),
                });
            }
            remaining -= n as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ArchiveWriter, EntryMeta};
    use crate::PackError;
    use bale_stream::md5_hex;
    use chrono::{TimeZone, Utc};

    fn archive_of(files: &[(&str, &str)]) -> (Manifest, Vec<u8>) {
        let mut writer = ArchiveWriter::new(Vec::new());
        let mut manifest = Manifest::new();
        for (name, data) in files {
            let data = data.as_bytes();
            let meta = EntryMeta {
                name: name.to_string(),
                size: data.len() as u64,
                mtime: 0,
            };
            let offsets = writer.append(&meta, &mut &*data).unwrap();
            manifest.push(ManifestRecord {
                bucket: "b".to_string(),
                key: format!("p/{}", name),
                size: data.len() as u64,
                last_modified: Utc.timestamp_opt(0, 0).unwrap(),
                etag: md5_hex(data),
                storage_class: "STANDARD".to_string(),
                version_id: None,
                tar_md5: md5_hex(data),
                tar_offset: offsets.header_offset,
                tar_data_offset: offsets.data_offset,
                tar_size: offsets.size,
                tar_stripped_prefix: "p/".to_string(),
            });
        }
        let (bytes, _) = writer.finish().unwrap();
        (manifest, bytes)
    }

    fn validation_error(result: Result<ValidationSummary>) -> ValidationError {
        match result {
            Err(PackError::Validation(e)) => e,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_consistent_archive_passes_with_small_chunks() {
        let big = "7".repeat(3000);
        let (manifest, bytes) = archive_of(&[("a", "1234"), ("b", &big), ("c", "")]);
        let summary = validate_streams(manifest, &bytes[..], 100).unwrap();
        assert_eq!(summary, ValidationSummary { entries: 3, bytes: 3004 });
    }

    #[test]
    fn test_row_order_does_not_matter() {
        let (manifest, bytes) = archive_of(&[("a", "1"), ("b", "2")]);
        let mut records = manifest.into_records();
        records.reverse();
        validate_streams(Manifest::from_records(records), &bytes[..], 16).unwrap();
    }

    #[test]
    fn test_empty_manifest() {
        let (_, bytes) = archive_of(&[]);
        let err = validation_error(validate_streams(Manifest::new(), &bytes[..], 16));
        assert!(matches!(err, ValidationError::EmptyManifest));
    }

    #[test]
    fn test_wrong_offsets_are_named() {
        let (manifest, bytes) = archive_of(&[("a", "1")]);
        let mut records = manifest.into_records();
        records[0].tar_data_offset += 1;
        let err = validation_error(validate_streams(Manifest::from_records(records), &bytes[..], 16));
        assert!(matches!(
            err,
            ValidationError::OffsetMismatch {
                field: OffsetField::Data,
                archive: 512,
                manifest: 513,
                ..
            }
        ));
    }

    #[test]
    fn test_wrong_size_and_name() {
        let (manifest, bytes) = archive_of(&[("a", "1")]);
        let mut records = manifest.into_records();
        records[0].tar_size = 2;
        let err = validation_error(validate_streams(
            Manifest::from_records(records.clone()),
            &bytes[..],
            16,
        ));
        assert!(matches!(err, ValidationError::SizeMismatch { archive: 1, manifest: 2, .. }));

        records[0].tar_size = 1;
        records[0].key = "p/z".to_string();
        let err = validation_error(validate_streams(Manifest::from_records(records), &bytes[..], 16));
        assert!(matches!(err, ValidationError::NameMismatch { .. }));
    }

    #[test]
    fn test_wrong_hash() {
        let (manifest, bytes) = archive_of(&[("a", "1")]);
        let mut records = manifest.into_records();
        records[0].tar_md5 = md5_hex(b"2");
        let err = validation_error(validate_streams(Manifest::from_records(records), &bytes[..], 16));
        assert!(matches!(err, ValidationError::HashMismatch { .. }));
    }

    #[test]
    fn test_garbage_archive() {
        let (manifest, mut bytes) = archive_of(&[("a", "1")]);
        bytes.splice(0..0, b"ABCD".iter().copied());
        let err = validation_error(validate_streams(manifest, &bytes[..], 16));
        assert!(matches!(err, ValidationError::Archive(_)));
    }
}
