//! # bale-manifest
//!
//! Side index for a bale archive.
//!
//! One [`ManifestRecord`] per archived object records where the object came
//! from, what the store said about it, and where its bytes live in the tar
//! stream. The manifest is what makes a sequential archive randomly
//! addressable and lets originals be deleted without re-reading the archive.
//!
//! ## On-disk format
//!
//! CSV, one header row followed by one row per record:
//!
//! ```text
//! Bucket,Key,Size,LastModifiedDate,ETag,StorageClass,VersionId,TarMD5,TarOffset,TarDataOffset,TarSize,TarStrippedPrefix
//! ```
//!
//! Rows are persisted sorted by `Key`; the validator re-sorts by `TarOffset`.

mod record;

pub use record::{ManifestRecord, DEFAULT_STORAGE_CLASS};

use std::io::{self, Read, Write};

use thiserror::Error;

/// Column names, in persisted order
pub const FIELDS: [&str; 12] = [
    "Bucket",
    "Key",
    "Size",
    "LastModifiedDate",
    "ETag",
    "StorageClass",
    "VersionId",
    "TarMD5",
    "TarOffset",
    "TarDataOffset",
    "TarSize",
    "TarStrippedPrefix",
];

/// Errors that can occur during manifest operations
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// Ordered collection of manifest records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    records: Vec<ManifestRecord>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ManifestRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: ManifestRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ManifestRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestRecord> {
        self.records.iter()
    }

    /// Logical order, used when persisting
    pub fn sort_by_key(&mut self) {
        self.records.sort_by(|a, b| a.key.cmp(&b.key));
    }

    /// Physical order, matching the archive layout
    pub fn sort_by_offset(&mut self) {
        self.records.sort_by_key(|r| r.tar_offset);
    }

    /// First record for the given store object
    pub fn find(&self, bucket: &str, key: &str) -> Option<&ManifestRecord> {
        self.records
            .iter()
            .find(|r| r.bucket == bucket && r.key == key)
    }

    /// Parse a manifest from CSV. Missing `TarStrippedPrefix` columns read as empty.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let records = csv_reader
            .deserialize::<ManifestRecord>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        tracing::debug!(records = records.len(), "Manifest parsed");
        Ok(Self { records })
    }

    /// Write the manifest as CSV in its current order. The header row is
    /// written even when there are no records.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv_writer.write_record(FIELDS)?;
        for record in &self.records {
            csv_writer.serialize(record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl IntoIterator for Manifest {
    type Item = ManifestRecord;
    type IntoIter = std::vec::IntoIter<ManifestRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestRecord;
    type IntoIter = std::slice::Iter<'a, ManifestRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl FromIterator<ManifestRecord> for Manifest {
    fn from_iter<I: IntoIterator<Item = ManifestRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(key: &str, offset: u64) -> ManifestRecord {
        ManifestRecord {
            bucket: "source".to_string(),
            key: key.to_string(),
            size: 4,
            last_modified: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            etag: "abc".to_string(),
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            version_id: None,
            tar_md5: "abc".to_string(),
            tar_offset: offset,
            tar_data_offset: offset + 512,
            tar_size: 4,
            tar_stripped_prefix: "a/".to_string(),
        }
    }

    #[test]
    fn test_csv_roundtrip_preserves_records() {
        let manifest = Manifest::from_records(vec![record("a/x.txt", 0), record("a/y.txt", 1024)]);
        let mut buf = Vec::new();
        manifest.write_to(&mut buf).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), FIELDS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "source,a/x.txt,4,2024-01-02T03:04:05+00:00,abc,STANDARD,,abc,0,512,4,a/"
        );

        let parsed = Manifest::read_from(buf.as_slice()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_empty_manifest_still_has_header() {
        let mut buf = Vec::new();
        Manifest::new().write_to(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf.clone()).unwrap().trim_end(), FIELDS.join(","));
        assert!(Manifest::read_from(buf.as_slice()).unwrap().is_empty());
    }

    #[test]
    fn test_keys_with_delimiters_are_escaped() {
        let manifest = Manifest::from_records(vec![record("a/with,comma \"quoted\".txt", 0)]);
        let mut buf = Vec::new();
        manifest.write_to(&mut buf).unwrap();
        let parsed = Manifest::read_from(buf.as_slice()).unwrap();
        assert_eq!(parsed.records()[0].key, "a/with,comma \"quoted\".txt");
    }

    #[test]
    fn test_missing_prefix_column_defaults_to_empty() {
        let csv = "Bucket,Key,Size,LastModifiedDate,ETag,StorageClass,VersionId,TarMD5,TarOffset,TarDataOffset,TarSize\n\
                   b,k.txt,3,2020-05-06T07:08:09.250000+00:00,e,GLACIER,v1,e,0,512,3\n";
        let manifest = Manifest::read_from(csv.as_bytes()).unwrap();
        let rec = &manifest.records()[0];
        assert_eq!(rec.tar_stripped_prefix, "");
        assert_eq!(rec.version_id.as_deref(), Some("v1"));
        assert_eq!(rec.storage_class, "GLACIER");
        assert_eq!(rec.archive_name(), "k.txt");
    }

    #[test]
    fn test_sorting_and_lookup() {
        let mut manifest =
            Manifest::from_records(vec![record("a/z", 0), record("a/m", 2048), record("a/b", 1024)]);
        manifest.sort_by_key();
        let keys: Vec<_> = manifest.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a/b", "a/m", "a/z"]);

        manifest.sort_by_offset();
        let offsets: Vec<_> = manifest.iter().map(|r| r.tar_offset).collect();
        assert_eq!(offsets, vec![0, 1024, 2048]);

        assert_eq!(manifest.find("source", "a/m").unwrap().tar_offset, 2048);
        assert!(manifest.find("other", "a/m").is_none());
    }

    #[test]
    fn test_malformed_offset_is_an_error() {
        let csv = format!(
            "{}\nb,k,3,2020-05-06T07:08:09+00:00,e,STANDARD,,e,zero,512,3,\n",
            FIELDS.join(",")
        );
        assert!(matches!(
            Manifest::read_from(csv.as_bytes()),
            Err(ManifestError::Csv(_))
        ));
    }
}
