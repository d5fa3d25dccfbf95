use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage class recorded when the store does not report one
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// One archived object.
///
/// Field order matches the persisted column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    /// Full original key, never stripped
    #[serde(rename = "Key")]
    pub key: String,
    /// Store-reported length
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "LastModifiedDate", with = "timestamp")]
    pub last_modified: DateTime<Utc>,
    /// Store-reported checksum, quotes removed. Not an MD5 for multipart uploads.
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "StorageClass")]
    pub storage_class: String,
    #[serde(rename = "VersionId")]
    pub version_id: Option<String>,
    /// MD5 of the bytes written into the archive
    #[serde(rename = "TarMD5")]
    pub tar_md5: String,
    /// Offset of the entry header
    #[serde(rename = "TarOffset")]
    pub tar_offset: u64,
    /// Offset of the first content byte
    #[serde(rename = "TarDataOffset")]
    pub tar_data_offset: u64,
    /// Content length from the entry header
    #[serde(rename = "TarSize")]
    pub tar_size: u64,
    #[serde(rename = "TarStrippedPrefix", default)]
    pub tar_stripped_prefix: String,
}

impl ManifestRecord {
    /// Entry name inside the archive: `key` with the recorded prefix removed.
    pub fn archive_name(&self) -> &str {
        self.key
            .strip_prefix(self.tar_stripped_prefix.as_str())
            .unwrap_or(&self.key)
    }

    /// Only records whose store checksum equals the archived hash may have
    /// their originals deleted.
    pub fn is_deletion_eligible(&self) -> bool {
        self.etag == self.tar_md5
    }
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| de::Error::custom(format!("invalid timestamp {:?}: {}", text, e)))
    }
}
