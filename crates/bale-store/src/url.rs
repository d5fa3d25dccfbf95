use std::fmt;
use std::str::FromStr;

use crate::StoreError;

const SCHEME: &str = "s3://";

/// `s3://bucket/key` address of an object (or, with an empty or partial key, a prefix)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectUrl {
    pub bucket: String,
    pub key: String,
}

impl ObjectUrl {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Whether `s` uses the object store scheme
    pub fn is_object_url(s: &str) -> bool {
        s.starts_with(SCHEME)
    }
}

impl FromStr for ObjectUrl {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| StoreError::InvalidUrl(s.to_string()))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(StoreError::InvalidUrl(s.to_string()));
        }
        Ok(Self::new(bucket, key))
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket_and_key() {
        let url: ObjectUrl = "s3://source/folders/some_folder/file.txt".parse().unwrap();
        assert_eq!(url.bucket, "source");
        assert_eq!(url.key, "folders/some_folder/file.txt");
        assert_eq!(url.to_string(), "s3://source/folders/some_folder/file.txt");
    }

    #[test]
    fn test_parse_bucket_only() {
        let url: ObjectUrl = "s3://source".parse().unwrap();
        assert_eq!(url.key, "");
        let url: ObjectUrl = "s3://source/".parse().unwrap();
        assert_eq!(url.key, "");
    }

    #[test]
    fn test_reject_bad_urls() {
        assert!("source/key".parse::<ObjectUrl>().is_err());
        assert!("s3:///key".parse::<ObjectUrl>().is_err());
        assert!("https://bucket/key".parse::<ObjectUrl>().is_err());
    }
}
