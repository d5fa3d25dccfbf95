use std::fmt;
use std::io;

use thiserror::Error;

use bale_manifest::ManifestError;
use bale_store::StoreError;

/// Errors that can occur during archive operations
#[derive(Error, Debug)]
pub enum PackError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Object not found in manifest: {url}")]
    NotFound { url: String },
}

pub type Result<T> = std::result::Result<T, PackError>;

/// Fatal build errors. The archive and manifest are unusable after any of these.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Object size mismatch: {key} (store reported {expected} bytes, got {actual})")]
    SizeMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid object key {key}: keys ending in '/' cannot be archived")]
    InvalidKey { key: String },

    #[error("Entry name {name:?} for {key} cannot be stored in a ustar header")]
    UnrepresentableName { key: String, name: String },

    #[error("{location} already exists")]
    DestinationExists { location: String },
}

/// Which recorded offset disagreed with the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetField {
    Header,
    Data,
}

impl fmt::Display for OffsetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetField::Header => write!(f, "TarOffset"),
            OffsetField::Data => write!(f, "TarDataOffset"),
        }
    }
}

/// First inconsistency found between a manifest and its archive
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("No entries found in manifest")]
    EmptyManifest,

    /// `name` is the entry name inside the archive, after prefix stripping.
    #[error("Not enough files found in manifest: tar entry {name} has no manifest row")]
    InsufficientEntries { name: String },

    #[error("Manifest files not found in tar: {}", keys.join(", "))]
    ExtraEntries { keys: Vec<String> },

    #[error("Mismatched keys: tar has {archive}, manifest has {manifest}")]
    NameMismatch { archive: String, manifest: String },

    #[error("Tar file {field} mismatch for {name}: tar has {archive}, manifest has {manifest}")]
    OffsetMismatch {
        name: String,
        field: OffsetField,
        archive: u64,
        manifest: u64,
    },

    #[error("Tar file size mismatch for {name}: tar has {archive}, manifest has {manifest}")]
    SizeMismatch {
        name: String,
        archive: u64,
        manifest: u64,
    },

    #[error("File content mismatch: {name}")]
    ContentMismatch { name: String },

    #[error("File hash mismatch: {name} (manifest {expected}, archive {actual})")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Raw read for {name} is already at {position}, past data offset {data_offset}")]
    RawLaneOverrun {
        name: String,
        position: u64,
        data_offset: u64,
    },

    #[error("Unreadable archive: {0}")]
    Archive(#[source] io::Error),
}
