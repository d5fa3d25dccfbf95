//! # bale-pack
//!
//! Consolidates many small store objects into a single tar archive plus a
//! CSV manifest that records, for each object, where its header and content
//! live inside the archive.
//!
//! ## Operations
//!
//! | Operation | Reads | Writes |
//! |-----------|-------|--------|
//! | [`ArchiveEngine::build`] | objects under a prefix | archive, manifest |
//! | [`ArchiveEngine::validate`] | manifest, archive | nothing |
//! | [`ArchiveEngine::extract`] | manifest, archive window | nothing |
//! | [`ArchiveEngine::delete_originals`] | manifest | deletes originals |
//!
//! ## Archive Layout
//!
//! ```text
//! offset 0       ┌──────────────┐ ← TarOffset of first record
//!                │ ustar header │ 512 bytes
//! offset 512     ├──────────────┤ ← TarDataOffset
//!                │ content      │ TarSize bytes, zero-padded to 512
//!                ├──────────────┤ ← TarOffset of next record
//!                │ ...          │
//!                ├──────────────┤
//!                │ 2 zero blocks│ end-of-archive marker
//!                └──────────────┘
//! ```
//!
//! Entries appear in fetch completion order; the manifest is sorted by key.

mod build;
mod delete;
mod error;
mod extract;
mod validate;
pub mod writer;

pub use build::{BuildRequest, BuildSummary};
pub use delete::{partition, BucketDeletion, DeletionReport};
pub use error::{BuildError, OffsetField, PackError, Result, ValidationError};
pub use extract::EntryReader;
pub use validate::{validate_streams, ValidationSummary};

use std::io::Write;
use std::sync::Arc;

use bale_config::ArchiveConfig;
use bale_store::{Location, ObjectStore, ObjectUrl};

/// Runs archive operations against one object store.
pub struct ArchiveEngine {
    store: Arc<dyn ObjectStore>,
    config: ArchiveConfig,
}

impl ArchiveEngine {
    pub fn new(store: Arc<dyn ObjectStore>, config: ArchiveConfig) -> Self {
        let mut config = config;
        config.normalize();
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Archive every object under `request.source` and write the manifest.
    ///
    /// Any error aborts the build; partially written destinations must be
    /// discarded.
    pub fn build(&self, request: &BuildRequest) -> Result<BuildSummary> {
        build::build(&self.store, request, &self.config)
    }

    /// Verify that `archive` matches `manifest` entry for entry.
    pub fn validate(&self, manifest: &Location, archive: &Location) -> Result<ValidationSummary> {
        validate::validate(self.store.as_ref(), manifest, archive, &self.config)
    }

    /// Open the archived content of `object` without parsing the archive.
    pub fn extract(
        &self,
        manifest: &Location,
        archive: &Location,
        object: &ObjectUrl,
    ) -> Result<EntryReader> {
        extract::open_entry(self.store.as_ref(), manifest, archive, object)
    }

    /// Copy the archived content of `object` into `out`.
    pub fn extract_to(
        &self,
        manifest: &Location,
        archive: &Location,
        object: &ObjectUrl,
        out: &mut dyn Write,
    ) -> Result<u64> {
        extract::extract_to(self.store.as_ref(), manifest, archive, object, out)
    }

    /// Delete originals whose ETag matches the archived hash. With `dry_run`
    /// the store is not contacted and nothing is deleted.
    pub fn delete_originals(&self, manifest: &Location, dry_run: bool) -> Result<DeletionReport> {
        delete::delete_originals(
            self.store.as_ref(),
            manifest,
            dry_run,
            self.config.delete_batch_size,
        )
    }
}
