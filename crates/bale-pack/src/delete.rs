//! Delete original objects once they are safely archived.
//!
//! A record is eligible only when the store's ETag equals the MD5 of the
//! bytes written into the archive. Multipart uploads have ETags that are not
//! content MD5s, so those objects are reported as mismatched and kept.

use std::collections::BTreeMap;

use bale_config::{log_delete_info, log_delete_warn, MAX_DELETE_BATCH};
use bale_manifest::Manifest;
use bale_store::{Location, ObjectStore};

use crate::Result;

/// Outcome for one bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketDeletion {
    /// Keys whose ETag matched the archived hash, in manifest order
    pub eligible: Vec<String>,
    pub deleted: Vec<String>,
    /// Eligible keys the store failed to delete
    pub errors: Vec<String>,
    /// Keys kept because their ETag did not match
    pub mismatched: Vec<String>,
}

/// Per-bucket deletion outcomes, keyed by bucket name
pub type DeletionReport = BTreeMap<String, BucketDeletion>;

/// Sort manifest records into eligible and mismatched keys per bucket.
pub fn partition(manifest: &Manifest) -> DeletionReport {
    let mut report = DeletionReport::new();
    for record in manifest {
        let bucket = report.entry(record.bucket.clone()).or_default();
        if record.is_deletion_eligible() {
            bucket.eligible.push(record.key.clone());
        } else {
            bucket.mismatched.push(record.key.clone());
        }
    }
    report
}

pub(crate) fn delete_originals(
    store: &dyn ObjectStore,
    manifest: &Location,
    dry_run: bool,
    batch_size: usize,
) -> Result<DeletionReport> {
    let records = Manifest::read_from(manifest.open_read(store)?)?;
    let mut report = partition(&records);

    for (bucket, deletion) in &report {
        for key in &deletion.mismatched {
            log_delete_warn!(
                "ETag does not match archived hash, keeping object",
                bucket = bucket.as_str(),
                key = key.as_str(),
            );
        }
    }

    if dry_run {
        for (bucket, deletion) in &report {
            log_delete_info!(
                "Dry run: objects would be deleted",
                bucket = bucket.as_str(),
                eligible = deletion.eligible.len(),
                mismatched = deletion.mismatched.len(),
            );
        }
        return Ok(report);
    }

    let batch_size = batch_size.clamp(1, MAX_DELETE_BATCH);
    for (bucket, deletion) in report.iter_mut() {
        for batch in deletion.eligible.chunks(batch_size) {
            match store.delete_objects(bucket, batch) {
                Ok(output) => {
                    for failure in &output.errors {
                        log_delete_warn!(
                            "Failed to delete object",
                            bucket = bucket.as_str(),
                            key = failure.key.as_str(),
                            code = failure.code.as_str(),
                            message = failure.message.as_str(),
                        );
                    }
                    deletion.deleted.extend(output.deleted);
                    deletion
                        .errors
                        .extend(output.errors.into_iter().map(|f| f.key));
                }
                // A rejected request fails every key in it; later batches still run
                Err(e) => {
                    log_delete_warn!(
                        "Delete request failed",
                        bucket = bucket.as_str(),
                        keys = batch.len(),
                        error = e.to_string().as_str(),
                    );
                    deletion.errors.extend(batch.iter().cloned());
                }
            }
        }
        log_delete_info!(
            "Deleted archived objects",
            bucket = bucket.as_str(),
            deleted = deletion.deleted.len(),
            errors = deletion.errors.len(),
            mismatched = deletion.mismatched.len(),
        );
    }
    Ok(report)
}
