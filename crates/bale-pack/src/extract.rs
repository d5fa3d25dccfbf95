use std::io::{self, Write};

use bale_config::log_extract_debug;
use bale_manifest::Manifest;
use bale_store::{Location, ObjectStore, ObjectUrl, ReadSeek};
use bale_stream::OffsetWindow;

use crate::{PackError, Result};

/// Reader over one archived object's content
pub type EntryReader = OffsetWindow<Box<dyn ReadSeek + Send>>;

/// Locate `object` in the manifest and open a window over its bytes in the
/// archive. Only the archive region is read; nothing else is parsed.
pub(crate) fn open_entry(
    store: &dyn ObjectStore,
    manifest: &Location,
    archive: &Location,
    object: &ObjectUrl,
) -> Result<EntryReader> {
    let records = Manifest::read_from(manifest.open_read(store)?)?;
    let record = records
        .find(&object.bucket, &object.key)
        .ok_or_else(|| PackError::NotFound {
            url: object.to_string(),
        })?;

    log_extract_debug!(
        "Opening archived object",
        key = record.key.as_str(),
        offset = record.tar_data_offset,
        size = record.tar_size,
    );
    let source = archive.open_seekable(store)?;
    Ok(OffsetWindow::new(source, record.tar_data_offset, record.tar_size)?)
}

/// Copy an archived object into `out`, returning the number of bytes written.
pub(crate) fn extract_to(
    store: &dyn ObjectStore,
    manifest: &Location,
    archive: &Location,
    object: &ObjectUrl,
    out: &mut dyn Write,
) -> Result<u64> {
    let mut reader = open_entry(store, manifest, archive, object)?;
    let copied = io::copy(&mut reader, out)?;
    if copied != reader.len() {
        return Err(PackError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("archive ends inside {}", object),
        )));
    }
    Ok(copied)
}
