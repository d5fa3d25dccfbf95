//! Archive and manifest endpoints: a local path or an object in the store.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tempfile::{NamedTempFile, SpooledTempFile};

use bale_stream::ReadSeek;

use crate::{ObjectStore, ObjectUrl, Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Store(ObjectUrl),
}

impl Location {
    /// `s3://bucket/key` selects the store, anything else is a local path.
    pub fn parse(s: &str) -> Result<Self> {
        if ObjectUrl::is_object_url(s) {
            Ok(Location::Store(s.parse()?))
        } else {
            Ok(Location::Local(PathBuf::from(s)))
        }
    }

    pub fn exists(&self, store: &dyn ObjectStore) -> Result<bool> {
        match self {
            Location::Local(path) => Ok(path.exists()),
            Location::Store(url) => store.exists(&url.bucket, &url.key),
        }
    }

    /// Sequential reader from the start of the endpoint
    pub fn open_read(&self, store: &dyn ObjectStore) -> Result<Box<dyn Read + Send>> {
        match self {
            Location::Local(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            Location::Store(url) => Ok(store.get_object(&url.bucket, &url.key)?.body),
        }
    }

    /// Random-access reader
    pub fn open_seekable(&self, store: &dyn ObjectStore) -> Result<Box<dyn ReadSeek + Send>> {
        match self {
            Location::Local(path) => Ok(Box::new(File::open(path)?)),
            Location::Store(url) => store.open_seekable(&url.bucket, &url.key),
        }
    }

    /// Open for writing from scratch. Local output goes to a temporary file
    /// beside `path` (parent directories are created on demand) and is
    /// renamed into place by [`LocationWriter::finish`]; store objects are
    /// buffered, spilling past `spill_threshold`, and uploaded by `finish`.
    pub fn create<'a>(
        &self,
        store: &'a dyn ObjectStore,
        spill_threshold: usize,
    ) -> Result<LocationWriter<'a>> {
        match self {
            Location::Local(path) => {
                let temp = NamedTempFile::new_in(make_parent_dir(path)?)?;
                Ok(LocationWriter::File {
                    path: path.clone(),
                    writer: BufWriter::new(temp),
                })
            }
            Location::Store(url) => {
                if url.key.is_empty() || url.key.ends_with('/') {
                    return Err(StoreError::InvalidKey {
                        key: url.key.clone(),
                    });
                }
                Ok(LocationWriter::Upload {
                    store,
                    url: url.clone(),
                    buffer: SpooledTempFile::new(spill_threshold),
                })
            }
        }
    }
}

impl FromStr for Location {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Location::parse(s)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Store(url) => write!(f, "{}", url),
        }
    }
}

/// Create the directory that will hold `path` and return it.
fn make_parent_dir(path: &Path) -> io::Result<&Path> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent)?;
            Ok(parent)
        }
        _ => Ok(Path::new(".")),
    }
}

/// Writer returned by [`Location::create`]. The destination does not
/// change until [`finish`](LocationWriter::finish) succeeds; dropping the
/// writer discards everything written.
pub enum LocationWriter<'a> {
    File {
        path: PathBuf,
        writer: BufWriter<NamedTempFile>,
    },
    Upload {
        store: &'a dyn ObjectStore,
        url: ObjectUrl,
        buffer: SpooledTempFile,
    },
}

impl LocationWriter<'_> {
    /// Sync and rename local output into place, or upload the buffered body.
    pub fn finish(self) -> Result<()> {
        match self {
            LocationWriter::File { path, writer } => {
                let temp = writer.into_inner().map_err(|e| e.into_error())?;
                temp.as_file().sync_all()?;
                temp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
                Ok(())
            }
            LocationWriter::Upload {
                store,
                url,
                mut buffer,
            } => {
                buffer.seek(SeekFrom::Start(0))?;
                store.put_object(&url.bucket, &url.key, &mut buffer)?;
                Ok(())
            }
        }
    }
}

impl Write for LocationWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LocationWriter::File { writer, .. } => writer.write(buf),
            LocationWriter::Upload { buffer, .. } => buffer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LocationWriter::File { writer, .. } => writer.flush(),
            LocationWriter::Upload { buffer, .. } => buffer.flush(),
        }
    }
}
