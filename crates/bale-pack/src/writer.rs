//! Tar writer that reports where each entry landed.
//!
//! Every entry gets a plain ustar header so its header occupies exactly one
//! 512-byte block; no GNU long-name or PAX extension blocks are ever emitted.
//! That keeps `data_offset - header_offset` fixed and the offsets recorded in
//! the manifest exact.

use std::io::{self, Read, Write};

use tar::{Builder, EntryType, Header};

/// Permission bits stored for every entry
const ENTRY_MODE: u32 = 0o644;

/// Header fields for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub name: String,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub mtime: u64,
}

/// Where an appended entry was placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOffsets {
    pub header_offset: u64,
    pub data_offset: u64,
    /// Content length written to the header
    pub size: u64,
}

#[derive(Debug)]
pub enum EntryError {
    Io(io::Error),
    /// Name does not fit the ustar name/prefix fields unchanged
    UnrepresentableName,
    /// Content stream length differs from the declared size
    ContentLength { expected: u64, actual: u64 },
}

impl From<io::Error> for EntryError {
    fn from(e: io::Error) -> Self {
        EntryError::Io(e)
    }
}

/// Tracks bytes handed to the inner writer
struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct ArchiveWriter<W: Write> {
    builder: Builder<CountingWriter<W>>,
    entries: u64,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            builder: Builder::new(CountingWriter { inner, position: 0 }),
            entries: 0,
        }
    }

    /// Bytes written so far
    pub fn position(&self) -> u64 {
        self.builder.get_ref().position
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Append one regular-file entry whose content is read from `content`.
    ///
    /// `content` must yield exactly `meta.size` bytes. When it does not the
    /// archive is left in an unusable state and the caller must abandon it.
    pub fn append<R: Read + ?Sized>(
        &mut self,
        meta: &EntryMeta,
        content: &mut R,
    ) -> Result<EntryOffsets, EntryError> {
        let header = entry_header(meta)?;
        let header_offset = self.position();
        let data_offset = header_offset + header.as_bytes().len() as u64;

        let mut limited = (&mut *content).take(meta.size);
        self.builder.append(&header, &mut limited)?;
        let actual = meta.size - limited.limit();
        if actual != meta.size {
            return Err(EntryError::ContentLength {
                expected: meta.size,
                actual,
            });
        }

        let mut probe = [0u8; 1];
        if content.read(&mut probe)? != 0 {
            return Err(EntryError::ContentLength {
                expected: meta.size,
                actual: meta.size + 1,
            });
        }

        self.entries += 1;
        Ok(EntryOffsets {
            header_offset,
            data_offset,
            size: meta.size,
        })
    }

    /// Write the end-of-archive marker and return the inner writer with the
    /// total archive length.
    pub fn finish(self) -> io::Result<(W, u64)> {
        let counting = self.builder.into_inner()?;
        Ok((counting.inner, counting.position))
    }
}

fn entry_header(meta: &EntryMeta) -> Result<Header, EntryError> {
    if meta.name.is_empty() {
        return Err(EntryError::UnrepresentableName);
    }

    let mut header = Header::new_ustar();
    header
        .set_path(&meta.name)
        .map_err(|_| EntryError::UnrepresentableName)?;
    // set_path normalizes; the stored name has to read back byte-for-byte
    if header.path_bytes().as_ref() != meta.name.as_bytes() {
        return Err(EntryError::UnrepresentableName);
    }

    header.set_size(meta.size);
    header.set_mode(ENTRY_MODE);
    header.set_mtime(meta.mtime);
    header.set_uid(0);
    header.set_gid(0);
    header.set_entry_type(EntryType::Regular);
    header.set_cksum();
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, size: u64) -> EntryMeta {
        EntryMeta {
            name: name.to_string(),
            size,
            mtime: 1_600_000_000,
        }
    }

    #[test]
    fn test_offsets_follow_block_layout() {
        let mut writer = ArchiveWriter::new(Vec::new());

        let first = writer.append(&meta("x.txt", 4), &mut &b"1234"[..]).unwrap();
        assert_eq!(first.header_offset, 0);
        assert_eq!(first.data_offset, 512);

        // 4 bytes of content pad out to one block
        let second = writer.append(&meta("y.txt", 5), &mut &b"12345"[..]).unwrap();
        assert_eq!(second.header_offset, 1024);
        assert_eq!(second.data_offset, 1536);
        assert_eq!(writer.entries(), 2);

        let (bytes, len) = writer.finish().unwrap();
        assert_eq!(len, bytes.len() as u64);
        assert_eq!(len, 2048 + 1024);
        assert_eq!(&bytes[512..516], b"1234");
        assert_eq!(&bytes[1536..1541], b"12345");
    }

    #[test]
    fn test_archive_is_readable_by_tar() {
        let mut writer = ArchiveWriter::new(Vec::new());
        writer.append(&meta("dir/a", 3), &mut &b"abc"[..]).unwrap();
        writer.append(&meta("empty", 0), &mut &b""[..]).unwrap();
        let (bytes, _) = writer.finish().unwrap();

        let mut archive = tar::Archive::new(&bytes[..]);
        let mut seen = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = String::from_utf8(entry.path_bytes().into_owned()).unwrap();
            assert_eq!(entry.header().mode().unwrap(), ENTRY_MODE);
            assert_eq!(entry.header().mtime().unwrap(), 1_600_000_000);
            let mut body = Vec::new();
            entry.read_to_end(&mut body).unwrap();
            seen.push((name, body));
        }
        assert_eq!(
            seen,
            vec![("dir/a".to_string(), b"abc".to_vec()), ("empty".to_string(), Vec::new())]
        );
    }

    #[test]
    fn test_long_name_uses_ustar_prefix() {
        let name = format!("{}/{}", "d".repeat(120), "f".repeat(90));
        let mut writer = ArchiveWriter::new(Vec::new());
        let offsets = writer.append(&meta(&name, 1), &mut &b"z"[..]).unwrap();
        assert_eq!(offsets.data_offset - offsets.header_offset, 512);

        let (bytes, _) = writer.finish().unwrap();
        let mut archive = tar::Archive::new(&bytes[..]);
        let entry = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.path_bytes().as_ref(), name.as_bytes());
    }

    #[test]
    fn test_rejects_unrepresentable_names() {
        let mut writer = ArchiveWriter::new(Vec::new());
        let too_long = "n".repeat(300);
        for name in ["", too_long.as_str(), "a//b"] {
            let result = writer.append(&meta(name, 0), &mut &b""[..]);
            assert!(
                matches!(result, Err(EntryError::UnrepresentableName)),
                "{name:?} accepted"
            );
        }
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn test_short_and_long_content() {
        let mut writer = ArchiveWriter::new(Vec::new());
        let short = writer.append(&meta("short", 10), &mut &b"abc"[..]);
        assert!(matches!(
            short,
            Err(EntryError::ContentLength {
                expected: 10,
                actual: 3
            })
        ));

        let mut writer = ArchiveWriter::new(Vec::new());
        let long = writer.append(&meta("long", 2), &mut &b"abc"[..]);
        assert!(matches!(long, Err(EntryError::ContentLength { expected: 2, .. })));
    }
}
