//! Memory-first spill buffer for fetched object bodies.
//!
//! Holds up to `threshold` bytes in memory and rolls over to an anonymous
//! temporary file beyond that. The temp file is removed when the buffer is
//! dropped, so disk usage is released as soon as the owning result is consumed.

use std::io::{self, Read, Seek, SeekFrom};

use tempfile::SpooledTempFile;

pub struct SpillBuffer {
    file: SpooledTempFile,
    len: u64,
}

impl SpillBuffer {
    /// Drain `source` into a new buffer and rewind it for reading.
    pub fn fill<R: Read + ?Sized>(source: &mut R, threshold: usize) -> io::Result<Self> {
        let mut file = SpooledTempFile::new(threshold);
        let len = io::copy(source, &mut file)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self { file, len })
    }

    /// Total bytes buffered
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the contents moved to disk
    pub fn is_spilled(&self) -> bool {
        self.file.is_rolled()
    }
}

impl Read for SpillBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for SpillBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_small_body_stays_in_memory() {
        let mut src = Cursor::new(b"small".to_vec());
        let mut buf = SpillBuffer::fill(&mut src, 1024).unwrap();
        assert_eq!(buf.len(), 5);
        assert!(!buf.is_spilled());

        let mut out = Vec::new();
        buf.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"small");
    }

    #[test]
    fn test_large_body_spills_to_disk() {
        let data = vec![7u8; 4096];
        let mut src = Cursor::new(data.clone());
        let mut buf = SpillBuffer::fill(&mut src, 1024).unwrap();
        assert_eq!(buf.len(), 4096);
        assert!(buf.is_spilled());

        let mut out = Vec::new();
        buf.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }
}
