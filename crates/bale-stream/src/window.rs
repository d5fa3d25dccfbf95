//! Offset-window reader.
//!
//! Exposes `len` bytes starting at `offset` of a seekable stream as a
//! standalone stream. Reads are clamped to the window and return 0 once it
//! is exhausted, even if the underlying stream continues.

use std::io::{self, Read, Seek, SeekFrom};

pub struct OffsetWindow<R> {
    inner: R,
    offset: u64,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek> OffsetWindow<R> {
    /// Seek `inner` to `offset` and bound it to `len` bytes.
    pub fn new(mut inner: R, offset: u64, len: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            inner,
            offset,
            len,
            pos: 0,
        })
    }

    /// Window length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the window within the underlying stream
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Position relative to the start of the window
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Bytes left before the window is exhausted
    pub fn remaining(&self) -> u64 {
        self.len - self.pos
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for OffsetWindow<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let max = self.remaining().min(buf.len() as u64) as usize;
        if max == 0 {
            return Ok(0);
        }
        let n = self.inner.read(&mut buf[..max])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for OffsetWindow<R> {
    /// Positions are relative to the window and clamped to `[0, len]`.
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        let target = match from {
            SeekFrom::Start(n) => n as i128,
            SeekFrom::Current(d) => self.pos as i128 + d as i128,
            SeekFrom::End(d) => self.len as i128 + d as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of window",
            ));
        }
        let target = (target as u64).min(self.len);
        self.inner.seek(SeekFrom::Start(self.offset + target))?;
        self.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_window_clamps_reads() {
        let mut window = OffsetWindow::new(Cursor::new(b"12345678".to_vec()), 2, 4).unwrap();
        let mut buf = [0u8; 2];
        window.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"34");

        let mut rest = Vec::new();
        window.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"56");

        let mut big = [0u8; 16];
        assert_eq!(window.read(&mut big).unwrap(), 0);
        assert_eq!(window.read(&mut buf).unwrap(), 0);
        assert_eq!(window.remaining(), 0);
    }

    #[test]
    fn test_window_seek_is_relative() {
        let mut window = OffsetWindow::new(Cursor::new(b"abcdefghij".to_vec()), 3, 5).unwrap();
        assert_eq!(window.seek(SeekFrom::End(-2)).unwrap(), 3);
        let mut out = Vec::new();
        window.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"gh");

        assert_eq!(window.seek(SeekFrom::Start(100)).unwrap(), 5);
        assert!(window.seek(SeekFrom::Current(-6)).is_err());

        window.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        window.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"defgh");
    }

    #[test]
    fn test_empty_window() {
        let mut window = OffsetWindow::new(Cursor::new(b"abc".to_vec()), 1, 0).unwrap();
        assert!(window.is_empty());
        let mut out = Vec::new();
        window.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
