//! Hashing stream wrapper.
//!
//! Accumulates an MD5 digest and a byte count of the data passing through,
//! in either direction. MD5 is what object stores report as the ETag of a
//! single-part upload, which is what the deletion gate compares against.

use std::io::{self, Read, Seek, SeekFrom, Write};

use md5::{Digest, Md5};

/// Hex-encoded MD5 of a byte slice.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Stream wrapper that hashes everything read from or written to it.
pub struct HashingStream<S> {
    inner: S,
    hasher: Md5,
    len: u64,
}

impl<S> HashingStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            hasher: Md5::new(),
            len: 0,
        }
    }

    /// Number of bytes hashed so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hex digest of the bytes seen so far. Does not reset the running hash.
    pub fn hexdigest(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }
}

impl<S: Read> Read for HashingStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.update(&buf[..n]);
        Ok(n)
    }
}

impl<S: Write> Write for HashingStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Only hash what the inner writer accepted.
        let n = self.inner.write(buf)?;
        self.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: Seek> HashingStream<S> {
    /// Position of the wrapped stream. Seeking is not forwarded since it
    /// would desynchronize the digest from the stream contents.
    pub fn stream_position(&mut self) -> io::Result<u64> {
        self.inner.seek(SeekFrom::Current(0))
    }
}
