//! Tee splitter.
//!
//! Splits one underlying reader into two lanes that can be consumed at
//! different rates. Bytes pulled from the source by one lane are queued for
//! the other lane until it catches up, so memory use is bounded by how far
//! apart the two lanes drift.
//!
//! Both lanes share the source through `Rc<RefCell<_>>`; they are meant to be
//! driven from a single thread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::rc::Rc;

struct TeeShared<R> {
    source: R,
    pending: [VecDeque<u8>; 2],
}

/// One lane of a teed reader
pub struct TeeReader<R> {
    shared: Rc<RefCell<TeeShared<R>>>,
    lane: usize,
    position: u64,
}

/// Split `source` into two independent lanes.
pub fn tee<R: Read>(source: R) -> (TeeReader<R>, TeeReader<R>) {
    let shared = Rc::new(RefCell::new(TeeShared {
        source,
        pending: [VecDeque::new(), VecDeque::new()],
    }));
    (
        TeeReader {
            shared: Rc::clone(&shared),
            lane: 0,
            position: 0,
        },
        TeeReader {
            shared,
            lane: 1,
            position: 0,
        },
    )
}

impl<R: Read> TeeReader<R> {
    /// Bytes consumed through this lane
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes read from the source by the other lane that this lane has not consumed yet
    pub fn buffered(&self) -> usize {
        self.shared.borrow().pending[self.lane].len()
    }

    /// Consume and discard exactly `n` bytes. Returns the number actually
    /// skipped, which is short only at end of stream.
    pub fn skip(&mut self, n: u64) -> io::Result<u64> {
        io::copy(&mut self.by_ref().take(n), &mut io::sink())
    }
}

impl<R: Read> Read for TeeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut shared = self.shared.borrow_mut();
        let shared = &mut *shared;

        let own = &mut shared.pending[self.lane];
        let n = if !own.is_empty() {
            own.read(buf)?
        } else {
            let n = shared.source.read(buf)?;
            shared.pending[1 - self.lane].extend(&buf[..n]);
            n
        };
        self.position += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_n<R: Read>(r: &mut R, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        r.read_exact(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_lanes_alternate() {
        let (mut a, mut b) = tee(Cursor::new(b"12345678".to_vec()));
        assert_eq!(read_n(&mut a, 2), b"12");
        assert_eq!(read_n(&mut b, 2), b"12");
        assert_eq!(read_n(&mut a, 2), b"34");
        assert_eq!(read_n(&mut b, 2), b"34");
        assert_eq!(read_n(&mut b, 2), b"56");
        assert_eq!(read_n(&mut a, 2), b"56");
        assert_eq!(read_n(&mut b, 2), b"78");
        assert_eq!(read_n(&mut a, 2), b"78");
        assert_eq!(a.buffered(), 0);
        assert_eq!(b.buffered(), 0);
        assert_eq!(a.position(), 8);
        assert_eq!(b.position(), 8);
    }

    #[test]
    fn test_one_lane_runs_ahead() {
        let (mut a, mut b) = tee(Cursor::new(b"abcdefgh".to_vec()));
        let mut all = Vec::new();
        a.read_to_end(&mut all).unwrap();
        assert_eq!(all, b"abcdefgh");
        assert_eq!(b.buffered(), 8);

        assert_eq!(read_n(&mut b, 3), b"abc");
        assert_eq!(b.buffered(), 5);
        let mut rest = Vec::new();
        b.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"defgh");
    }

    #[test]
    fn test_skip_advances_position() {
        let (mut a, mut b) = tee(Cursor::new(b"0123456789".to_vec()));
        assert_eq!(b.skip(4).unwrap(), 4);
        assert_eq!(b.position(), 4);
        assert_eq!(read_n(&mut a, 4), b"0123");
        assert_eq!(read_n(&mut b, 2), b"45");
        assert_eq!(b.skip(100).unwrap(), 4);
        assert_eq!(b.position(), 10);
    }
}
