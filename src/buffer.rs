//! Growable byte buffer with separate read/write cursors, scatter reads via
//! `readv`, and in-place compaction before growth.

use std::io::{self, IoSliceMut, Read};

const INITIAL_CAPACITY: usize = 1024;
const OVERFLOW_SIZE: usize = 65_536;

pub struct Buffer {
    data: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer {
            data: vec![0u8; INITIAL_CAPACITY],
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn readable_bytes(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn writable_bytes(&self) -> usize {
        self.data.len() - self.write_pos
    }

    pub fn prependable_bytes(&self) -> usize {
        self.read_pos
    }

    pub fn peek(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    pub fn is_empty(&self) -> bool {
        self.readable_bytes() == 0
    }

    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    /// Bytes from the read cursor up to (but not including) absolute offset
    /// `end_abs`, used by the request parser to slice out a found line
    /// without exposing the backing store.
    pub fn slice_until(&self, end_abs: usize) -> &[u8] {
        &self.data[self.read_pos..end_abs]
    }

    /// Advances the read cursor past `len` consumed bytes, resetting both
    /// cursors to 0 once everything has been drained.
    pub fn retrieve(&mut self, len: usize) {
        let len = len.min(self.readable_bytes());
        self.read_pos += len;
        if self.read_pos == self.write_pos {
            self.read_pos = 0;
            self.write_pos = 0;
        }
    }

    pub fn retrieve_all(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    pub fn retrieve_all_to_vec(&mut self) -> Vec<u8> {
        let out = self.peek().to_vec();
        self.retrieve_all();
        out
    }

    /// Finds a `needle` inside the readable region, returning its absolute
    /// offset into `data`.
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() || self.readable_bytes() < needle.len() {
            return None;
        }
        self.peek()
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|p| p + self.read_pos)
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.ensure_writable(bytes.len());
        let end = self.write_pos + bytes.len();
        self.data[self.write_pos..end].copy_from_slice(bytes);
        self.write_pos = end;
    }

    pub fn has_written(&mut self, len: usize) {
        self.write_pos += len;
    }

    fn begin_write_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.write_pos..]
    }

    /// Compacts in place if the combined prependable+writable space already
    /// suffices; otherwise grows the backing store.
    pub fn ensure_writable(&mut self, len: usize) {
        if self.writable_bytes() >= len {
            return;
        }
        if self.prependable_bytes() + self.writable_bytes() >= len {
            let readable = self.readable_bytes();
            self.data.copy_within(self.read_pos..self.write_pos, 0);
            self.read_pos = 0;
            self.write_pos = readable;
        } else {
            let new_len = self.write_pos + len;
            self.data.resize(new_len, 0);
        }
    }

    /// Scatter read: one `readv` into the tail of the buffer plus an
    /// on-stack overflow region, folding the overflow back in afterward so a
    /// single syscall can drain large bursts without pre-growing the buffer.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        self.ensure_writable(OVERFLOW_SIZE);
        let mut overflow = [0u8; OVERFLOW_SIZE];
        let mut slices = [
            IoSliceMut::new(self.begin_write_mut()),
            IoSliceMut::new(&mut overflow),
        ];
        let n = reader.read_vectored(&mut slices)?;
        let tail_cap = self.data.len() - self.write_pos;
        if n <= tail_cap {
            self.write_pos += n;
        } else {
            self.write_pos = self.data.len();
            let spill = n - tail_cap;
            self.append(&overflow[..spill]);
        }
        Ok(n)
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_retrieve_roundtrip() {
        let mut buf = Buffer::new();
        buf.append(b"hello");
        assert_eq!(buf.peek(), b"hello");
        buf.retrieve(5);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_retrieve_keeps_remainder() {
        let mut buf = Buffer::new();
        buf.append(b"hello world");
        buf.retrieve(6);
        assert_eq!(buf.peek(), b"world");
    }

    #[test]
    fn ensure_writable_compacts_before_growing() {
        let mut buf = Buffer::new();
        buf.append(&vec![b'x'; 900]);
        buf.retrieve(900);
        let cap_before = buf.data.len();
        buf.append(&vec![b'y'; 50]);
        assert_eq!(buf.data.len(), cap_before);
    }

    #[test]
    fn find_locates_subsequence() {
        let mut buf = Buffer::new();
        buf.append(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let pos = buf.find(b"\r\n").unwrap();
        assert_eq!(&buf.peek()[..pos - buf.read_pos], b"GET / HTTP/1.1");
    }

    #[test]
    fn read_from_drains_a_large_source_in_one_call() {
        let mut buf = Buffer::new();
        let payload = vec![b'z'; 200_000];
        let mut reader = payload.as_slice();
        let n = buf.read_from(&mut reader).unwrap();
        assert_eq!(n, 200_000);
        assert_eq!(buf.readable_bytes(), 200_000);
    }
}
