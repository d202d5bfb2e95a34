use crate::{CsvResult, IngestError};
use bytes::{Bytes, BytesMut};
use memchr::{memchr, memchr3};

/// Bounded accumulator of input not yet released by the tokenizer.
///
/// Positions are absolute offsets in the input stream, so they stay valid
/// when the consumed prefix is dropped on the next [`offer`](Self::offer).
#[derive(Debug)]
pub struct ByteAccumulator {
    buf: Bytes,
    // absolute offset of buf[0]
    base: u64,
    consumed: u64,
    max_len: usize,
}

impl ByteAccumulator {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Bytes::new(),
            base: 0,
            consumed: 0,
            max_len,
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Append a chunk, dropping everything before the consumed cursor.
    pub fn offer(&mut self, chunk: Bytes) -> CsvResult<()> {
        let retained = self.unconsumed();
        let requested = retained + chunk.len();
        if requested > self.max_len {
            return Err(IngestError::BufferOverflow {
                limit: self.max_len,
                requested,
            });
        }

        let skip = (self.consumed - self.base) as usize;
        self.buf = if retained == 0 {
            chunk
        } else if chunk.is_empty() {
            self.buf.slice(skip..)
        } else {
            let mut joined = BytesMut::with_capacity(requested);
            joined.extend_from_slice(&self.buf[skip..]);
            joined.extend_from_slice(&chunk);
            joined.freeze()
        };
        self.base = self.consumed;
        Ok(())
    }

    /// Absolute offset one past the last buffered byte.
    pub fn end(&self) -> u64 {
        self.base + self.buf.len() as u64
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn unconsumed(&self) -> usize {
        (self.end() - self.consumed) as usize
    }

    /// Move the consumed cursor forward. Moving it backwards is ignored.
    pub fn consume_to(&mut self, pos: u64) {
        debug_assert!(pos <= self.end());
        if pos > self.consumed {
            self.consumed = pos.min(self.end());
        }
    }

    pub fn get(&self, pos: u64) -> Option<u8> {
        self.local(pos).and_then(|i| self.buf.get(i).copied())
    }

    pub fn index_of(&self, byte: u8, from: u64) -> Option<u64> {
        let start = self.local(from)?;
        memchr(byte, &self.buf[start..]).map(|i| from + i as u64)
    }

    /// First occurrence of any of the three bytes at or after `from`.
    pub fn find_any(&self, a: u8, b: u8, c: u8, from: u64) -> Option<u64> {
        let start = self.local(from)?;
        memchr3(a, b, c, &self.buf[start..]).map(|i| from + i as u64)
    }

    /// Shared view of `[from, to)`; no bytes are copied.
    pub fn slice(&self, from: u64, to: u64) -> Bytes {
        match (self.local(from), self.local(to)) {
            (Some(a), Some(b)) if a <= b => self.buf.slice(a..b),
            _ => Bytes::new(),
        }
    }

    fn local(&self, pos: u64) -> Option<usize> {
        if pos < self.base || pos > self.end() {
            return None;
        }
        Some((pos - self.base) as usize)
    }
}
