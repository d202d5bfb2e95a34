//! Resumable row tokenizer.
//!
//! Input arrives in chunks that need not line up with rows or fields. The
//! tokenizer keeps the unfinished part of the current row between chunks and
//! hands out a row as soon as its terminator has been seen.
//!
//! Quoting rules:
//! - a field starting with the quote byte runs to the next quote that is not
//!   preceded by the escape byte, and may contain delimiters and line breaks;
//! - inside a quoted field `escape quote` stands for a literal quote;
//! - `\n`, `\r` and `\r\n` all end a row.
use crate::buffer::ByteAccumulator;
use crate::{CsvResult, IngestError};
use bytes::{Bytes, BytesMut};

pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';

/// Delimiter, quote and escape bytes plus the buffer cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: u8,
    /// Upper bound on the bytes of one row that has not ended yet.
    pub max_buffer: usize,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: b'\\',
            max_buffer: 10 * 1024,
        }
    }
}

impl Dialect {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_escape(mut self, escape: u8) -> Self {
        self.escape = escape;
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }
}

/// One tokenized row. Fields share the input buffer's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    fields: Vec<Bytes>,
    line: u64,
    raw: Bytes,
}

impl Row {
    pub fn new(fields: Vec<Bytes>, line: u64) -> Self {
        Self {
            fields,
            line,
            raw: Bytes::new(),
        }
    }

    /// Attach the row's input text, terminator excluded.
    pub fn with_raw(mut self, raw: Bytes) -> Self {
        self.raw = raw;
        self
    }

    /// The row exactly as it appeared in the input, quotes and escapes
    /// included but without its line break.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// 1-based number of the row in its input.
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.fields.get(idx).map(|f| f.as_ref())
    }

    pub fn fields(&self) -> &[Bytes] {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.fields.iter().map(|f| f.as_ref())
    }

    pub fn into_fields(self) -> Vec<Bytes> {
        self.fields
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    ScanningField,
    InQuotedField,
    AtRowBoundary,
    AwaitingMoreData,
    Closed,
}

/// Everything the tokenizer remembers between two calls of [`scan_row`].
#[derive(Debug, Clone)]
pub struct TokenizerState {
    pub phase: Phase,
    /// Start of the field being tokenized.
    pub cursor: u64,
    /// Where scanning of the current field resumes.
    pub scan: u64,
    /// Rows completed so far.
    pub rows: u64,
    // start of the current row; the buffer retains everything after it
    row_start: u64,
    rest: Vec<Bytes>,
    swallow_lf: bool,
}

impl Default for TokenizerState {
    fn default() -> Self {
        Self {
            phase: Phase::ScanningField,
            cursor: 0,
            scan: 0,
            rows: 0,
            row_start: 0,
            rest: Vec::new(),
            swallow_lf: false,
        }
    }
}

impl TokenizerState {
    /// Fields of the current row already tokenized.
    pub fn pending_fields(&self) -> &[Bytes] {
        &self.rest
    }

    /// Start of the row being tokenized.
    pub fn row_start(&self) -> u64 {
        self.row_start
    }

    fn complete_row(&mut self, field: Bytes, raw: Bytes, next: u64) -> Row {
        self.rest.push(field);
        self.rows += 1;
        self.cursor = next;
        self.scan = next;
        self.row_start = next;
        self.phase = Phase::AtRowBoundary;
        Row::new(std::mem::take(&mut self.rest), self.rows).with_raw(raw)
    }

    fn await_more(mut self) -> (Self, Step) {
        self.phase = Phase::AwaitingMoreData;
        (self, Step::NeedMore)
    }
}

#[derive(Debug)]
pub enum Step {
    Row(Row),
    NeedMore,
}

/// Advance the tokenizer over `buf` until a row completes or input runs out.
///
/// With `at_eof` set, the end of the buffer terminates the last field, so a
/// dangling unterminated row is returned as well.
pub fn scan_row(
    dialect: &Dialect,
    buf: &ByteAccumulator,
    mut state: TokenizerState,
    at_eof: bool,
) -> CsvResult<(TokenizerState, Step)> {
    if state.phase == Phase::Closed {
        return Ok((state, Step::NeedMore));
    }

    loop {
        let end = buf.end();

        if state.swallow_lf {
            match buf.get(state.cursor) {
                None if !at_eof => return Ok(state.await_more()),
                Some(LF) => {
                    state.cursor += 1;
                    state.scan = state.cursor;
                    state.row_start = state.cursor;
                    state.swallow_lf = false;
                }
                _ => state.swallow_lf = false,
            }
        }

        let a = state.cursor;
        if a >= end {
            if at_eof && !state.rest.is_empty() {
                // the row ended with a delimiter
                let raw = buf.slice(state.row_start, end);
                let row = state.complete_row(Bytes::new(), raw, end);
                return Ok((state, Step::Row(row)));
            }
            return Ok(state.await_more());
        }

        let (field, sep_at) = if buf.get(a) == Some(dialect.quote) {
            state.phase = Phase::InQuotedField;
            let Some(close) = closing_quote(dialect, buf, a, state.scan.max(a + 1)) else {
                if at_eof {
                    return Err(IngestError::UnterminatedQuote {
                        line: state.rows + 1,
                        offset: a,
                    });
                }
                state.scan = end;
                return Ok(state.await_more());
            };
            let field = unescape(dialect, buf.slice(a + 1, close));
            if close + 1 >= end {
                if at_eof {
                    let raw = buf.slice(state.row_start, end);
                    let row = state.complete_row(field, raw, end);
                    return Ok((state, Step::Row(row)));
                }
                // the separator after the closing quote is not here yet
                state.scan = close;
                return Ok(state.await_more());
            }
            (field, close + 1)
        } else {
            state.phase = Phase::ScanningField;
            match buf.find_any(dialect.delimiter, CR, LF, state.scan.max(a)) {
                Some(p) => (buf.slice(a, p), p),
                None if at_eof => {
                    let raw = buf.slice(state.row_start, end);
                    let row = state.complete_row(buf.slice(a, end), raw, end);
                    return Ok((state, Step::Row(row)));
                }
                None => {
                    state.scan = end;
                    return Ok(state.await_more());
                }
            }
        };

        match buf.get(sep_at) {
            Some(sep) if sep == dialect.delimiter => {
                state.rest.push(field);
                state.cursor = sep_at + 1;
                state.scan = state.cursor;
            }
            Some(sep @ (CR | LF)) => {
                let raw = buf.slice(state.row_start, sep_at);
                let row = state.complete_row(field, raw, sep_at + 1);
                state.swallow_lf = sep == CR;
                return Ok((state, Step::Row(row)));
            }
            Some(actual) => {
                return Err(IngestError::Malformed {
                    line: state.rows + 1,
                    column: sep_at - state.row_start + 1,
                    offset: sep_at,
                    expected: dialect.delimiter as char,
                    actual: actual as char,
                });
            }
            None => return Ok(state.await_more()),
        }
    }
}

fn closing_quote(dialect: &Dialect, buf: &ByteAccumulator, open: u64, from: u64) -> Option<u64> {
    let mut from = from;
    loop {
        let q = buf.index_of(dialect.quote, from)?;
        if q > open + 1 && buf.get(q - 1) == Some(dialect.escape) {
            from = q + 1;
            continue;
        }
        return Some(q);
    }
}

fn unescape(dialect: &Dialect, raw: Bytes) -> Bytes {
    let escaped = raw
        .windows(2)
        .any(|w| w[0] == dialect.escape && w[1] == dialect.quote);
    if !escaped {
        return raw;
    }

    let mut out = BytesMut::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == dialect.escape && raw.get(i + 1) == Some(&dialect.quote) {
            out.extend_from_slice(&[dialect.quote]);
            i += 2;
        } else {
            out.extend_from_slice(&raw[i..i + 1]);
            i += 1;
        }
    }
    out.freeze()
}

/// Tokenizer over an owned [`ByteAccumulator`].
#[derive(Debug)]
pub struct RowTokenizer {
    dialect: Dialect,
    buffer: ByteAccumulator,
    state: TokenizerState,
}

impl RowTokenizer {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            buffer: ByteAccumulator::new(dialect.max_buffer),
            state: TokenizerState::default(),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Rows handed out so far.
    pub fn rows(&self) -> u64 {
        self.state.rows
    }

    /// Bytes buffered but not yet part of a handed out row. A partially
    /// tokenized row stays buffered until it completes.
    pub fn buffered(&self) -> usize {
        self.buffer.unconsumed()
    }

    /// Buffer `chunk`. Fails once the current row would exceed
    /// `max_buffer`, or when the tokenizer is already closed.
    pub fn offer(&mut self, chunk: Bytes) -> CsvResult<()> {
        if self.state.phase == Phase::Closed {
            return Err(IngestError::TokenizerClosed);
        }
        self.buffer.offer(chunk).inspect_err(|_| self.close())
    }

    /// Next complete row.
    ///
    /// With `require_terminator` unset the final row is returned even though
    /// no line break follows it; use this only once the input has ended.
    pub fn poll(&mut self, require_terminator: bool) -> CsvResult<Option<Row>> {
        let state = std::mem::take(&mut self.state);
        match scan_row(&self.dialect, &self.buffer, state, !require_terminator) {
            Ok((state, step)) => {
                self.buffer.consume_to(state.row_start);
                self.state = state;
                match step {
                    Step::Row(row) => Ok(Some(row)),
                    Step::NeedMore => Ok(None),
                }
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Drain every remaining row, including an unterminated last one.
    pub fn finish(&mut self) -> CsvResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.poll(false)? {
            rows.push(row);
        }
        self.close();
        Ok(rows)
    }

    pub fn close(&mut self) {
        self.state.phase = Phase::Closed;
    }
}
