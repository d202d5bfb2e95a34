//! Demand driven stream stages.
//!
//! Each stage only polls its upstream when a downstream poll cannot be
//! answered from what it already holds, so a slow consumer slows the whole
//! chain down to the byte source.
use crate::binding::{BindingTable, Outcome, Record};
use crate::serialize::{LineEncoder, RecordWriter};
use crate::tokenizer::{Dialect, Row, RowTokenizer};
use crate::{CsvResult, IngestError};
use bytes::Bytes;
use futures::{ready, Stream};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Byte chunks in, rows out.
///
/// When the upstream ends, buffered data is flushed as a final row even
/// without a trailing line break. An upstream error ends the stage at once.
pub struct ParseStage<S> {
    upstream: S,
    tokenizer: RowTokenizer,
    upstream_done: bool,
    finished: bool,
}

impl<S> ParseStage<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    pub fn new(upstream: S, dialect: Dialect) -> Self {
        Self {
            upstream,
            tokenizer: RowTokenizer::new(dialect),
            upstream_done: false,
            finished: false,
        }
    }

    pub fn tokenizer(&self) -> &RowTokenizer {
        &self.tokenizer
    }

    fn fail(&mut self, err: IngestError) -> Poll<Option<CsvResult<Row>>> {
        self.finished = true;
        self.tokenizer.close();
        Poll::Ready(Some(Err(err)))
    }
}

impl<S> Stream for ParseStage<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = CsvResult<Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match this.tokenizer.poll(!this.upstream_done) {
                Ok(Some(row)) => return Poll::Ready(Some(Ok(row))),
                Ok(None) if this.upstream_done => {
                    this.finished = true;
                    this.tokenizer.close();
                    tracing::debug!(rows = this.tokenizer.rows(), "parse stage complete");
                    return Poll::Ready(None);
                }
                Ok(None) => {}
                Err(e) => return this.fail(e),
            }

            match ready!(Pin::new(&mut this.upstream).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    if let Err(e) = this.tokenizer.offer(chunk) {
                        return this.fail(e);
                    }
                }
                Some(Err(e)) => return this.fail(e.into()),
                None => this.upstream_done = true,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    AwaitingHeader,
    Streaming,
}

/// Rows in, bound outcomes out.
///
/// The first row is dropped when it equals the table's header; no later row
/// is checked.
pub struct BindStage<S> {
    upstream: S,
    table: Arc<BindingTable>,
    state: HeaderState,
}

impl<S> BindStage<S>
where
    S: Stream<Item = CsvResult<Row>> + Unpin,
{
    pub fn new(upstream: S, table: Arc<BindingTable>) -> Self {
        Self {
            upstream,
            table,
            state: HeaderState::AwaitingHeader,
        }
    }

    pub fn state(&self) -> HeaderState {
        self.state
    }
}

impl<S> Stream for BindStage<S>
where
    S: Stream<Item = CsvResult<Row>> + Unpin,
{
    type Item = CsvResult<Outcome>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let row = match ready!(Pin::new(&mut this.upstream).poll_next(cx)) {
                Some(Ok(row)) => row,
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => return Poll::Ready(None),
            };

            if this.state == HeaderState::AwaitingHeader {
                this.state = HeaderState::Streaming;
                if this.table.is_header(&row) {
                    tracing::trace!("header row skipped");
                    continue;
                }
            }
            return Poll::Ready(Some(Ok(this.table.bind_row(&row))));
        }
    }
}

/// Records in, delimited lines out, header first.
pub struct SerializeStage<S> {
    upstream: S,
    encoder: LineEncoder,
}

impl<S> SerializeStage<S>
where
    S: Stream<Item = Record> + Unpin,
{
    pub fn new(upstream: S, writer: Arc<RecordWriter>) -> Self {
        Self {
            upstream,
            encoder: LineEncoder::new(writer),
        }
    }
}

impl<S> Stream for SerializeStage<S>
where
    S: Stream<Item = Record> + Unpin,
{
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let record = ready!(Pin::new(&mut this.upstream).poll_next(cx));
        Poll::Ready(record.map(|r| this.encoder.encode(&r)))
    }
}

/// Shorthand for chaining the stages onto a chunk stream.
pub trait StageExt: Stream + Sized {
    fn parse_rows(self, dialect: Dialect) -> ParseStage<Self>
    where
        Self: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        ParseStage::new(self, dialect)
    }

    fn bind_rows(self, table: Arc<BindingTable>) -> BindStage<Self>
    where
        Self: Stream<Item = CsvResult<Row>> + Unpin,
    {
        BindStage::new(self, table)
    }

    fn serialize_records(self, writer: Arc<RecordWriter>) -> SerializeStage<Self>
    where
        Self: Stream<Item = Record> + Unpin,
    {
        SerializeStage::new(self, writer)
    }
}

impl<S: Stream> StageExt for S {}
