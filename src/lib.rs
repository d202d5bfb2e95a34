//! Incremental CSV tokenizing and typed binding.
//!
//! - [`RowTokenizer`]: resumable tokenizer fed with arbitrary byte chunks,
//!   bounded by a maximum buffer size.
//! - [`BindingTable`]: positional schema turning rows into typed [`Record`]s,
//!   or into rejected records carrying their validation failures.
//! - [`RecordWriter`]: the way back, records to delimited lines.
//! - [`ParseStage`], [`BindStage`], [`SerializeStage`]: the above as pull
//!   driven `futures::Stream` adapters.
//! - [`Importer`]: concurrent per-file pipelines feeding a success and an
//!   error sink.
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod binding;
mod buffer;
mod codec;
mod convert;
mod import;
mod io;
mod schema;
mod serialize;
mod stage;
mod tokenizer;

pub use crate::binding::{Binder, Binding, BindingTable, MessageFn, Outcome, Record, FAILURES};
pub use crate::buffer::ByteAccumulator;
pub use crate::codec::Utf8Transcoder;
pub use crate::convert::{parse_date, parse_decimal, parse_int, BindFn, Converter, Value, DATE_FORMAT};
pub use crate::import::{FileFailure, ImportOptions, ImportSummary, Importer};
pub use crate::io::{chunk_stream, open_path, ChunkStream, SourceMeta};
pub use crate::schema::{EntrySpec, Schema, SchemaFile};
pub use crate::serialize::{Column, LineEncoder, RecordWriter};
pub use crate::stage::{BindStage, HeaderState, ParseStage, SerializeStage, StageExt};
pub use crate::tokenizer::{scan_row, Dialect, Phase, Row, RowTokenizer, Step, TokenizerState};

use thiserror::Error;

/// Error type returned by this crate when not using `anyhow`.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Buffer exceeds the limit of {limit} bytes ({requested} requested)")]
    BufferOverflow { limit: usize, requested: usize },
    #[error("[{line},{column}]: expected '{expected}' but got '{actual}' at byte {offset}")]
    Malformed {
        line: u64,
        column: u64,
        offset: u64,
        expected: char,
        actual: char,
    },
    #[error("Unterminated quoted field starting at byte {offset} on line {line}")]
    UnterminatedQuote { line: u64, offset: u64 },
    #[error("Input offered to a closed tokenizer")]
    TokenizerClosed,
    #[error("Invalid schema: {0}")]
    Schema(String),
    #[error("Unknown converter: {0}")]
    UnknownConverter(String),
    #[error("Output sink closed")]
    SinkClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

pub type CsvResult<T> = std::result::Result<T, IngestError>;
