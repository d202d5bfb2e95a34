use crate::binding::{BindingTable, Record, FAILURES};
use crate::convert::{Converter, Value};
use crate::tokenizer::{Dialect, CR, LF};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// One output column: the record key it reads and the header it is written
/// under.
#[derive(Debug, Clone)]
pub struct Column {
    pub key: Arc<str>,
    pub header: String,
    pub converter: Converter,
}

impl Column {
    pub fn new(key: &str, header: &str, converter: Converter) -> Self {
        Self {
            key: Arc::from(key),
            header: header.to_string(),
            converter,
        }
    }
}

/// Renders records as delimited lines.
///
/// Text that contains the delimiter, the quote byte or a line break is quoted
/// so the output tokenizes back to the same values.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    columns: Vec<Column>,
    dialect: Dialect,
}

impl RecordWriter {
    pub fn new(columns: Vec<Column>, dialect: Dialect) -> Self {
        Self { columns, dialect }
    }

    /// Columns mirroring the table: each target is written back under its
    /// source name with the binding's converter.
    pub fn for_table(table: &BindingTable, dialect: Dialect) -> Self {
        let columns = table
            .bindings()
            .iter()
            .map(|b| Column {
                key: b.target.clone(),
                header: b.source.clone(),
                converter: b.binder.converter().clone(),
            })
            .collect();
        Self::new(columns, dialect)
    }

    /// Writer for rejected records: raw text of every column plus `failures`.
    pub fn errors_for_table(table: &BindingTable, dialect: Dialect) -> Self {
        let mut columns: Vec<Column> = table
            .bindings()
            .iter()
            .map(|b| Column {
                key: b.target.clone(),
                header: b.source.clone(),
                converter: Converter::Text,
            })
            .collect();
        columns.push(Column::new(FAILURES, FAILURES, Converter::List));
        Self::new(columns, dialect)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn header(&self) -> Bytes {
        let mut out = BytesMut::new();
        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                out.put_u8(self.dialect.delimiter);
            }
            self.put_text(&mut out, &column.header);
        }
        out.put_u8(LF);
        out.freeze()
    }

    pub fn line(&self, record: &Record) -> Bytes {
        let mut out = BytesMut::new();
        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                out.put_u8(self.dialect.delimiter);
            }
            match (record.get(&column.key), &column.converter) {
                (None, _) => {}
                (Some(Value::List(items)), Converter::List) => self.put_list(&mut out, items),
                (Some(value), converter) => self.put_text(&mut out, &converter.render(value)),
            }
        }
        out.put_u8(LF);
        out.freeze()
    }

    fn put_text(&self, out: &mut BytesMut, text: &str) {
        let d = &self.dialect;
        let needs_quotes = text
            .bytes()
            .any(|b| b == d.delimiter || b == d.quote || b == CR || b == LF);
        if needs_quotes {
            self.put_quoted(out, std::iter::once(text));
        } else {
            out.put_slice(text.as_bytes());
        }
    }

    // always quoted, messages joined with ','
    fn put_list(&self, out: &mut BytesMut, items: &[String]) {
        if !items.is_empty() {
            self.put_quoted(out, items.iter().map(String::as_str));
        }
    }

    fn put_quoted<'a>(&self, out: &mut BytesMut, parts: impl Iterator<Item = &'a str>) {
        let d = &self.dialect;
        out.put_u8(d.quote);
        for (idx, part) in parts.enumerate() {
            if idx > 0 {
                out.put_u8(b',');
            }
            for b in part.bytes() {
                if b == d.quote {
                    out.put_u8(d.escape);
                }
                out.put_u8(b);
            }
        }
        out.put_u8(d.quote);
    }
}

/// Prepends the header to the first line it encodes.
#[derive(Debug, Clone)]
pub struct LineEncoder {
    writer: Arc<RecordWriter>,
    header_written: bool,
}

impl LineEncoder {
    pub fn new(writer: Arc<RecordWriter>) -> Self {
        Self {
            writer,
            header_written: false,
        }
    }

    pub fn encode(&mut self, record: &Record) -> Bytes {
        let line = self.writer.line(record);
        if self.header_written {
            return line;
        }
        self.header_written = true;
        let header = self.writer.header();
        let mut out = BytesMut::with_capacity(header.len() + line.len());
        out.put_slice(&header);
        out.put_slice(&line);
        out.freeze()
    }
}
