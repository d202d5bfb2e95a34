use crate::convert::{Converter, Value};
use crate::tokenizer::Row;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;

/// Record key holding the validation messages of a rejected row.
pub const FAILURES: &str = "failures";

pub type MessageFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How a field is turned into a value.
#[derive(Clone)]
pub enum Binder {
    /// A failed conversion leaves the field out of the record.
    Plain(Converter),
    /// A failed conversion is reported with `message(raw_text)`.
    Required {
        converter: Converter,
        message: MessageFn,
    },
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binder::Plain(c) => f.debug_tuple("Plain").field(c).finish(),
            Binder::Required { converter, .. } => {
                f.debug_struct("Required").field("converter", converter).finish()
            }
        }
    }
}

impl Binder {
    pub fn converter(&self) -> &Converter {
        match self {
            Binder::Plain(c) | Binder::Required { converter: c, .. } => c,
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Binder::Required { .. })
    }

    pub fn apply(&self, raw: Option<&[u8]>, errors: &mut Vec<String>) -> Option<Value> {
        let value = self.converter().bind(raw);
        if let (None, Binder::Required { message, .. }) = (&value, self) {
            let text = raw.map(String::from_utf8_lossy).unwrap_or_default();
            errors.push(message(&text));
        }
        value
    }
}

/// One column of a [`BindingTable`].
#[derive(Debug, Clone)]
pub struct Binding {
    pub source: String,
    pub target: Arc<str>,
    pub binder: Binder,
}

impl Binding {
    pub fn new(source: &str, target: &str, converter: Converter) -> Self {
        Self {
            source: source.to_string(),
            target: Arc::from(target),
            binder: Binder::Plain(converter),
        }
    }

    pub fn required<F>(source: &str, target: &str, converter: Converter, message: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            source: source.to_string(),
            target: Arc::from(target),
            binder: Binder::Required {
                converter,
                message: Arc::new(message),
            },
        }
    }
}

/// Bound values keyed by target name, in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    entries: Vec<(Arc<str>, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value under `key`.
    pub fn insert(&mut self, key: impl Into<Arc<str>>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn failures(&self) -> Option<&[String]> {
        self.get(FAILURES).and_then(Value::as_list)
    }
}

/// Result of binding one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accepted(Record),
    /// Raw text of every field plus a `failures` list.
    Rejected(Record),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }

    pub fn record(&self) -> &Record {
        match self {
            Outcome::Accepted(r) | Outcome::Rejected(r) => r,
        }
    }

    pub fn into_record(self) -> Record {
        match self {
            Outcome::Accepted(r) | Outcome::Rejected(r) => r,
        }
    }
}

/// Ordered bindings applied positionally to tokenized rows.
///
/// Immutable once built; share it between pipelines behind an `Arc`.
#[derive(Debug, Clone)]
pub struct BindingTable {
    bindings: Vec<Binding>,
    // source names joined by the delimiter
    header: Bytes,
}

impl BindingTable {
    /// Table for comma delimited input.
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self::with_delimiter(bindings, b',')
    }

    pub fn with_delimiter(bindings: Vec<Binding>, delimiter: u8) -> Self {
        let mut header = BytesMut::new();
        for (idx, binding) in bindings.iter().enumerate() {
            if idx > 0 {
                header.put_u8(delimiter);
            }
            header.extend_from_slice(binding.source.as_bytes());
        }
        Self {
            bindings,
            header: header.freeze(),
        }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Header line without its terminator.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// True when the row's input text equals the header line byte for byte.
    pub fn is_header(&self, row: &Row) -> bool {
        row.raw() == &self.header[..]
    }

    /// Bind `row`, collecting one message per failed required field.
    ///
    /// Missing trailing fields count as absent input; extra fields are ignored.
    pub fn bind(&self, row: &Row) -> (Record, Vec<String>) {
        let mut record = Record::new();
        let mut errors = Vec::new();
        for (idx, binding) in self.bindings.iter().enumerate() {
            if let Some(value) = binding.binder.apply(row.get(idx), &mut errors) {
                record.insert(binding.target.clone(), value);
            }
        }
        (record, errors)
    }

    /// Every present field as raw text, keyed by target name.
    pub fn bind_raw(&self, row: &Row) -> Record {
        let mut record = Record::new();
        for (idx, binding) in self.bindings.iter().enumerate() {
            if let Some(value) = Converter::Text.bind(row.get(idx)) {
                record.insert(binding.target.clone(), value);
            }
        }
        record
    }

    /// Bind `row`, falling back to its raw text plus failures when any
    /// required field does not convert.
    pub fn bind_row(&self, row: &Row) -> Outcome {
        let (record, errors) = self.bind(row);
        if errors.is_empty() {
            return Outcome::Accepted(record);
        }

        let mut raw = self.bind_raw(row);
        raw.insert(FAILURES, Value::List(errors));
        Outcome::Rejected(raw)
    }
}
