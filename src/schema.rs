//! Binding tables described in TOML.
//!
//! ```toml
//! default_binder = "string"
//! default_serializer = "string"
//!
//! [[entries]]
//! id = "id"                 # record key
//! name = "id"               # column header in the input
//! binder = "positive-int"
//! serializer = "int"
//! required = true
//! error = "Unable interpret '{value}' as ID"
//! ```
use crate::binding::{Binding, BindingTable};
use crate::convert::Converter;
use crate::serialize::{Column, RecordWriter};
use crate::tokenizer::Dialect;
use crate::{CsvResult, IngestError};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_MESSAGE: &str = "Unable to bind '{value}' to {field}";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    #[serde(default)]
    pub default_binder: Option<String>,
    #[serde(default)]
    pub default_serializer: Option<String>,
    pub entries: Vec<EntrySpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntrySpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub binder: Option<String>,
    #[serde(default)]
    pub serializer: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// `{value}` and `{field}` are replaced by the raw text and the id.
    #[serde(default)]
    pub error: Option<String>,
}

/// Everything a pipeline needs from a schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pub table: Arc<BindingTable>,
    pub output: Arc<RecordWriter>,
    pub errors: Arc<RecordWriter>,
}

impl Schema {
    /// Output writes every target back under its source name.
    pub fn from_table(table: BindingTable, dialect: Dialect) -> Self {
        let output = RecordWriter::for_table(&table, dialect);
        let errors = RecordWriter::errors_for_table(&table, dialect);
        Self {
            table: Arc::new(table),
            output: Arc::new(output),
            errors: Arc::new(errors),
        }
    }
}

impl SchemaFile {
    pub fn from_toml(text: &str) -> CsvResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub async fn load(path: &Path) -> CsvResult<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&text)
    }

    pub fn resolve(&self, dialect: Dialect) -> CsvResult<Schema> {
        if self.entries.is_empty() {
            return Err(IngestError::Schema("schema has no entries".into()));
        }

        let mut bindings = Vec::with_capacity(self.entries.len());
        let mut columns = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let binder = self.converter(entry, entry.binder.as_deref(), self.default_binder.as_deref(), "binder")?;
            let serializer = self.converter(
                entry,
                entry.serializer.as_deref(),
                self.default_serializer.as_deref(),
                "serializer",
            )?;

            bindings.push(if entry.required {
                let template = entry.error.clone().unwrap_or_else(|| DEFAULT_MESSAGE.to_string());
                let field = entry.id.clone();
                Binding::required(&entry.name, &entry.id, binder, move |value| {
                    render_message(&template, value, &field)
                })
            } else {
                Binding::new(&entry.name, &entry.id, binder)
            });
            columns.push(Column::new(&entry.id, &entry.name, serializer));
        }

        let table = BindingTable::with_delimiter(bindings, dialect.delimiter);
        let errors = RecordWriter::errors_for_table(&table, dialect);
        Ok(Schema {
            table: Arc::new(table),
            output: Arc::new(RecordWriter::new(columns, dialect)),
            errors: Arc::new(errors),
        })
    }

    fn converter(
        &self,
        entry: &EntrySpec,
        own: Option<&str>,
        default: Option<&str>,
        role: &str,
    ) -> CsvResult<Converter> {
        let name = own.or(default).ok_or_else(|| {
            IngestError::Schema(format!("entry '{}' has no {role} and there is no default", entry.id))
        })?;
        Converter::by_name(name)
    }
}

/// Substitute `{value}` and `{field}` in one pass, so placeholders inside
/// the substituted text are left alone.
fn render_message(template: &str, value: &str, field: &str) -> String {
    let mut out = String::with_capacity(template.len() + value.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        if let Some(after) = tail.strip_prefix("{value}") {
            out.push_str(value);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{field}") {
            out.push_str(field);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}
