//! Field converters shared by binding (text to value) and serialization
//! (value to text).
use crate::{CsvResult, IngestError};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Day/month/year, day and month unpadded, four digit year.
pub const DATE_FORMAT: &str = "%-d/%-m/%Y";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Decimal(BigDecimal),
    Date(NaiveDate),
    Text(String),
    List(Vec<String>),
}

impl Value {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&BigDecimal> {
        match self {
            Value::Decimal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            Value::Text(v) => f.write_str(v),
            Value::List(v) => f.write_str(&v.join(",")),
        }
    }
}

pub type BindFn = Arc<dyn Fn(Option<&[u8]>) -> Option<Value> + Send + Sync>;

/// A named conversion between field text and [`Value`].
///
/// Binding never fails loudly: text that cannot be converted yields `None`.
#[derive(Clone)]
pub enum Converter {
    Int,
    /// `Int` that also rejects negative numbers.
    PositiveInt,
    Decimal,
    Date,
    Text,
    /// Serialization only; renders a list of messages as one quoted field.
    List,
    Custom { name: Arc<str>, bind: BindFn },
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter({})", self.name())
    }
}

impl Converter {
    /// Look up a builtin converter by the name used in schema files.
    pub fn by_name(name: &str) -> CsvResult<Self> {
        Ok(match name {
            "int" | "integer" => Converter::Int,
            "positive-int" | "positive-integer" => Converter::PositiveInt,
            "decimal" => Converter::Decimal,
            "date" => Converter::Date,
            "string" | "text" => Converter::Text,
            "list" | "failures" => Converter::List,
            other => return Err(IngestError::UnknownConverter(other.to_string())),
        })
    }

    pub fn custom<F>(name: &str, bind: F) -> Self
    where
        F: Fn(Option<&[u8]>) -> Option<Value> + Send + Sync + 'static,
    {
        Converter::Custom {
            name: Arc::from(name),
            bind: Arc::new(bind),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Converter::Int => "int",
            Converter::PositiveInt => "positive-int",
            Converter::Decimal => "decimal",
            Converter::Date => "date",
            Converter::Text => "string",
            Converter::List => "list",
            Converter::Custom { name, .. } => name,
        }
    }

    /// Convert raw field bytes. `None` input means the column was missing.
    pub fn bind(&self, raw: Option<&[u8]>) -> Option<Value> {
        let raw = raw?;
        match self {
            Converter::Int => parse_int(raw).map(Value::Int),
            Converter::PositiveInt => parse_int(raw).filter(|v| *v >= 0).map(Value::Int),
            Converter::Decimal => parse_decimal(raw).map(Value::Decimal),
            Converter::Date => parse_date(raw).map(Value::Date),
            Converter::Text => Some(Value::Text(String::from_utf8_lossy(raw).into_owned())),
            Converter::List => None,
            Converter::Custom { bind, .. } => bind(Some(raw)),
        }
    }

    /// Field text for a value, before any quoting.
    pub fn render(&self, value: &Value) -> String {
        match (self, value) {
            (Converter::List, Value::List(items)) => items.join(","),
            (Converter::Date, Value::Date(d)) => d.format(DATE_FORMAT).to_string(),
            _ => value.to_string(),
        }
    }
}

fn utf8(raw: &[u8]) -> Option<&str> {
    std::str::from_utf8(raw).ok().filter(|s| !s.is_empty())
}

pub fn parse_int(raw: &[u8]) -> Option<i32> {
    utf8(raw)?.parse().ok()
}

pub fn parse_decimal(raw: &[u8]) -> Option<BigDecimal> {
    BigDecimal::from_str(utf8(raw)?).ok()
}

/// Strict `d/M/uuuu`: no two digit years, no rolling over into the next
/// month or year.
pub fn parse_date(raw: &[u8]) -> Option<NaiveDate> {
    let text = utf8(raw)?;
    let mut parts = text.split('/');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let numeric = |s: &str, min: usize, max: usize| {
        (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
    };
    if !numeric(day, 1, 2) || !numeric(month, 1, 2) || !numeric(year, 4, 4) {
        return None;
    }

    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}
