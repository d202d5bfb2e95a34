use bigdecimal::BigDecimal;
use bytes::Bytes;
use chrono::NaiveDate;
use csv_bind::{
    Binding, BindingTable, Converter, Dialect, Outcome, Record, RecordWriter, Row, SchemaFile, Value,
    FAILURES,
};
use std::str::FromStr;

fn row(fields: &[&str]) -> Row {
    Row::new(
        fields.iter().map(|f| Bytes::copy_from_slice(f.as_bytes())).collect(),
        1,
    )
    .with_raw(Bytes::from(fields.join(",")))
}

fn bind(converter: &Converter, raw: Option<&str>) -> Option<Value> {
    converter.bind(raw.map(str::as_bytes))
}

fn decimal(text: &str) -> Value {
    Value::Decimal(BigDecimal::from_str(text).unwrap())
}

#[test]
fn positive_int_converter() {
    let c = Converter::PositiveInt;
    for raw in [None, Some(""), Some("-1"), Some("1.0"), Some("one"), Some("3000000000")] {
        assert_eq!(bind(&c, raw), None, "{raw:?}");
    }
    assert_eq!(bind(&c, Some("1")), Some(Value::Int(1)));
    assert_eq!(bind(&c, Some("1000000")), Some(Value::Int(1_000_000)));
    assert_eq!(bind(&c, Some("0")), Some(Value::Int(0)));
}

#[test]
fn int_converter_accepts_negatives() {
    let c = Converter::Int;
    assert_eq!(bind(&c, Some("-1")), Some(Value::Int(-1)));
    assert_eq!(bind(&c, Some("1000000")), Some(Value::Int(1_000_000)));
    for raw in [None, Some(""), Some("1.0"), Some("one")] {
        assert_eq!(bind(&c, raw), None, "{raw:?}");
    }
}

#[test]
fn string_converter_is_identity() {
    let c = Converter::Text;
    assert_eq!(bind(&c, None), None);
    assert_eq!(bind(&c, Some("")), Some(Value::Text(String::new())));
    assert_eq!(bind(&c, Some("text")), Some(Value::Text("text".into())));
}

#[test]
fn date_converter_is_strict() {
    let c = Converter::Date;
    for raw in [None, Some(""), Some("1"), Some("text"), Some("1/1/1"), Some("1/13/2018"), Some("34/11/2018"), Some("29/2/2019")] {
        assert_eq!(bind(&c, raw), None, "{raw:?}");
    }
    let date = NaiveDate::from_ymd_opt(2018, 10, 10).unwrap();
    let value = bind(&c, Some("10/10/2018")).unwrap();
    assert_eq!(value, Value::Date(date));
    assert_eq!(c.render(&value), "10/10/2018");
    assert_eq!(bind(&c, Some("1/2/2018")).and_then(|v| v.as_date()), NaiveDate::from_ymd_opt(2018, 2, 1));
    assert_eq!(c.render(&Value::Date(NaiveDate::from_ymd_opt(2018, 2, 1).unwrap())), "1/2/2018");
}

#[test]
fn decimal_converter_round_trips() {
    let c = Converter::Decimal;
    for raw in [None, Some(""), Some("text"), Some("1/1/1"), Some(",0000"), Some(".1.3.4")] {
        assert_eq!(bind(&c, raw), None, "{raw:?}");
    }
    for text in ["1", "-100", "1000000", "2000.10", "0.2222222", "10.50"] {
        let value = bind(&c, Some(text)).unwrap();
        assert_eq!(value, decimal(text));
        assert_eq!(c.render(&value), text);
    }
}

#[test]
fn unknown_converter_name() {
    assert!(Converter::by_name("uuid").is_err());
    assert_eq!(Converter::by_name("positive-int").unwrap().name(), "positive-int");
}

fn scenario_table() -> BindingTable {
    BindingTable::new(vec![
        Binding::required("id", "id", Converter::PositiveInt, |v| {
            format!("Unable interpret '{v}' as id")
        }),
        Binding::new("name", "name", Converter::Text),
        Binding::new("amount", "amount", Converter::Decimal),
    ])
}

#[test]
fn accepted_and_rejected_rows() {
    let table = scenario_table();

    let Outcome::Accepted(record) = table.bind_row(&row(&["1", "Alice", "10.50"])) else {
        panic!("expected accepted");
    };
    assert_eq!(record.get("id"), Some(&Value::Int(1)));
    assert_eq!(record.get("name"), Some(&Value::Text("Alice".into())));
    assert_eq!(record.get("amount"), Some(&decimal("10.50")));

    let Outcome::Rejected(record) = table.bind_row(&row(&["x", "Bob", "20"])) else {
        panic!("expected rejected");
    };
    assert_eq!(record.get("id"), Some(&Value::Text("x".into())));
    assert_eq!(record.get("amount"), Some(&Value::Text("20".into())));
    let failures = record.failures().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("id"));
}

#[test]
fn required_field_missing_from_row() {
    let table = scenario_table();
    let (record, errors) = table.bind(&row(&[]));
    assert_eq!(errors.len(), 1);
    assert!(!record.contains("id"));
    assert!(record.is_empty());
}

#[test]
fn optional_failures_are_dropped_silently() {
    let table = scenario_table();
    let (record, errors) = table.bind(&row(&["7", "", "n/a", "extra"]));
    assert!(errors.is_empty());
    assert_eq!(record.len(), 2);
    assert_eq!(record.get("name"), Some(&Value::Text(String::new())));
    assert!(!record.contains("amount"));
}

#[test]
fn header_detection() {
    let table = scenario_table();
    assert!(table.is_header(&row(&["id", "name", "amount"])));
    assert!(!table.is_header(&row(&["id", "name"])));

    // same fields, different bytes
    let quoted = Row::new(row(&["id", "name", "amount"]).into_fields(), 1)
        .with_raw(Bytes::from_static(b"\"id\",name,amount"));
    assert!(!table.is_header(&quoted));
    assert_eq!(table.header(), b"id,name,amount");
}

#[test]
fn header_uses_table_delimiter() {
    let table = BindingTable::with_delimiter(
        vec![
            Binding::new("a", "a", Converter::Text),
            Binding::new("b", "b", Converter::Text),
        ],
        b';',
    );
    assert_eq!(table.header(), b"a;b");
    let header = Row::new(Vec::new(), 1).with_raw(Bytes::from_static(b"a;b"));
    assert!(table.is_header(&header));
}

#[test]
fn writer_renders_records_and_failures() {
    let table = scenario_table();
    let dialect = Dialect::default();
    let out = RecordWriter::for_table(&table, dialect);
    let errors = RecordWriter::errors_for_table(&table, dialect);

    assert_eq!(&out.header()[..], b"id,name,amount\n");
    assert_eq!(&errors.header()[..], b"id,name,amount,failures\n");

    let mut record = Record::new();
    record.insert("id", Value::Int(3));
    record.insert("amount", decimal("2000.10"));
    assert_eq!(&out.line(&record)[..], b"3,,2000.10\n");

    record.insert("name", Value::Text("Smith, \"J\"".into()));
    assert_eq!(&out.line(&record)[..], b"3,\"Smith, \\\"J\\\"\",2000.10\n");

    let mut rejected = Record::new();
    rejected.insert("id", Value::Text("x".into()));
    rejected.insert(
        FAILURES,
        Value::List(vec!["bad 'x'".into(), "say \"no\"".into()]),
    );
    assert_eq!(
        &errors.line(&rejected)[..],
        b"x,,,\"bad 'x',say \\\"no\\\"\"\n"
    );
}

#[test]
fn schema_file_with_defaults() {
    let schema = SchemaFile::from_toml(
        r#"
        default_binder = "string"
        default_serializer = "string"

        [[entries]]
        id = "id"
        name = "ID"
        binder = "positive-int"
        serializer = "int"
        required = true
        error = "Unable interpret '{value}' as {field}"

        [[entries]]
        id = "col1"
        name = "Column 1"
        "#,
    )
    .unwrap()
    .resolve(Dialect::default())
    .unwrap();

    assert_eq!(schema.table.bindings().len(), 2);
    assert!(schema.table.bindings()[0].binder.is_required());
    assert_eq!(schema.table.bindings()[1].binder.converter().name(), "string");
    assert_eq!(&schema.output.header()[..], b"ID,Column 1\n");

    let Outcome::Rejected(record) = schema.table.bind_row(&row(&["-4", "a"])) else {
        panic!("expected rejected");
    };
    assert_eq!(record.failures().unwrap(), ["Unable interpret '-4' as id".to_string()]);
}

#[test]
fn message_placeholders_are_not_expanded_twice() {
    let schema = SchemaFile::from_toml(
        r#"
        [[entries]]
        id = "id"
        name = "id"
        binder = "positive-int"
        serializer = "int"
        required = true
        error = "bad '{value}' for {field}"
        "#,
    )
    .unwrap()
    .resolve(Dialect::default())
    .unwrap();

    let Outcome::Rejected(record) = schema.table.bind_row(&row(&["{field}"])) else {
        panic!("expected rejected");
    };
    assert_eq!(record.failures().unwrap(), ["bad '{field}' for id".to_string()]);

    let Outcome::Rejected(record) = schema.table.bind_row(&row(&["{x"])) else {
        panic!("expected rejected");
    };
    assert_eq!(record.failures().unwrap(), ["bad '{x' for id".to_string()]);
}

#[test]
fn schema_file_errors() {
    let no_binder = SchemaFile::from_toml("[[entries]]\nid = \"a\"\nname = \"a\"\n").unwrap();
    assert!(no_binder.resolve(Dialect::default()).is_err());

    let bad_name =
        SchemaFile::from_toml("[[entries]]\nid = \"a\"\nname = \"a\"\nbinder = \"x\"\nserializer = \"string\"\n")
            .unwrap();
    assert!(bad_name.resolve(Dialect::default()).is_err());

    assert!(SchemaFile::from_toml("entries = []\nother = 1\n").is_err());
}
