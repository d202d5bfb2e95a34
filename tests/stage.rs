use bytes::Bytes;
use csv_bind::{
    chunk_stream, Binding, BindingTable, Converter, Dialect, HeaderState, IngestError, Outcome,
    RecordWriter, SourceMeta, StageExt, Value,
};
use futures::stream::{self, StreamExt};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn chunks(parts: &[&'static str]) -> impl futures::Stream<Item = io::Result<Bytes>> + Unpin {
    stream::iter(
        parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect::<Vec<_>>(),
    )
}

fn table() -> Arc<BindingTable> {
    Arc::new(BindingTable::new(vec![
        Binding::required("id", "id", Converter::PositiveInt, |v| {
            format!("Unable interpret '{v}' as id")
        }),
        Binding::new("name", "name", Converter::Text),
        Binding::new("amount", "amount", Converter::Decimal),
    ]))
}

#[tokio::test]
async fn parse_stage_flushes_unterminated_tail() {
    let rows: Vec<_> = chunks(&["a,b\nc", ",d\ne,", "f"])
        .parse_rows(Dialect::default())
        .map(|r| r.unwrap().len())
        .collect()
        .await;
    assert_eq!(rows, vec![2, 2, 2]);
}

#[tokio::test]
async fn parse_stage_pulls_only_on_demand() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();
    let upstream = chunks(&["a\nb\nc\n", "d\n", "e\n"]).inspect(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut rows = upstream.parse_rows(Dialect::default());

    rows.next().await.unwrap().unwrap();
    assert_eq!(pulled.load(Ordering::SeqCst), 1);
    rows.next().await.unwrap().unwrap();
    rows.next().await.unwrap().unwrap();
    assert_eq!(pulled.load(Ordering::SeqCst), 1);
    rows.next().await.unwrap().unwrap();
    assert_eq!(pulled.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn upstream_error_fails_without_flush() {
    let upstream = stream::iter(vec![
        Ok(Bytes::from_static(b"a,b\nc,d")),
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
        Ok(Bytes::from_static(b"\n")),
    ]);
    let items: Vec<_> = upstream.parse_rows(Dialect::default()).collect().await;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(items[1], Err(IngestError::Io(_))));
}

#[tokio::test]
async fn overflow_ends_the_stage() {
    let items: Vec<_> = chunks(&["abcdef", "ghijkl", "\n"])
        .parse_rows(Dialect::default().with_max_buffer(8))
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(IngestError::BufferOverflow { .. })));
}

#[tokio::test]
async fn bind_stage_skips_leading_header_only() {
    let mut outcomes = chunks(&["id,name,amount\n1,Alice,10.50\nid,name,amount\n"])
        .parse_rows(Dialect::default())
        .bind_rows(table());
    assert_eq!(outcomes.state(), HeaderState::AwaitingHeader);

    let first = outcomes.next().await.unwrap().unwrap();
    assert_eq!(outcomes.state(), HeaderState::Streaming);
    assert_eq!(first.record().get("id"), Some(&Value::Int(1)));

    // a repeated header is just a row that fails validation
    let second = outcomes.next().await.unwrap().unwrap();
    assert!(!second.is_accepted());
    assert!(outcomes.next().await.is_none());
}

#[tokio::test]
async fn bind_stage_without_header() {
    let outcomes: Vec<Outcome> = chunks(&["1,Alice,10.50\n", "x,Bob,20\n"])
        .parse_rows(Dialect::default())
        .bind_rows(table())
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].is_accepted());
    let failures = outcomes[1].record().failures().unwrap();
    assert_eq!(failures, ["Unable interpret 'x' as id".to_string()]);
}

#[tokio::test]
async fn serialize_stage_writes_header_once() {
    let table = table();
    let writer = Arc::new(RecordWriter::for_table(&table, Dialect::default()));
    let records: Vec<_> = chunks(&["1,Alice,10.50\n2,Bob,\n"])
        .parse_rows(Dialect::default())
        .bind_rows(table)
        .map(|o| o.unwrap().into_record())
        .collect()
        .await;

    let lines: Vec<Bytes> = stream::iter(records)
        .serialize_records(writer.clone())
        .collect()
        .await;
    assert_eq!(lines.len(), 2);
    assert_eq!(&lines[0][..], b"id,name,amount\n1,Alice,10.50\n");
    assert_eq!(&lines[1][..], b"2,Bob,\n");

    let empty: Vec<Bytes> = stream::iter(Vec::<csv_bind::Record>::new()).serialize_records(writer).collect().await;
    assert!(empty.is_empty());
}

#[tokio::test]
async fn transcodes_latin1_sources() {
    let raw: &'static [u8] = b"caf\xe9,1\n";
    let meta = SourceMeta::default().with_charset(encoding_rs::WINDOWS_1252);
    let rows: Vec<_> = chunk_stream(raw, &meta, 64)
        .parse_rows(Dialect::default())
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), Some("café".as_bytes()));
}
