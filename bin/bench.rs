use clap::{Arg, ArgAction, Command};
use crc32fast::Hasher as Crc32;
use csv_async::{AsyncReaderBuilder, ByteRecord};
use csv_bind::{open_path, Dialect, StageExt};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio_util::io::StreamReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("bench")
        .arg(Arg::new("path").long("path").required(true).value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("verify").long("verify").help("CRC32 over every field").action(ArgAction::SetTrue))
        .arg(Arg::new("baseline").long("baseline").help("Also parse with csv-async and compare row count and CRC").action(ArgAction::SetTrue))
        .arg(Arg::new("max-buffer").long("max-buffer").default_value("1048576").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("chunk-size").long("chunk-size").default_value("65536").value_parser(clap::value_parser!(usize)))
        .get_matches();

    let path = matches.get_one::<PathBuf>("path").expect("required");
    let verify = matches.get_flag("verify") || matches.get_flag("baseline");
    let dialect = Dialect::default().with_max_buffer(*matches.get_one::<usize>("max-buffer").expect("defaulted"));
    let chunk_size = *matches.get_one::<usize>("chunk-size").expect("defaulted");

    let start = Instant::now();
    let (chunks, _meta) = open_path(path, chunk_size).await?;
    let mut rows = chunks.parse_rows(dialect);
    let mut count = 0u64;
    let mut crc = Crc32::new();
    while let Some(row) = rows.next().await {
        let row = row?;
        count += 1;
        if verify {
            digest(&mut crc, row.iter());
        }
    }
    report("tokenizer", path, count, verify.then(|| crc.finalize()), start);

    if matches.get_flag("baseline") {
        let start = Instant::now();
        let (chunks, _meta) = open_path(path, chunk_size).await?;
        let reader = StreamReader::new(chunks);
        let mut rdr = AsyncReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .escape(Some(dialect.escape))
            .double_quote(false)
            .buffer_capacity(1 << 20)
            .create_reader(reader);
        let mut record = ByteRecord::new();
        let mut count = 0u64;
        let mut crc = Crc32::new();
        while rdr.read_byte_record(&mut record).await? {
            count += 1;
            digest(&mut crc, record.iter());
        }
        report("csv-async", path, count, Some(crc.finalize()), start);
    }
    Ok(())
}

// fields separated by the unit separator
fn digest<'a>(crc: &mut Crc32, fields: impl Iterator<Item = &'a [u8]>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            crc.update(&[0x1f]);
        }
        crc.update(field);
    }
}

fn report(name: &str, path: &Path, rows: u64, crc: Option<u32>, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    let rps = rows as f64 / elapsed;
    match crc {
        Some(d) => println!(
            "[{name}] source={} rows={rows} crc=0x{d:08x}\nelapsed={elapsed:.1}s rows/sec={rps:.0}",
            path.display()
        ),
        None => println!("[{name}] source={} rows={rows}\nelapsed={elapsed:.1}s rows/sec={rps:.0}", path.display()),
    }
}
