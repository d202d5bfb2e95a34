use clap::{Arg, ArgAction, Command};
use csv_bind::{Dialect, ImportOptions, Importer, SchemaFile};
use std::path::PathBuf;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::BufWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("csv_bind=info"))?)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = Command::new("csv-import")
        .arg(Arg::new("schema").long("schema").required(true).value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("out").long("out").required(true).help("Directory receiving success.csv and error.csv").value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("concurrency").long("concurrency").help("Files processed at once (default: CPU count)").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("max-buffer").long("max-buffer").help("Maximum buffered bytes per file").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("chunk-size").long("chunk-size").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("delimiter").long("delimiter").default_value(","))
        .arg(Arg::new("files").action(ArgAction::Append).required(true).value_parser(clap::value_parser!(PathBuf)))
        .get_matches();

    let delimiter = matches
        .get_one::<String>("delimiter")
        .and_then(|d| d.bytes().next())
        .ok_or_else(|| anyhow::anyhow!("delimiter must be a single byte"))?;

    let mut options = ImportOptions::default();
    options.dialect = Dialect::default().with_delimiter(delimiter);
    if let Some(max) = matches.get_one::<usize>("max-buffer") {
        options.dialect = options.dialect.with_max_buffer(*max);
    }
    if let Some(n) = matches.get_one::<usize>("concurrency") {
        options.concurrency = *n;
    }
    if let Some(n) = matches.get_one::<usize>("chunk-size") {
        options.chunk_size = *n;
    }

    let schema_path = matches.get_one::<PathBuf>("schema").expect("required");
    let schema = SchemaFile::load(schema_path).await?.resolve(options.dialect)?;

    let out_dir = matches.get_one::<PathBuf>("out").expect("required");
    tokio::fs::create_dir_all(out_dir).await?;
    let success = BufWriter::new(File::create(out_dir.join("success.csv")).await?);
    let errors = BufWriter::new(File::create(out_dir.join("error.csv")).await?);

    let files: Vec<PathBuf> = matches.get_many::<PathBuf>("files").into_iter().flatten().cloned().collect();

    let start = Instant::now();
    let summary = Importer::new(schema, options).run(files, success, errors).await?;
    let elapsed = start.elapsed().as_secs_f64();

    println!(
        "files={} accepted={} rejected={} failed={}\nelapsed={:.1}s",
        summary.files,
        summary.accepted,
        summary.rejected,
        summary.failed.len(),
        elapsed
    );
    for failure in &summary.failed {
        eprintln!("{}: {}", failure.path.display(), failure.error);
    }
    Ok(())
}
