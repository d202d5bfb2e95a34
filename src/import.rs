//! Runs one parse and bind pipeline per input file, several at a time, and
//! writes accepted and rejected records to two sinks.
use crate::binding::Outcome;
use crate::io::open_path;
use crate::schema::Schema;
use crate::serialize::LineEncoder;
use crate::stage::StageExt;
use crate::tokenizer::Dialect;
use crate::{CsvResult, IngestError};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub dialect: Dialect,
    /// Files processed at the same time.
    pub concurrency: usize,
    /// Upper bound on the size of each chunk read from a file.
    pub chunk_size: usize,
    /// Outcomes buffered between the pipelines and the writer.
    pub channel_capacity: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            concurrency: num_cpus::get().max(1),
            chunk_size: 2 * 1024,
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: IngestError,
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub files: usize,
    pub accepted: u64,
    pub rejected: u64,
    /// Files aborted by a fatal error. Outcomes they produced before the
    /// error have already been written.
    pub failed: Vec<FileFailure>,
}

pub struct Importer {
    schema: Schema,
    options: ImportOptions,
}

impl Importer {
    pub fn new(schema: Schema, options: ImportOptions) -> Self {
        Self { schema, options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Import every file, writing accepted records to `accepted` and
    /// rejected ones to `rejected`.
    ///
    /// A fatal error in one file is recorded in the summary; the remaining
    /// files carry on. Only a failing sink aborts the whole run.
    pub async fn run<A, R>(&self, paths: Vec<PathBuf>, accepted: A, rejected: R) -> CsvResult<ImportSummary>
    where
        A: AsyncWrite + Unpin,
        R: AsyncWrite + Unpin,
    {
        let files = paths.len();
        tracing::info!(files, concurrency = self.options.concurrency, "starting import");
        let (tx, rx) = mpsc::channel(self.options.channel_capacity.max(1));

        let producers = async move {
            let results = stream::iter(paths)
                .map(|path| {
                    let tx = tx.clone();
                    async move {
                        let result = self.import_file(&path, tx).await;
                        (path, result)
                    }
                })
                .buffer_unordered(self.options.concurrency.max(1))
                .collect::<Vec<_>>()
                .await;
            drop(tx);
            results
        };
        let consumer = self.write_outcomes(rx, accepted, rejected);

        let (results, written) = tokio::join!(producers, consumer);
        let (accepted, rejected) = written?;

        let mut summary = ImportSummary {
            files,
            accepted,
            rejected,
            failed: Vec::new(),
        };
        for (path, result) in results {
            if let Err(error) = result {
                tracing::warn!(path = %path.display(), %error, "file aborted");
                summary.failed.push(FileFailure { path, error });
            }
        }
        tracing::info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            failed = summary.failed.len(),
            "import finished"
        );
        Ok(summary)
    }

    async fn import_file(&self, path: &Path, tx: mpsc::Sender<Outcome>) -> CsvResult<u64> {
        tracing::debug!(path = %path.display(), "import started");
        let (chunks, _meta) = open_path(path, self.options.chunk_size).await?;
        let mut outcomes = chunks
            .parse_rows(self.options.dialect)
            .bind_rows(self.schema.table.clone());

        let mut rows = 0u64;
        while let Some(outcome) = outcomes.next().await {
            tx.send(outcome?).await.map_err(|_| IngestError::SinkClosed)?;
            rows += 1;
        }
        tracing::info!(path = %path.display(), rows, "file imported");
        Ok(rows)
    }

    async fn write_outcomes<A, R>(
        &self,
        mut rx: mpsc::Receiver<Outcome>,
        mut accepted: A,
        mut rejected: R,
    ) -> CsvResult<(u64, u64)>
    where
        A: AsyncWrite + Unpin,
        R: AsyncWrite + Unpin,
    {
        let mut ok_lines = LineEncoder::new(self.schema.output.clone());
        let mut err_lines = LineEncoder::new(self.schema.errors.clone());
        let (mut ok, mut err) = (0u64, 0u64);

        let written: CsvResult<()> = async {
            while let Some(outcome) = rx.recv().await {
                match outcome {
                    Outcome::Accepted(record) => {
                        accepted.write_all(&ok_lines.encode(&record)).await?;
                        ok += 1;
                    }
                    Outcome::Rejected(record) => {
                        rejected.write_all(&err_lines.encode(&record)).await?;
                        err += 1;
                    }
                }
            }
            accepted.flush().await?;
            rejected.flush().await?;
            Ok(())
        }
        .await;

        // closing the channel lets blocked pipelines fail with SinkClosed
        rx.close();
        written.map(|_| (ok, err))
    }
}
