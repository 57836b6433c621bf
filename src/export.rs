// ABOUTME: Drives one table end-to-end: connection, chunks, CSV file, result
// ABOUTME: Converts every table-local error into a failed TableResult

use crate::chunk::ChunkReader;
use crate::error::{BackupError, ErrorKind};
use crate::inspect::TableDescriptor;
use crate::pool::ConnectionPool;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Per-run parameters shared by every table export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub schema: String,
    pub output_dir: PathBuf,
    pub chunk_size: usize,
    pub fetch_timeout: Duration,
    /// Timestamp shared by all files of one run, e.g. `20260807_143005`.
    pub run_stamp: String,
}

/// Terminal state of one table's export attempt.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportStatus {
    Succeeded,
    Failed { kind: ErrorKind, detail: String },
    Cancelled,
}

/// Outcome of one table's export. Created exactly once per table,
/// immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct TableResult {
    pub table: String,
    #[serde(flatten)]
    pub status: ExportStatus,
    pub rows_written: u64,
    pub bytes_written: u64,
    pub output_path: Option<PathBuf>,
    #[serde(serialize_with = "duration_secs")]
    pub elapsed: Duration,
}

fn duration_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl TableResult {
    pub fn succeeded(
        table: String,
        rows_written: u64,
        bytes_written: u64,
        output_path: PathBuf,
        elapsed: Duration,
    ) -> Self {
        Self {
            table,
            status: ExportStatus::Succeeded,
            rows_written,
            bytes_written,
            output_path: Some(output_path),
            elapsed,
        }
    }

    pub fn failed(
        table: String,
        error: &BackupError,
        output_path: Option<PathBuf>,
        elapsed: Duration,
    ) -> Self {
        Self {
            table,
            status: ExportStatus::Failed {
                kind: error.kind(),
                detail: error.to_string(),
            },
            rows_written: 0,
            bytes_written: 0,
            output_path,
            elapsed,
        }
    }

    pub fn cancelled(table: String, elapsed: Duration) -> Self {
        Self {
            table,
            status: ExportStatus::Cancelled,
            rows_written: 0,
            bytes_written: 0,
            output_path: None,
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExportStatus::Succeeded
    }
}

/// Export one table to one CSV file.
///
/// Never returns an error: any failure in this table's pipeline is caught
/// here and converted into a failed [`TableResult`], so one table's problem
/// can never abort its siblings. A partially written output file is kept on
/// failure to aid forensic inspection; its result is marked failed.
pub async fn export_table(
    pool: &ConnectionPool,
    table: &TableDescriptor,
    opts: &ExportOptions,
) -> TableResult {
    let started = Instant::now();
    let path = opts
        .output_dir
        .join(format!("{}_{}.csv", table.name, opts.run_stamp));

    match export_inner(pool, table, opts, &path).await {
        Ok((rows_written, bytes_written)) => {
            tracing::info!(
                "Exported '{}' to {} ({} rows)",
                table.qualified(&opts.schema),
                path.display(),
                rows_written
            );
            TableResult::succeeded(
                table.name.clone(),
                rows_written,
                bytes_written,
                path,
                started.elapsed(),
            )
        }
        Err(err) => {
            tracing::warn!("Export of '{}' failed: {}", table.qualified(&opts.schema), err);
            let partial = path.exists().then(|| path.clone());
            TableResult::failed(table.name.clone(), &err, partial, started.elapsed())
        }
    }
}

async fn export_inner(
    pool: &ConnectionPool,
    table: &TableDescriptor,
    opts: &ExportOptions,
    path: &Path,
) -> Result<(u64, u64), BackupError> {
    // Guard-scoped: released on every exit path, including cancellation
    let conn = pool.acquire().await?;

    let columns = conn.columns(&opts.schema, &table.name).await?;
    if columns.is_empty() {
        return Err(BackupError::Schema(format!(
            "table '{}' has no columns visible to this role",
            table.qualified(&opts.schema)
        )));
    }

    let file = std::fs::File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(&columns)?;

    let mut reader = ChunkReader::new(
        &*conn,
        &opts.schema,
        &table.name,
        &columns,
        opts.chunk_size,
        opts.fetch_timeout,
    );

    let mut rows_written: u64 = 0;
    while let Some(chunk) = reader.next_chunk().await? {
        for row in &chunk.rows {
            // NULL renders as an empty field
            writer.write_record(row.iter().map(|v| v.as_deref().unwrap_or("")))?;
        }
        rows_written += chunk.len() as u64;
        tracing::debug!(
            "  '{}': {} rows written so far",
            table.name,
            rows_written
        );
    }

    writer.flush().map_err(BackupError::from)?;
    drop(writer);
    let bytes_written = std::fs::metadata(path)?.len();

    Ok((rows_written, bytes_written))
}
