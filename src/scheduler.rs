// ABOUTME: Orchestrates a full run: discovery, bounded fan-out, aggregation
// ABOUTME: Guarantees exactly one result per discovered table, even on cancel

use crate::config::BackupConfig;
use crate::error::BackupError;
use crate::export::{export_table, ExportOptions, TableResult};
use crate::filter::TableFilter;
use crate::inspect::SchemaInspector;
use crate::pool::{ConnectionPool, PoolConfig};
use crate::report::{RunReport, RunReporter};
use crate::source::ConnectionFactory;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Run the whole backup pipeline against `factory`'s database.
///
/// Fatal errors (bad config, schema enumeration failure, unusable output
/// directory) abort before any table work starts. Once fan-out begins,
/// every failure is local to one table and the run always completes with a
/// [`RunReport`] carrying one entry per discovered table.
///
/// Concurrency: at most `max_concurrent` exports are in flight at once, on
/// a single logical worker interleaving at I/O suspension points. Each
/// admitted export separately contends for one of `max_connections` pooled
/// connections, so the pool bound further restricts effective parallelism
/// when it is the smaller of the two.
///
/// Cancelling `token` stops admitting new tables, drops in-flight exports
/// at their next suspension point (their pooled connections are released by
/// guard drop), and still returns a report in which the interrupted tables
/// are marked cancelled rather than omitted.
pub async fn run_backup(
    config: &BackupConfig,
    factory: Arc<dyn ConnectionFactory>,
    token: CancellationToken,
) -> Result<RunReport, BackupError> {
    let started = Instant::now();

    let pool = ConnectionPool::new(
        factory,
        PoolConfig {
            max_size: config.max_connections,
            acquire_timeout: config.acquire_timeout,
        },
    );

    let filter = TableFilter::new(config.include_tables.clone(), config.exclude_tables.clone())?;
    let inspector = SchemaInspector::new(&pool);
    let mut tables = inspector.discover(&config.schema, &filter).await?;

    if tables.is_empty() {
        tracing::warn!("No tables to back up in schema '{}'", config.schema);
        return Ok(RunReporter::new().finish(started.elapsed()));
    }

    // Largest first: long-running exports start as early as possible
    // instead of getting stranded behind a burst of small tables at the
    // tail of the queue.
    tables.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));

    std::fs::create_dir_all(&config.output_dir)?;

    let opts = Arc::new(ExportOptions {
        schema: config.schema.clone(),
        output_dir: config.output_dir.clone(),
        chunk_size: config.chunk_size,
        fetch_timeout: config.fetch_timeout,
        run_stamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
    });

    let total = tables.len();
    tracing::info!(
        "Starting backup of {} tables (max {} concurrent, pool size {})",
        total,
        config.max_concurrent,
        pool.max_size()
    );

    let mut completed = stream::iter(tables.into_iter().map(|table| {
        let pool = pool.clone();
        let opts = Arc::clone(&opts);
        let token = token.clone();
        async move {
            let table_started = Instant::now();
            tokio::select! {
                // Checked first so an already-cancelled run never starts
                // new table work
                biased;
                _ = token.cancelled() => {
                    tracing::warn!("Export of '{}' cancelled", table.name);
                    TableResult::cancelled(table.name.clone(), table_started.elapsed())
                }
                result = export_table(&pool, &table, &opts) => result,
            }
        }
    }))
    .buffer_unordered(config.max_concurrent);

    // Drain every admitted task; partial completion never drops a result.
    let mut reporter = RunReporter::new();
    while let Some(result) = completed.next().await {
        reporter.record(result);
        tracing::debug!("{}/{} tables done", reporter.results_recorded(), total);
    }
    drop(completed);

    let report = reporter.finish(started.elapsed());
    tracing::info!(
        "Backup complete: {}/{} tables succeeded",
        report.succeeded,
        total
    );

    Ok(report)
}
