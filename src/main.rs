// ABOUTME: CLI entry point for postgres-table-backup
// ABOUTME: Resolves config, wires cancellation, runs the pipeline, reports

use clap::Parser;
use postgres_table_backup::config::{BackupConfig, FileConfig};
use postgres_table_backup::postgres::PgConnectionFactory;
use postgres_table_backup::scheduler;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "postgres-table-backup")]
#[command(about = "Back up every table of a PostgreSQL schema to local CSV files", long_about = None)]
struct Cli {
    /// Path to a TOML config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Database host
    #[arg(long)]
    host: Option<String>,
    /// Database port
    #[arg(long)]
    port: Option<u16>,
    /// Database name
    #[arg(long)]
    database: Option<String>,
    /// Database user
    #[arg(long)]
    user: Option<String>,
    /// Schema to back up
    #[arg(long)]
    schema: Option<String>,
    /// Directory the CSV files are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Maximum live database connections
    #[arg(long)]
    max_connections: Option<usize>,
    /// Maximum table exports running at once
    #[arg(long)]
    max_concurrent: Option<usize>,
    /// Rows fetched per chunk
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Back up only these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    include_tables: Option<Vec<String>>,
    /// Skip these tables (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_tables: Option<Vec<String>>,
    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut file = match cli.config.as_deref() {
        Some(path) => FileConfig::from_path(path)?,
        None => FileConfig::default(),
    };

    // CLI flags take precedence over file values; the password comes from
    // the file or DB_PASSWORD, never a flag, so it stays out of shell
    // history and process listings.
    file.host = cli.host.or(file.host);
    file.port = cli.port.or(file.port);
    file.database = cli.database.or(file.database);
    file.user = cli.user.or(file.user);
    file.schema = cli.schema.or(file.schema);
    file.output_dir = cli.output_dir.or(file.output_dir);
    file.max_connections = cli.max_connections.or(file.max_connections);
    file.max_concurrent = cli.max_concurrent.or(file.max_concurrent);
    file.chunk_size = cli.chunk_size.or(file.chunk_size);
    file.include_tables = cli.include_tables.or(file.include_tables);
    file.exclude_tables = cli.exclude_tables.or(file.exclude_tables);

    let config = BackupConfig::resolve(file)?;
    let factory = Arc::new(PgConnectionFactory::new(&config));

    // Ctrl-C cancels the run; in-flight tables stop at their next
    // suspension point and the report still covers every table
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling outstanding table exports...");
            signal_token.cancel();
        }
    });

    let report = scheduler::run_backup(&config, factory, token).await?;

    print!("{}", report.summary());

    if let Some(path) = cli.report {
        report.save(&path)?;
        tracing::info!("Run report written to {}", path.display());
    }

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
