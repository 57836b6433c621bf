// ABOUTME: Source database abstraction used by the backup pipeline
// ABOUTME: Defines the connection trait the pool hands out and tests fake

use crate::error::BackupError;
use async_trait::async_trait;

/// One row of a table, values rendered to text in column order.
/// `None` is SQL NULL and serializes to an empty CSV field.
pub type Row = Vec<Option<String>>;

/// Advisory size statistics for a table, taken from catalog metadata.
///
/// These numbers drive scheduling order and log output only; correctness
/// never depends on them being accurate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableStats {
    pub row_estimate: i64,
    pub size_bytes: i64,
}

/// A live connection to the source database.
///
/// The concrete implementation for PostgreSQL lives in
/// [`crate::postgres::source`]; tests substitute an in-memory backend.
#[async_trait]
pub trait SourceConnection: Send + Sync {
    /// List base table names in `schema`, in name order.
    ///
    /// Fails with [`BackupError::Schema`] if the schema does not exist or
    /// is not visible to the configured role.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, BackupError>;

    /// Best-effort size statistics for one table from catalog metadata,
    /// never a full scan.
    async fn table_stats(&self, schema: &str, table: &str) -> Result<TableStats, BackupError>;

    /// Column names of `table` in ordinal position order.
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<String>, BackupError>;

    /// Fetch up to `limit` rows starting at `offset`, in the store's
    /// default scan order, with every value rendered to text.
    async fn fetch_page(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Row>, BackupError>;

    /// Whether the underlying connection is still usable. Checked by the
    /// pool before a connection is reused or returned to the idle set.
    fn is_open(&self) -> bool;
}

/// Creates connections for the pool on demand.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SourceConnection>, BackupError>;
}
