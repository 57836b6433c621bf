// ABOUTME: Schema introspection that produces the run's work list
// ABOUTME: Discovers tables and annotates them with advisory size estimates

use crate::error::BackupError;
use crate::filter::TableFilter;
use crate::pool::ConnectionPool;
use crate::report::format_bytes;
use crate::source::TableStats;

/// One table scheduled for export. Discovered once per run; read-only
/// thereafter. The size fields are advisory (scheduling and logging only).
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub row_estimate: i64,
    pub size_bytes: i64,
}

impl TableDescriptor {
    pub fn qualified(&self, schema: &str) -> String {
        format!("{}.{}", schema, self.name)
    }
}

/// Discovers and sizes the tables a run will back up.
pub struct SchemaInspector<'a> {
    pool: &'a ConnectionPool,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(pool: &'a ConnectionPool) -> Self {
        Self { pool }
    }

    /// Enumerate the base tables of `schema`, apply `filter`, and annotate
    /// each survivor with catalog statistics.
    ///
    /// Table enumeration failure (missing or inaccessible schema) is fatal
    /// to the run. A failed size estimate is not: the table is still backed
    /// up, it just schedules with zero/unknown size.
    pub async fn discover(
        &self,
        schema: &str,
        filter: &TableFilter,
    ) -> Result<Vec<TableDescriptor>, BackupError> {
        let conn = self.pool.acquire().await?;

        let names = conn.list_tables(schema).await?;
        tracing::info!("Found {} tables in schema '{}'", names.len(), schema);

        for missing in filter.unmatched_includes(&names) {
            tracing::warn!("Included table '{}' does not exist in schema '{}'", missing, schema);
        }

        let selected: Vec<String> = names
            .into_iter()
            .filter(|t| filter.should_back_up(t))
            .collect();
        if !filter.is_empty() {
            tracing::info!("{} tables selected after filtering", selected.len());
        }

        let mut descriptors = Vec::with_capacity(selected.len());
        for name in selected {
            let stats = match conn.table_stats(schema, &name).await {
                Ok(stats) => stats,
                Err(err) => {
                    tracing::warn!(
                        "Could not estimate size of '{}.{}': {}; scheduling with unknown size",
                        schema,
                        name,
                        err
                    );
                    TableStats::default()
                }
            };
            tracing::debug!(
                "  {}.{}: ~{} rows, {}",
                schema,
                name,
                stats.row_estimate,
                format_bytes(stats.size_bytes)
            );
            descriptors.push(TableDescriptor {
                name,
                row_estimate: stats.row_estimate,
                size_bytes: stats.size_bytes,
            });
        }

        Ok(descriptors)
    }
}
