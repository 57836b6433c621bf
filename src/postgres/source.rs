// ABOUTME: SourceConnection implementation backed by tokio-postgres
// ABOUTME: Catalog introspection and text-rendered page fetches

use crate::config::BackupConfig;
use crate::error::BackupError;
use crate::source::{ConnectionFactory, Row, SourceConnection, TableStats};
use crate::utils::{quote_ident, validate_identifier};
use async_trait::async_trait;
use tokio_postgres::Client;

pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceConnection for PgConnection {
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, BackupError> {
        let exists = self
            .client
            .query_opt(
                "SELECT 1 FROM information_schema.schemata WHERE schema_name = $1",
                &[&schema],
            )
            .await
            .map_err(|e| BackupError::Schema(format!("failed to look up schema: {}", e)))?;
        if exists.is_none() {
            return Err(BackupError::Schema(format!(
                "schema '{}' does not exist or is not visible to this role",
                schema
            )));
        }

        let rows = self
            .client
            .query(
                "SELECT table_name
                 FROM information_schema.tables
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[&schema],
            )
            .await
            .map_err(|e| BackupError::Schema(format!("failed to list tables: {}", e)))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn table_stats(&self, schema: &str, table: &str) -> Result<TableStats, BackupError> {
        // Planner statistics, not COUNT(*): a stale estimate is fine, a
        // full scan per table before the backup even starts is not.
        let row = self
            .client
            .query_opt(
                "SELECT GREATEST(c.reltuples::bigint, 0),
                        pg_total_relation_size(c.oid)
                 FROM pg_catalog.pg_class c
                 JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
                 WHERE n.nspname = $1 AND c.relname = $2",
                &[&schema, &table],
            )
            .await
            .map_err(|e| BackupError::Query(format!("failed to read catalog stats: {}", e)))?;

        match row {
            Some(row) => Ok(TableStats {
                row_estimate: row.get(0),
                size_bytes: row.get(1),
            }),
            None => Err(BackupError::Query(format!(
                "no catalog entry for '{}.{}'",
                schema, table
            ))),
        }
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<String>, BackupError> {
        let rows = self
            .client
            .query(
                "SELECT column_name
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
                &[&schema, &table],
            )
            .await
            .map_err(|e| BackupError::Query(format!("failed to list columns: {}", e)))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn fetch_page(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        limit: usize,
        offset: u64,
    ) -> Result<Vec<Row>, BackupError> {
        // Identifiers come from the catalog, but they still pass validation
        // before being interpolated into generated SQL.
        validate_identifier(schema).map_err(|e| BackupError::Query(e.to_string()))?;
        validate_identifier(table).map_err(|e| BackupError::Query(e.to_string()))?;
        for column in columns {
            validate_identifier(column).map_err(|e| BackupError::Query(e.to_string()))?;
        }

        // Every column is cast to text server-side so one code path handles
        // all types; NULL survives the cast as NULL.
        let projection = columns
            .iter()
            .map(|c| format!("{}::text", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT {} FROM {}.{} LIMIT $1 OFFSET $2",
            projection,
            quote_ident(schema),
            quote_ident(table)
        );

        let rows = self
            .client
            .query(&query, &[&(limit as i64), &(offset as i64)])
            .await
            .map_err(|e| BackupError::Query(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row.get::<_, Option<String>>(i))
                    .collect()
            })
            .collect())
    }

    fn is_open(&self) -> bool {
        !self.client.is_closed()
    }
}

/// Opens [`PgConnection`]s for the pool, one TLS connection per call.
pub struct PgConnectionFactory {
    config: BackupConfig,
}

impl PgConnectionFactory {
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn SourceConnection>, BackupError> {
        let client = super::connection::connect(&self.config)
            .await
            .map_err(|e| BackupError::Connection(e.to_string()))?;
        Ok(Box::new(PgConnection::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;

    async fn test_connection() -> PgConnection {
        let config = BackupConfig::resolve(FileConfig {
            host: std::env::var("TEST_DB_HOST").ok(),
            database: std::env::var("TEST_DB_NAME").ok(),
            user: std::env::var("TEST_DB_USER").ok(),
            password: std::env::var("TEST_DB_PASSWORD").ok(),
            ..FileConfig::default()
        })
        .unwrap();
        PgConnection::new(super::super::connection::connect(&config).await.unwrap())
    }

    // NOTE: these require a real PostgreSQL instance; set TEST_DB_* to run
    #[tokio::test]
    #[ignore]
    async fn lists_tables_in_public_schema() {
        let conn = test_connection().await;
        let tables = conn.list_tables("public").await.unwrap();
        println!("Found {} tables", tables.len());
    }

    #[tokio::test]
    #[ignore]
    async fn missing_schema_is_schema_error() {
        let conn = test_connection().await;
        let err = conn.list_tables("no_such_schema_xyz").await.unwrap_err();
        assert!(matches!(err, BackupError::Schema(_)));
    }

    #[tokio::test]
    #[ignore]
    async fn pages_through_catalog_table() {
        let conn = test_connection().await;
        let columns = vec!["schema_name".to_string()];
        let page = conn
            .fetch_page("information_schema", "schemata", &columns, 5, 0)
            .await
            .unwrap();
        assert!(!page.is_empty());
        assert_eq!(page[0].len(), 1);
    }
}
