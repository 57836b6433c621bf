// ABOUTME: Streams one table's rows in bounded batches
// ABOUTME: Pages with LIMIT/OFFSET so peak memory is O(chunk), never O(table)

use crate::error::BackupError;
use crate::source::{Row, SourceConnection};
use std::time::Duration;

/// One page of rows from a single table. Row order inside a chunk follows
/// the store's default scan order; callers must not depend on it being
/// reproducible across runs.
#[derive(Debug)]
pub struct Chunk {
    pub rows: Vec<Row>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Lazy, finite sequence of [`Chunk`]s over one table.
///
/// Each fetch asks for at most `chunk_size` rows at the current offset and
/// is bounded by `fetch_timeout`; an elapsed timeout surfaces as
/// [`BackupError::ReadTimeout`] and any other backend failure as
/// [`BackupError::Query`]. Neither is retried here; the exporter one layer
/// up decides what a failure means for the table.
///
/// The scan ends at the first short page. A table whose row count is an
/// exact multiple of the chunk size costs one extra empty probe fetch,
/// since advisory row estimates are never trusted for termination.
pub struct ChunkReader<'a> {
    conn: &'a dyn SourceConnection,
    schema: &'a str,
    table: &'a str,
    columns: &'a [String],
    chunk_size: usize,
    fetch_timeout: Duration,
    offset: u64,
    done: bool,
}

impl<'a> ChunkReader<'a> {
    pub fn new(
        conn: &'a dyn SourceConnection,
        schema: &'a str,
        table: &'a str,
        columns: &'a [String],
        chunk_size: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            conn,
            schema,
            table,
            columns,
            chunk_size,
            fetch_timeout,
            offset: 0,
            done: false,
        }
    }

    /// Rows consumed so far.
    pub fn rows_read(&self) -> u64 {
        self.offset
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, BackupError> {
        if self.done {
            return Ok(None);
        }

        let fetch = self.conn.fetch_page(
            self.schema,
            self.table,
            self.columns,
            self.chunk_size,
            self.offset,
        );
        let rows = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => return Err(BackupError::ReadTimeout(self.fetch_timeout)),
        };

        if rows.is_empty() {
            self.done = true;
            return Ok(None);
        }
        if rows.len() < self.chunk_size {
            self.done = true;
        }
        self.offset += rows.len() as u64;

        Ok(Some(Chunk { rows }))
    }
}
