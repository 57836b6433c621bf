// ABOUTME: Aggregates per-table results into the run summary
// ABOUTME: Pure folding plus human formatting and optional JSON persistence

use crate::export::{ExportStatus, TableResult};
use anyhow::{Context, Result};
use serde::{Serialize, Serializer};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

/// Aggregated outcome of one full backup run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub results: Vec<TableResult>,
    pub tables_attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_rows: u64,
    pub total_bytes: u64,
    #[serde(serialize_with = "duration_secs")]
    pub elapsed: Duration,
}

fn duration_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunReport {
    /// True when every attempted table succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    /// Persist the report as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;
        Ok(())
    }

    /// Render the end-of-run summary block.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "BACKUP SUMMARY");
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "Tables attempted:  {}", self.tables_attempted);
        let _ = writeln!(out, "Succeeded:         {}", self.succeeded);
        let _ = writeln!(out, "Failed:            {}", self.failed);
        if self.cancelled > 0 {
            let _ = writeln!(out, "Cancelled:         {}", self.cancelled);
        }
        let _ = writeln!(out, "Rows written:      {}", self.total_rows);
        let _ = writeln!(out, "Bytes written:     {}", format_bytes(self.total_bytes as i64));
        let _ = writeln!(out, "Elapsed:           {}", format_duration(self.elapsed));
        let _ = writeln!(out);
        let _ = writeln!(out, "Table details:");
        for result in &self.results {
            match &result.status {
                ExportStatus::Succeeded => {
                    let _ = writeln!(
                        out,
                        "  ✓ {}: {} rows, {}",
                        result.table,
                        result.rows_written,
                        format_bytes(result.bytes_written as i64)
                    );
                }
                ExportStatus::Failed { detail, .. } => {
                    let _ = writeln!(out, "  ✗ {}: {}", result.table, detail);
                }
                ExportStatus::Cancelled => {
                    let _ = writeln!(out, "  ✗ {}: cancelled", result.table);
                }
            }
        }
        out
    }
}

/// Folds [`TableResult`]s into a [`RunReport`] as they arrive.
///
/// Results arrive in completion order, not submission order; counters are
/// keyed by nothing positional, so the fold is order-independent. This is
/// the single accumulation point for the whole run.
#[derive(Debug, Default)]
pub struct RunReporter {
    results: Vec<TableResult>,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
    total_rows: u64,
    total_bytes: u64,
}

impl RunReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: TableResult) {
        match &result.status {
            ExportStatus::Succeeded => {
                self.succeeded += 1;
                self.total_rows += result.rows_written;
                self.total_bytes += result.bytes_written;
            }
            ExportStatus::Failed { .. } => self.failed += 1,
            ExportStatus::Cancelled => self.cancelled += 1,
        }
        self.results.push(result);
    }

    pub fn results_recorded(&self) -> usize {
        self.results.len()
    }

    pub fn finish(self, elapsed: Duration) -> RunReport {
        RunReport {
            tables_attempted: self.results.len(),
            succeeded: self.succeeded,
            failed: self.failed,
            cancelled: self.cancelled,
            total_rows: self.total_rows,
            total_bytes: self.total_bytes,
            results: self.results,
            elapsed,
        }
    }
}

/// Format bytes into a human-readable string.
///
/// ```
/// # use postgres_table_backup::report::format_bytes;
/// assert_eq!(format_bytes(1024), "1.0 KB");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(1073741824), "1.0 GB");
/// ```
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_idx])
}

/// Format a duration into a human-readable string.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{:.1} seconds", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{:.1} minutes", secs as f64 / 60.0)
    } else {
        format!("{:.1} hours", secs as f64 / 3600.0)
    }
}
