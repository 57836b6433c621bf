// ABOUTME: Error taxonomy for the backup pipeline
// ABOUTME: Distinguishes fatal pre-flight errors from per-table failures

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// All failure modes of a backup run.
///
/// Only `Config` and `Schema` (table enumeration itself) abort a run.
/// Everything else is local to a single table's export attempt and is
/// captured in that table's [`TableResult`](crate::export::TableResult).
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to open database connection: {0}")]
    Connection(String),

    #[error("no pooled connection became available within {0:?}")]
    PoolExhausted(Duration),

    #[error("schema inspection failed: {0}")]
    Schema(String),

    #[error("chunk fetch exceeded timeout of {0:?}")]
    ReadTimeout(Duration),

    #[error("query failed: {0}")]
    Query(String),

    #[error("failed to write output file: {0}")]
    Write(String),

    #[error("run cancelled before table completed")]
    Cancelled,
}

impl BackupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Config(_) => ErrorKind::Config,
            BackupError::Connection(_) => ErrorKind::Connection,
            BackupError::PoolExhausted(_) => ErrorKind::PoolExhausted,
            BackupError::Schema(_) => ErrorKind::Schema,
            BackupError::ReadTimeout(_) => ErrorKind::ReadTimeout,
            BackupError::Query(_) => ErrorKind::Query,
            BackupError::Write(_) => ErrorKind::Write,
            BackupError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        BackupError::Write(err.to_string())
    }
}

impl From<csv::Error> for BackupError {
    fn from(err: csv::Error) -> Self {
        BackupError::Write(err.to_string())
    }
}

/// Discriminant of [`BackupError`], kept in serialized results so a report
/// consumer can branch on the failure class without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Connection,
    PoolExhausted,
    Schema,
    ReadTimeout,
    Query,
    Write,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            BackupError::Config("missing user".into()).kind(),
            ErrorKind::Config
        );
        assert_eq!(
            BackupError::PoolExhausted(Duration::from_secs(5)).kind(),
            ErrorKind::PoolExhausted
        );
        assert_eq!(BackupError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn io_error_maps_to_write() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: BackupError = io.into();
        assert_eq!(err.kind(), ErrorKind::Write);
        assert!(err.to_string().contains("denied"));
    }
}
