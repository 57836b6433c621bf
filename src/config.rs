// ABOUTME: Resolves backup run configuration from file, environment, and defaults
// ABOUTME: Produces the immutable BackupConfig the core pipeline consumes

use crate::error::BackupError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Raw TOML shape. Every field is optional; unset fields fall back to
/// environment variables and then to defaults during [`BackupConfig::resolve`].
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub schema: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub max_connections: Option<usize>,
    pub max_concurrent: Option<usize>,
    pub chunk_size: Option<usize>,
    pub fetch_timeout_secs: Option<u64>,
    pub acquire_timeout_secs: Option<u64>,
    pub include_tables: Option<Vec<String>>,
    pub exclude_tables: Option<Vec<String>>,
}

/// Fully resolved configuration for one backup run. Immutable once built.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub schema: String,
    pub output_dir: PathBuf,
    /// Upper bound on live database connections.
    pub max_connections: usize,
    /// Upper bound on table exports running at once. Clamped to
    /// `max_connections` so admitted exports can never starve each other
    /// waiting on the pool.
    pub max_concurrent: usize,
    /// Rows per chunk fetch; bounds peak memory per table.
    pub chunk_size: usize,
    /// Per-operation timeout applied to each chunk fetch.
    pub fetch_timeout: Duration,
    /// How long a table task waits for a pooled connection.
    pub acquire_timeout: Duration,
    pub include_tables: Option<Vec<String>>,
    pub exclude_tables: Option<Vec<String>>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, BackupError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw).map_err(|e| {
            BackupError::Config(format!("failed to parse config file {}: {}", path.display(), e))
        })
    }
}

impl BackupConfig {
    /// Load configuration from an optional TOML file, with environment
    /// fallbacks (`DB_HOST`, `DB_NAME`, `DB_USER`, `DB_PASSWORD`, `DB_PORT`,
    /// `DB_SCHEMA`, `OUTPUT_DIR`, `MAX_CONNECTIONS`,
    /// `MAX_CONCURRENT_DOWNLOADS`, `CHUNK_SIZE`).
    pub fn load(path: Option<&Path>) -> Result<Self, BackupError> {
        let file = match path {
            Some(p) => FileConfig::from_path(p)?,
            None => FileConfig::default(),
        };
        Self::resolve(file)
    }

    /// Merge a parsed file config with environment variables and defaults,
    /// then validate. Fails fast with [`BackupError::Config`] when required
    /// connection parameters are absent.
    pub fn resolve(file: FileConfig) -> Result<Self, BackupError> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let database = file
            .database
            .or_else(|| env("DB_NAME"))
            .ok_or_else(|| BackupError::Config("database name is required (DB_NAME)".into()))?;
        let user = file
            .user
            .or_else(|| env("DB_USER"))
            .ok_or_else(|| BackupError::Config("database user is required (DB_USER)".into()))?;
        let password = file
            .password
            .or_else(|| env("DB_PASSWORD"))
            .ok_or_else(|| BackupError::Config("database password is required (DB_PASSWORD)".into()))?;

        let port = match file.port {
            Some(p) => p,
            None => match env("DB_PORT") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| BackupError::Config(format!("invalid DB_PORT: {}", raw)))?,
                None => 5432,
            },
        };

        let parse_env_usize = |key: &str| -> Result<Option<usize>, BackupError> {
            match env(key) {
                Some(raw) => raw
                    .parse()
                    .map(Some)
                    .map_err(|_| BackupError::Config(format!("invalid {}: {}", key, raw))),
                None => Ok(None),
            }
        };

        let max_connections = match file.max_connections {
            Some(n) => n,
            None => parse_env_usize("MAX_CONNECTIONS")?.unwrap_or(10),
        };
        let max_concurrent = match file.max_concurrent {
            Some(n) => n,
            None => parse_env_usize("MAX_CONCURRENT_DOWNLOADS")?.unwrap_or(3),
        };
        let chunk_size = match file.chunk_size {
            Some(n) => n,
            None => parse_env_usize("CHUNK_SIZE")?.unwrap_or(10_000),
        };

        if max_connections == 0 {
            return Err(BackupError::Config("max_connections must be at least 1".into()));
        }
        if max_concurrent == 0 {
            return Err(BackupError::Config("max_concurrent must be at least 1".into()));
        }
        if chunk_size == 0 {
            return Err(BackupError::Config("chunk_size must be at least 1".into()));
        }
        if file.include_tables.is_some() && file.exclude_tables.is_some() {
            return Err(BackupError::Config(
                "cannot use both include_tables and exclude_tables".into(),
            ));
        }

        // The concurrency gate must never exceed the pool, otherwise
        // admitted exports would queue on connections they can never get
        // ahead of.
        let max_concurrent = if max_concurrent > max_connections {
            tracing::warn!(
                "max_concurrent ({}) exceeds max_connections ({}); clamping to {}",
                max_concurrent,
                max_connections,
                max_connections
            );
            max_connections
        } else {
            max_concurrent
        };

        Ok(Self {
            host: file.host.or_else(|| env("DB_HOST")).unwrap_or_else(|| "localhost".into()),
            port,
            database,
            user,
            password,
            schema: file
                .schema
                .or_else(|| env("DB_SCHEMA"))
                .unwrap_or_else(|| "public".into()),
            output_dir: file
                .output_dir
                .or_else(|| env("OUTPUT_DIR").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("backups")),
            max_connections,
            max_concurrent,
            chunk_size,
            fetch_timeout: Duration::from_secs(file.fetch_timeout_secs.unwrap_or(300)),
            acquire_timeout: Duration::from_secs(file.acquire_timeout_secs.unwrap_or(30)),
            include_tables: file.include_tables,
            exclude_tables: file.exclude_tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn base_file_config() -> FileConfig {
        FileConfig {
            database: Some("appdb".into()),
            user: Some("backup".into()),
            password: Some("secret".into()),
            ..FileConfig::default()
        }
    }

    #[test]
    fn parse_sample_config() {
        let mut tmp = NamedTempFile::new().unwrap();
        let contents = r#"
            host = "db.internal"
            port = 5433
            database = "appdb"
            user = "backup"
            password = "secret"
            schema = "sales"
            output_dir = "/var/backups/pg"
            max_connections = 8
            max_concurrent = 4
            chunk_size = 5000
            include_tables = ["orders", "customers"]
        "#;
        write!(tmp, "{}", contents).unwrap();

        let config = BackupConfig::load(Some(tmp.path())).unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 5433);
        assert_eq!(config.schema, "sales");
        assert_eq!(config.output_dir, PathBuf::from("/var/backups/pg"));
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.chunk_size, 5000);
        assert_eq!(
            config.include_tables,
            Some(vec!["orders".to_string(), "customers".to_string()])
        );
    }

    #[test]
    fn missing_database_is_config_error() {
        let file = FileConfig {
            user: Some("backup".into()),
            password: Some("secret".into()),
            ..FileConfig::default()
        };
        let err = BackupConfig::resolve(file).unwrap_err();
        assert!(err.to_string().contains("database name"));
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let config = BackupConfig::resolve(base_file_config()).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.schema, "public");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.chunk_size, 10_000);
        assert_eq!(config.fetch_timeout, Duration::from_secs(300));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let file = FileConfig {
            chunk_size: Some(0),
            ..base_file_config()
        };
        assert!(BackupConfig::resolve(file).is_err());
    }

    #[test]
    fn concurrency_clamped_to_pool_size() {
        let file = FileConfig {
            max_connections: Some(2),
            max_concurrent: Some(10),
            ..base_file_config()
        };
        let config = BackupConfig::resolve(file).unwrap();
        assert_eq!(config.max_concurrent, 2);
    }

    #[test]
    fn include_and_exclude_together_rejected() {
        let file = FileConfig {
            include_tables: Some(vec!["a".into()]),
            exclude_tables: Some(vec!["b".into()]),
            ..base_file_config()
        };
        assert!(BackupConfig::resolve(file).is_err());
    }
}
