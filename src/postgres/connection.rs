// ABOUTME: PostgreSQL connection establishment with TLS and keepalives
// ABOUTME: Maps driver errors onto actionable connection diagnostics

use crate::config::BackupConfig;
use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::time::Duration;
use tokio_postgres::Client;

/// Build the driver configuration for one backup run.
///
/// TCP keepalives are enabled (first probe after 60s idle, then every 10s)
/// to prevent idle-connection timeouts when connecting through load
/// balancers; long chunk fetches can otherwise look idle to an ELB.
pub fn pg_config(config: &BackupConfig) -> tokio_postgres::Config {
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .dbname(&config.database)
        .user(&config.user)
        .password(&config.password)
        .application_name("postgres-table-backup")
        .connect_timeout(Duration::from_secs(30))
        .keepalives(true)
        .keepalives_idle(Duration::from_secs(60))
        .keepalives_interval(Duration::from_secs(10));
    pg
}

/// Connect to PostgreSQL with TLS support.
///
/// The connection's background task is spawned onto the runtime; the
/// returned [`Client`] is ready for queries.
///
/// # Errors
///
/// Returns an error if authentication fails, the database does not exist,
/// the server is unreachable, or TLS negotiation fails. The message is
/// rewritten to name the likely cause rather than echoing the raw driver
/// error.
pub async fn connect(config: &BackupConfig) -> Result<Client> {
    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .context("Failed to build TLS connector")?;
    let tls = MakeTlsConnector::new(tls_connector);

    let (client, connection) = pg_config(config).connect(tls).await.map_err(|e| {
        let msg = e.to_string();
        if msg.contains("password authentication failed") {
            anyhow::anyhow!(
                "Authentication failed: invalid username or password for '{}'",
                config.user
            )
        } else if msg.contains("does not exist") && msg.contains("database") {
            anyhow::anyhow!(
                "Database '{}' does not exist on {}:{}",
                config.database,
                config.host,
                config.port
            )
        } else if msg.contains("Connection refused") || msg.contains("could not connect") {
            anyhow::anyhow!(
                "Connection refused: unable to reach {}:{}. \
                 Check the host, port, and that the server is running. Error: {}",
                config.host,
                config.port,
                msg
            )
        } else if msg.contains("timeout") || msg.contains("timed out") {
            anyhow::anyhow!(
                "Connection timeout: {}:{} did not respond in time. Error: {}",
                config.host,
                config.port,
                msg
            )
        } else {
            anyhow::anyhow!("Failed to connect to database: {}", msg)
        }
    })?;

    // The connection object drives the socket; run it until the client drops
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;

    fn test_config() -> BackupConfig {
        BackupConfig::resolve(FileConfig {
            host: Some("db.example.com".into()),
            port: Some(5433),
            database: Some("appdb".into()),
            user: Some("backup".into()),
            password: Some("secret".into()),
            ..FileConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn pg_config_carries_connection_parameters() {
        let pg = pg_config(&test_config());
        let dbg = format!("{:?}", pg);
        assert!(dbg.contains("db.example.com"));
        assert!(dbg.contains("appdb"));
        // Password must not leak through Debug
        assert!(!dbg.contains("secret"));
    }

    // NOTE: requires a reachable PostgreSQL instance
    #[tokio::test]
    #[ignore]
    async fn connect_against_real_database() {
        let config = BackupConfig::resolve(FileConfig {
            host: std::env::var("TEST_DB_HOST").ok(),
            database: std::env::var("TEST_DB_NAME").ok(),
            user: std::env::var("TEST_DB_USER").ok(),
            password: std::env::var("TEST_DB_PASSWORD").ok(),
            ..FileConfig::default()
        })
        .unwrap();

        let client = connect(&config).await.unwrap();
        let row = client.query_one("SELECT 1::int4", &[]).await.unwrap();
        let one: i32 = row.get(0);
        assert_eq!(one, 1);
    }
}
