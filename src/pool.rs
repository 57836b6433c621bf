// ABOUTME: Bounded connection pool over a ConnectionFactory
// ABOUTME: Semaphore-gated acquisition with RAII return and health checks

use crate::error::BackupError;
use crate::source::{ConnectionFactory, SourceConnection};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pool sizing and wait behavior, fixed at construction time.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live connections the pool will ever hold.
    pub max_size: usize,
    /// How long `acquire` waits for a free slot before failing with
    /// [`BackupError::PoolExhausted`].
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

struct PoolInner {
    factory: Arc<dyn ConnectionFactory>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn SourceConnection>>>,
    acquire_timeout: Duration,
    max_size: usize,
    in_use: AtomicUsize,
    high_water: AtomicUsize,
}

/// Bounded pool of source-database connections.
///
/// Acquisition suspends cooperatively until a slot frees up or the
/// configured wait timeout elapses. Connections are handed out as
/// [`PooledConnection`] guards that return themselves to the idle set on
/// drop, on every exit path including cancellation, so the pool size never
/// drifts. A connection found closed on return (or on reuse) is discarded
/// and replaced lazily by the factory on a later acquire.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                permits: Arc::new(Semaphore::new(config.max_size)),
                idle: Mutex::new(Vec::with_capacity(config.max_size)),
                acquire_timeout: config.acquire_timeout,
                max_size: config.max_size,
                in_use: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
            }),
        }
    }

    /// Borrow a live, validated connection.
    ///
    /// Waits up to the configured acquire timeout for a free slot; a slot
    /// that frees up is filled from the idle set if a healthy connection is
    /// cached there, otherwise a fresh connection is opened.
    pub async fn acquire(&self) -> Result<PooledConnection, BackupError> {
        let inner = &self.inner;

        let permit = match tokio::time::timeout(
            inner.acquire_timeout,
            Arc::clone(&inner.permits).acquire_owned(),
        )
        .await
        {
            Err(_) => return Err(BackupError::PoolExhausted(inner.acquire_timeout)),
            Ok(Err(_)) => return Err(BackupError::Connection("pool is closed".into())),
            Ok(Ok(permit)) => permit,
        };

        // Reuse a cached connection if it is still healthy; stale ones are
        // dropped here and replaced by a fresh connect below.
        let cached = loop {
            let candidate = match inner.idle.lock() {
                Ok(mut idle) => idle.pop(),
                Err(_) => None,
            };
            match candidate {
                Some(conn) if conn.is_open() => break Some(conn),
                Some(_) => {
                    tracing::debug!("Discarding stale pooled connection");
                    continue;
                }
                None => break None,
            }
        };

        let conn = match cached {
            Some(conn) => conn,
            // Factory failure releases the permit via drop, so a failed
            // connect never shrinks the pool.
            None => inner.factory.connect().await?,
        };

        let now = inner.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        inner.high_water.fetch_max(now, Ordering::SeqCst);

        Ok(PooledConnection {
            conn: Some(conn),
            inner: Arc::clone(inner),
            _permit: permit,
        })
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Number of connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously checked-out connections observed.
    pub fn high_water(&self) -> usize {
        self.inner.high_water.load(Ordering::SeqCst)
    }

    /// Free slots available for acquisition right now.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }
}

/// RAII guard for a borrowed connection. Dereferences to
/// [`SourceConnection`]; returns the connection to the pool when dropped.
pub struct PooledConnection {
    conn: Option<Box<dyn SourceConnection>>,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = dyn SourceConnection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.inner.in_use.fetch_sub(1, Ordering::SeqCst);
        if let Some(conn) = self.conn.take() {
            if conn.is_open() {
                if let Ok(mut idle) = self.inner.idle.lock() {
                    idle.push(conn);
                }
            } else {
                tracing::debug!("Dropping broken connection instead of returning it to the pool");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Row, TableStats};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    struct StubConnection {
        open: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SourceConnection for StubConnection {
        async fn list_tables(&self, _schema: &str) -> Result<Vec<String>, BackupError> {
            Ok(vec![])
        }

        async fn table_stats(
            &self,
            _schema: &str,
            _table: &str,
        ) -> Result<TableStats, BackupError> {
            Ok(TableStats::default())
        }

        async fn columns(&self, _schema: &str, _table: &str) -> Result<Vec<String>, BackupError> {
            Ok(vec![])
        }

        async fn fetch_page(
            &self,
            _schema: &str,
            _table: &str,
            _columns: &[String],
            _limit: usize,
            _offset: u64,
        ) -> Result<Vec<Row>, BackupError> {
            Ok(vec![])
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    struct StubFactory {
        connects: AtomicUsize,
        fail: AtomicBool,
        open_flags: Mutex<Vec<Arc<AtomicBool>>>,
    }

    impl StubFactory {
        fn new() -> Self {
            Self {
                connects: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                open_flags: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ConnectionFactory for StubFactory {
        async fn connect(&self) -> Result<Box<dyn SourceConnection>, BackupError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(BackupError::Connection("refused".into()));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            let open = Arc::new(AtomicBool::new(true));
            self.open_flags.lock().unwrap().push(open.clone());
            Ok(Box::new(StubConnection { open }))
        }
    }

    fn pool_with(max_size: usize, acquire_timeout: Duration) -> (ConnectionPool, Arc<StubFactory>) {
        let factory = Arc::new(StubFactory::new());
        let pool = ConnectionPool::new(
            factory.clone(),
            PoolConfig {
                max_size,
                acquire_timeout,
            },
        );
        (pool, factory)
    }

    #[tokio::test]
    async fn acquire_and_return_reuses_connection() {
        let (pool, factory) = pool_with(2, Duration::from_secs(1));

        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.in_use(), 1);
        drop(conn);
        assert_eq!(pool.in_use(), 0);

        let _again = pool.acquire().await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let (pool, _factory) = pool_with(1, Duration::from_millis(50));

        let held = pool.acquire().await.unwrap();
        let result = pool.acquire().await;
        match result {
            Err(BackupError::PoolExhausted(_)) => {}
            other => panic!("expected PoolExhausted, got {:?}", other.map(|_| ())),
        }
        drop(held);

        // Slot freed, acquisition succeeds again
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn failed_connect_does_not_leak_permit() {
        let (pool, factory) = pool_with(1, Duration::from_millis(100));
        factory.fail.store(true, Ordering::SeqCst);

        for _ in 0..3 {
            assert!(pool.acquire().await.is_err());
        }

        factory.fail.store(false, Ordering::SeqCst);
        let held = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);
        drop(held);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn broken_connection_is_not_returned_to_idle() {
        let (pool, factory) = pool_with(1, Duration::from_secs(1));

        let conn = pool.acquire().await.unwrap();
        // Simulate the backend dropping the connection mid-flight
        factory.open_flags.lock().unwrap()[0].store(false, Ordering::SeqCst);
        drop(conn);

        // Next acquire must open a fresh connection
        let _fresh = pool.acquire().await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn high_water_tracks_peak_usage() {
        let (pool, _factory) = pool_with(3, Duration::from_secs(1));

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.high_water(), 2);
        drop(a);
        drop(b);
        let _c = pool.acquire().await.unwrap();
        assert_eq!(pool.high_water(), 2);
    }
}
