//! Database connection and pool management.

use exn::{OptionExt, ResultExt};
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
pub(crate) static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// The scheduler writes while the synchronizer and readers work alongside it.
const MAX_CONNECTIONS: u32 = 5;

pub(crate) fn sqlx_hates_paths(path: impl AsRef<Path>) -> Result<String> {
    Ok(path.as_ref().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
}

#[derive(Debug)]
struct Inner {
    /// `None` for in-memory databases.
    path: Option<PathBuf>,
    options: SqliteConnectOptions,
    max_connections: u32,
    /// Replaced wholesale when a snapshot is restored over the live file.
    pool: RwLock<SqlitePool>,
}

/// Handle to the record store.
///
/// Cheap to clone; all clones share the same pool. Repositories hold a
/// `Database` rather than a pool and fetch the current pool for every
/// operation, so that they keep working after a restore swapped it.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    async fn new(path: Option<PathBuf>, options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = Self::open_pool(&options, max_connections, path.is_none()).await?;
        let db = Self { inner: Arc::new(Inner { path, options, max_connections, pool: RwLock::new(pool) }) };
        db.migrate().await?;
        Ok(db)
    }

    async fn open_pool(options: &SqliteConnectOptions, max: u32, in_memory: bool) -> Result<SqlitePool> {
        let mut pool_options = SqlitePoolOptions::new()
            // This is IMPORTANT to apply the query-based PRAGMAs to EVERY
            // connection (set by max connections) instead of only the
            // first connection returned by the pool.
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max);
        if in_memory {
            // The database lives and dies with its only connection.
            pool_options = pool_options.min_connections(1).idle_timeout(None).max_lifetime(None);
        }
        pool_options.connect_with(options.clone()).await.or_raise(|| ErrorKind::Database)
    }

    /// Connect to the database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(Some(path.to_path_buf()), options, MAX_CONNECTIONS).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // In-memory database must either use the same cache `.shared_cache(true)`,
        // or be limited to one connection. Otherwise parallel connections will
        // see different databases that contain different data.
        Self::new(None, options, 1).await
    }

    /// Base connection options shared between file and in-memory databases.
    pub(crate) fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            // Readers never wait on the enrichment worker's commits.
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // A sync applies its changes in batches while the worker keeps
            // committing one entry at a time; let them queue for the lock.
            .busy_timeout(std::time::Duration::from_millis(5000))
            .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::None)
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA locking_mode = NORMAL;
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
                PRAGMA mmap_size = 33554432;
                PRAGMA analysis_limit = 1000;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Run database migrations.
    ///
    /// This is called automatically on connect and after a restore.
    #[instrument("performing database migrations", skip(self))]
    pub(crate) async fn migrate(&self) -> Result<()> {
        let pool = self.pool().await;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// The current connection pool.
    ///
    /// Don't hold on to it: a restore closes it and puts a new one in its
    /// place. Waits while a restore is in progress.
    pub async fn pool(&self) -> SqlitePool {
        self.inner.pool.read().await.clone()
    }

    /// Location of the database file, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Exclusive access to the pool slot, blocking every repository until
    /// the guard is dropped.
    pub(crate) async fn lock_pool(&self) -> RwLockWriteGuard<'_, SqlitePool> {
        self.inner.pool.write().await
    }

    /// Open a fresh pool over the configured location.
    pub(crate) async fn reopen(&self) -> Result<SqlitePool> {
        Self::open_pool(&self.inner.options, self.inner.max_connections, self.inner.path.is_none()).await
    }

    /// Close the database connection pool.
    ///
    /// This waits for all connections to be returned to the pool and then
    /// closes them. After calling this, the Database instance should not
    /// be used.
    pub async fn close(&self) {
        let pool = self.pool().await;
        // Let SQLite update query planner statistics
        _ = sqlx::query("PRAGMA optimize").execute(&pool).await;
        pool.close().await;
    }
}
