//! Process-wide worker state, kept next to the entries it describes.
//!
//! The enrichment worker's flags and counters live in the `worker_state`
//! key/value table rather than in memory, so that resuming after a restart
//! is an ordinary read. Counters are bumped in the same transaction as the
//! entry update they account for.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{from_millis, millis};
use exn::ResultExt;
use sqlx::SqliteConnection;
use time::UtcDateTime;

pub(crate) const RUNNING: &str = "running";
pub(crate) const PAUSED: &str = "paused";
pub(crate) const PROCESSED: &str = "processed";
pub(crate) const SUCCEEDED: &str = "succeeded";
pub(crate) const FAILED: &str = "failed";
pub(crate) const STARTED_AT: &str = "started_at";
pub(crate) const LAST_SYNC: &str = "last_sync";

/// Snapshot of the persisted worker state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerState {
    pub running: bool,
    pub paused: bool,
    /// Enrichment attempts that were recorded against an entry.
    pub processed: u64,
    pub succeeded: u64,
    /// Failed attempts, including those that will be retried.
    pub failed: u64,
    pub started_at: Option<UtcDateTime>,
    /// When the last library sync finished.
    pub last_sync: Option<UtcDateTime>,
}

pub(crate) async fn put(conn: &mut SqliteConnection, key: &str, value: &str) -> Result<()> {
    sqlx::query(include_str!("../queries/state_put.sql"))
        .bind(key)
        .bind(value)
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

pub(crate) async fn increment(conn: &mut SqliteConnection, key: &str) -> Result<()> {
    sqlx::query(include_str!("../queries/state_increment.sql"))
        .bind(key)
        .bind(1_i64)
        .execute(conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Repository for [`WorkerState`].
#[derive(Debug, Clone)]
pub struct StateRepository {
    db: Database,
}
impl From<&Database> for StateRepository {
    fn from(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}
impl StateRepository {
    pub async fn load(&self) -> Result<WorkerState> {
        let rows: Vec<(String, String)> = sqlx::query_as(include_str!("../queries/state_list.sql"))
            .fetch_all(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut state = WorkerState::default();
        for (key, value) in rows {
            let number = || value.parse::<i64>().or_raise(|| ErrorKind::InvalidData("worker state"));
            match key.as_str() {
                RUNNING => state.running = number()? != 0,
                PAUSED => state.paused = number()? != 0,
                PROCESSED => state.processed = counter(number()?)?,
                SUCCEEDED => state.succeeded = counter(number()?)?,
                FAILED => state.failed = counter(number()?)?,
                STARTED_AT => state.started_at = Some(from_millis(number()?)?),
                LAST_SYNC => state.last_sync = Some(from_millis(number()?)?),
                _ => tracing::debug!(key, "ignoring unknown worker state key"),
            }
        }
        Ok(state)
    }

    /// Record that the worker started (with the time) or stopped.
    pub async fn set_running(&self, running: bool) -> Result<()> {
        let mut tx = self.db.pool().await.begin().await.or_raise(|| ErrorKind::Database)?;
        put(&mut tx, RUNNING, flag(running)).await?;
        if running {
            put(&mut tx, STARTED_AT, &millis(UtcDateTime::now()).to_string()).await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    pub async fn set_paused(&self, paused: bool) -> Result<()> {
        let mut conn = self.db.pool().await.acquire().await.or_raise(|| ErrorKind::Database)?;
        put(&mut conn, PAUSED, flag(paused)).await
    }

    /// Zero the progress counters, leaving flags and timestamps alone.
    pub async fn reset_counters(&self) -> Result<()> {
        let mut tx = self.db.pool().await.begin().await.or_raise(|| ErrorKind::Database)?;
        for key in [PROCESSED, SUCCEEDED, FAILED] {
            sqlx::query(include_str!("../queries/state_clear.sql"))
                .bind(key)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }
}

fn counter(value: i64) -> Result<u64> {
    u64::try_from(value).or_raise(|| ErrorKind::InvalidData("worker state counter"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_state() {
        let db = Database::connect_in_memory().await.unwrap();
        let state = StateRepository::from(&db).load().await.unwrap();
        assert_eq!(state, WorkerState::default());
    }

    #[tokio::test]
    async fn test_flags_and_counters_persist() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = StateRepository::from(&db);
        repo.set_running(true).await.unwrap();
        repo.set_paused(true).await.unwrap();
        {
            let mut conn = db.pool().await.acquire().await.unwrap();
            increment(&mut conn, PROCESSED).await.unwrap();
            increment(&mut conn, PROCESSED).await.unwrap();
            increment(&mut conn, FAILED).await.unwrap();
        }
        let state = repo.load().await.unwrap();
        assert!(state.running);
        assert!(state.paused);
        assert!(state.started_at.is_some());
        assert_eq!((state.processed, state.succeeded, state.failed), (2, 0, 1));

        repo.set_running(false).await.unwrap();
        repo.reset_counters().await.unwrap();
        let state = repo.load().await.unwrap();
        assert!(!state.running);
        assert!(state.paused);
        assert_eq!((state.processed, state.succeeded, state.failed), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_last_sync_round_trips() {
        let db = Database::connect_in_memory().await.unwrap();
        let at = UtcDateTime::now();
        crate::Repository::from(&db).apply(&[], Some(at)).await.unwrap();
        let state = StateRepository::from(&db).load().await.unwrap();
        assert_eq!(state.last_sync.map(millis), Some(millis(at)));
    }
}
