//! Snapshots, restores and integrity checks.

use crate::Database;
use crate::db::{MIGRATOR, sqlx_hates_paths};
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tracing::instrument;

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

fn invalid(reason: impl Into<String>) -> ErrorKind {
    ErrorKind::InvalidSnapshot(reason.into())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl Database {
    /// Write a consistent copy of the whole database to `dest`.
    ///
    /// Uses `VACUUM INTO`, which reads inside a single transaction: writers
    /// keep committing to the WAL while the copy is made, and the copy is
    /// compacted. `dest` must not exist yet.
    #[instrument(skip(self), fields(dest = %dest.display()))]
    pub async fn snapshot_into(&self, dest: &Path) -> Result<()> {
        sqlx::query("VACUUM INTO ?")
            .bind(sqlx_hates_paths(dest)?)
            .execute(&self.pool().await)
            .await
            .or_raise(|| ErrorKind::Snapshot)?;
        Ok(())
    }

    /// Replace the live database with the snapshot at `candidate`.
    ///
    /// The candidate is copied next to the live file and validated there
    /// first; if it's rejected, the live database is untouched and the error
    /// is [`InvalidSnapshot`](ErrorKind::InvalidSnapshot) with the reason.
    /// Only then is the pool closed, the journal files removed and the copy
    /// moved into place. If the swap fails, whatever database file is present
    /// is reopened so that the store stays usable.
    #[instrument(skip(self), fields(candidate = %candidate.display()))]
    pub async fn restore_from(&self, candidate: &Path) -> Result<()> {
        let live = self.path().ok_or_raise(|| ErrorKind::InMemory)?.to_path_buf();
        check_header(candidate).await?;

        let dir = live.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix(".songbook-restore-")
            .suffix(".db")
            .tempfile_in(dir)
            .or_raise(|| ErrorKind::Staging)?;
        tokio::fs::copy(candidate, staging.path()).await.or_raise(|| ErrorKind::Staging)?;
        validate(staging.path()).await?;

        let mut pool = self.lock_pool().await;
        pool.close().await;
        if let Err(err) = swap(staging, &live) {
            tracing::error!(error = ?err, "swapping in snapshot failed, reopening current database");
            match self.reopen().await {
                Ok(reopened) => *pool = reopened,
                Err(reopen_err) => tracing::error!(error = ?reopen_err, "database could not be reopened"),
            }
            return Err(err);
        }
        *pool = self.reopen().await.or_raise(|| ErrorKind::Swap)?;
        drop(pool);
        // An older snapshot is brought up to the current schema.
        self.migrate().await?;
        tracing::info!("database restored from snapshot");
        Ok(())
    }

    /// Run SQLite's built-in consistency check.
    ///
    /// Returns the report (`"ok"`) on success. Problems are returned as
    /// [`Corrupt`](ErrorKind::Corrupt) with SQLite's diagnostics and are not
    /// repaired.
    #[instrument(skip(self))]
    pub async fn check_integrity(&self) -> Result<String> {
        let rows: Vec<(String,)> = sqlx::query_as("PRAGMA integrity_check")
            .fetch_all(&self.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let report = rows.into_iter().map(|(line,)| line).collect::<Vec<_>>().join("\n");
        if report != "ok" {
            tracing::error!(%report, "integrity check failed");
            exn::bail!(ErrorKind::Corrupt(report));
        }
        Ok(report)
    }
}

async fn check_header(path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .or_raise(|| invalid(format!("cannot open {}", path.display())))?;
    let mut header = [0_u8; 16];
    file.read_exact(&mut header)
        .await
        .or_raise(|| invalid("file is too short to be a database"))?;
    if &header != SQLITE_HEADER {
        exn::bail!(invalid("not a SQLite database"));
    }
    Ok(())
}

/// Check a staged snapshot over its own connection.
async fn validate(path: &Path) -> Result<()> {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        // Keep the staged copy a single file; the live pool switches it back to WAL.
        .journal_mode(SqliteJournalMode::Delete)
        .connect()
        .await
        .or_raise(|| invalid("cannot be opened as a database"))?;
    let result = validate_connection(&mut conn).await;
    _ = conn.close().await;
    if let Err(err) = &result {
        tracing::warn!(reason = %**err, "rejected snapshot");
    }
    result
}

async fn validate_connection(conn: &mut SqliteConnection) -> Result<()> {
    let rows: Vec<(String,)> = sqlx::query_as("PRAGMA integrity_check")
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| invalid("integrity check could not run"))?;
    if !(rows.len() == 1 && rows[0].0 == "ok") {
        let report = rows.into_iter().map(|(line,)| line).collect::<Vec<_>>().join("; ");
        exn::bail!(invalid(format!("integrity check failed: {report}")));
    }

    let tables: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('entries', '_sqlx_migrations')",
    )
    .fetch_all(&mut *conn)
    .await
    .or_raise(|| invalid("schema could not be read"))?;
    let has = |table: &str| tables.iter().any(|(name,)| name == table);
    if !has("entries") {
        exn::bail!(invalid("no library entries table"));
    }
    if !has("_sqlx_migrations") {
        exn::bail!(invalid("no schema version information"));
    }

    let applied: Vec<(i64, Vec<u8>)> =
        sqlx::query_as("SELECT version, checksum FROM _sqlx_migrations WHERE success = 1 ORDER BY version")
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| invalid("schema versions could not be read"))?;
    for (version, checksum) in applied {
        match MIGRATOR.iter().find(|migration| migration.version == version) {
            None => exn::bail!(invalid(format!("schema version {version} is newer than this build"))),
            Some(known) if known.checksum.as_ref() != checksum.as_slice() => {
                exn::bail!(invalid(format!("schema version {version} does not match this build")))
            },
            Some(_) => {},
        }
    }
    Ok(())
}

/// Replace the (closed) live database with the staged copy.
fn swap(staging: NamedTempFile, live: &Path) -> Result<()> {
    for suffix in ["-wal", "-shm", "-journal"] {
        let artifact = sibling(live, suffix);
        match std::fs::remove_file(&artifact) {
            Ok(()) => {},
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
            Err(err) => return Err(exn::Exn::new(err).raise(ErrorKind::Swap)),
        }
    }
    staging.persist(live).or_raise(|| ErrorKind::Swap)?;
    Ok(())
}
