//! Snapshots of the library database, and restoring from them.
//!
//! Snapshots are complete, self-contained SQLite files named after the time
//! they were taken (`songbook_backup_20260131_235959.db`), so a backup
//! directory sorts chronologically and any snapshot can be opened with stock
//! SQLite tools.

pub mod error;

use self::error::{ErrorKind, Result};
use exn::ResultExt;
use songbook_cache::Database;
use songbook_cache::error::ErrorKind as CacheErrorKind;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use time::macros::format_description;
use tracing::instrument;

const PREFIX: &str = "songbook_backup_";
const EXTENSION: &str = "db";

/// A snapshot file in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: PathBuf,
    pub size: u64,
    /// Time in the file name (UTC, second precision).
    pub taken: String,
    sequence: u32,
}

/// Split `songbook_backup_<stamp>[_<n>].db` into its stamp and sequence.
fn parse_name(name: &str) -> Option<(String, u32)> {
    let rest = name.strip_prefix(PREFIX)?.strip_suffix(EXTENSION)?.strip_suffix('.')?;
    // YYYYMMDD_HHMMSS
    let (stamp, suffix) = rest.split_at_checked(15)?;
    let valid = stamp.chars().enumerate().all(|(i, c)| if i == 8 { c == '_' } else { c.is_ascii_digit() });
    if !valid {
        return None;
    }
    let sequence = match suffix {
        "" => 1,
        _ => suffix.strip_prefix('_')?.parse().ok()?,
    };
    Some((stamp.to_string(), sequence))
}

fn file_name(stamp: &str, sequence: u32) -> String {
    match sequence {
        1 => format!("{PREFIX}{stamp}.{EXTENSION}"),
        n => format!("{PREFIX}{stamp}_{n}.{EXTENSION}"),
    }
}

fn restore_error(err: &CacheErrorKind, safety: Option<&Path>) -> ErrorKind {
    match err {
        CacheErrorKind::InvalidSnapshot(reason) => ErrorKind::InvalidSnapshot(reason.clone()),
        CacheErrorKind::Staging => ErrorKind::InvalidSnapshot("could not be copied for validation".to_string()),
        CacheErrorKind::InMemory => ErrorKind::InMemory,
        _ => ErrorKind::Restore(safety.map(Path::to_path_buf)),
    }
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    db: Database,
    dir: PathBuf,
}
impl BackupManager {
    pub fn new(db: &Database, dir: impl Into<PathBuf>) -> Self {
        Self { db: db.clone(), dir: dir.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Write a consistent snapshot into the backup directory, creating it if
    /// needed, and return its path.
    ///
    /// Safe to call while the synchronizer or the enrichment worker is
    /// writing; neither is blocked.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn create_snapshot(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .or_raise(|| ErrorKind::Directory(self.dir.clone()))?;
        let stamp = UtcDateTime::now()
            .format(format_description!("[year][month][day]_[hour][minute][second]"))
            .or_raise(|| ErrorKind::Snapshot)?;
        let mut sequence = 1;
        let dest = loop {
            let dest = self.dir.join(file_name(&stamp, sequence));
            if !tokio::fs::try_exists(&dest).await.or_raise(|| ErrorKind::Directory(self.dir.clone()))? {
                break dest;
            }
            sequence += 1;
        };
        self.db.snapshot_into(&dest).await.or_raise(|| ErrorKind::Snapshot)?;
        tracing::info!(path = %dest.display(), "snapshot written");
        Ok(dest)
    }

    /// Replace the live database with the snapshot at `path`.
    ///
    /// The current database is snapshotted first, on a best-effort basis;
    /// its path is returned so the restore can be undone. That snapshot is
    /// discarded again if `path` is rejected, since nothing was changed.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn restore(&self, path: &Path) -> Result<Option<PathBuf>> {
        if self.db.path().is_none() {
            exn::bail!(ErrorKind::InMemory);
        }
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            exn::bail!(ErrorKind::InvalidSnapshot(format!("{} does not exist", path.display())));
        }
        let safety = match self.create_snapshot().await {
            Ok(safety) => Some(safety),
            Err(err) => {
                tracing::warn!(error = ?err, "could not snapshot the live database before restoring");
                None
            },
        };

        let Err(err) = self.db.restore_from(path).await else {
            return Ok(safety);
        };
        let kind = restore_error(&*err, safety.as_deref());
        if matches!(kind, ErrorKind::InvalidSnapshot(_))
            && let Some(safety) = &safety
            && let Err(remove_err) = tokio::fs::remove_file(safety).await
        {
            tracing::debug!(error = %remove_err, "could not discard unused pre-restore snapshot");
        }
        // A failed swap names the pre-restore snapshot in `reason`.
        tracing::error!(reason = %kind, "restore failed");
        Err(err.raise(kind))
    }

    /// Run the database's consistency check. Returns `"ok"` when healthy.
    pub async fn check_integrity(&self) -> Result<String> {
        self.db.check_integrity().await.map_err(|err| {
            let kind = match &*err {
                CacheErrorKind::Corrupt(report) => ErrorKind::Corrupt(report.clone()),
                _ => ErrorKind::Store,
            };
            err.raise(kind)
        })
    }

    /// Snapshots in the backup directory, newest first. A missing directory
    /// has no snapshots.
    pub async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let mut reader = match tokio::fs::read_dir(&self.dir).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(exn::Exn::new(err).raise(ErrorKind::Directory(self.dir.clone()))),
        };
        let mut snapshots = Vec::new();
        while let Some(item) = reader.next_entry().await.or_raise(|| ErrorKind::Directory(self.dir.clone()))? {
            let name = item.file_name().to_string_lossy().to_string();
            let Some((taken, sequence)) = parse_name(&name) else { continue };
            let metadata = item.metadata().await.or_raise(|| ErrorKind::Directory(self.dir.clone()))?;
            if !metadata.is_file() {
                continue;
            }
            snapshots.push(Snapshot { path: item.path(), size: metadata.len(), taken, sequence });
        }
        snapshots.sort_by(|a, b| (&b.taken, b.sequence).cmp(&(&a.taken, a.sequence)));
        Ok(snapshots)
    }
}
