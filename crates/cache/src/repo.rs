//! Repository for library entries.
//!
//! Entries are looked up by id or by live path. Writes coming from a library
//! sync are expressed as a list of [`Change`]s and applied in one transaction,
//! so that a sync interrupted half way leaves whole batches behind and never a
//! half-moved entry.

use crate::Database;
use crate::db::sqlx_hates_paths;
use crate::entry::{EntryId, Format, LibraryEntry, Metadata, NewEntry, Status};
use crate::error::{ErrorKind, Result};
use crate::models::{EntryRow, millis};
use crate::state::{self, LAST_SYNC};
use exn::ResultExt;
use songbook_storage::Fingerprint;
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tracing::instrument;

/// A single write produced by reconciling the disk with the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A file seen for the first time.
    Insert(NewEntry),
    /// The file at an entry's path has different content (or a different
    /// format, after a sidecar appeared or went away).
    Refresh {
        id: EntryId,
        fingerprint: Option<Fingerprint>,
        format: Format,
        display_name: String,
        /// Status the file name alone earns; a failed entry restarts from it.
        label_status: Status,
        /// Queue priority if the entry ends up queued.
        priority: i64,
    },
    /// A live entry's file was found at a new path.
    Move { id: EntryId, path: PathBuf, display_name: String, format: Format },
    /// A soft-deleted entry's file turned up again.
    Restore { id: EntryId, path: PathBuf, display_name: String, format: Format },
    /// The entry's file is gone.
    Hide { id: EntryId },
}

/// Repository for managing library entries in the database.
#[derive(Debug, Clone)]
pub struct Repository {
    db: Database,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}
impl Repository {
    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Get an entry by id, whether it's live or hidden.
    pub async fn get(&self, id: EntryId) -> Result<Option<LibraryEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/get_entry.sql"))
            .bind(id.get())
            .fetch_optional(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(LibraryEntry::try_from).transpose()
    }

    /// Get the live entry at a path (relative to the library root).
    pub async fn get_by_path(&self, path: impl AsRef<Path>) -> Result<Option<LibraryEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/get_live_by_path.sql"))
            .bind(sqlx_hates_paths(path)?)
            .fetch_optional(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(LibraryEntry::try_from).transpose()
    }

    /// Every entry currently believed to exist on disk, by ascending id.
    pub async fn list_live(&self) -> Result<Vec<LibraryEntry>> {
        self.fetch_all(include_str!("../queries/list_live.sql")).await
    }

    /// Every entry including hidden ones, by ascending id.
    pub async fn list_all(&self) -> Result<Vec<LibraryEntry>> {
        self.fetch_all(include_str!("../queries/list_all.sql")).await
    }

    async fn fetch_all(&self, query: &'static str) -> Result<Vec<LibraryEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(query)
            .fetch_all(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(LibraryEntry::try_from).collect()
    }

    pub async fn count_live(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(include_str!("../queries/count_live.sql"))
            .fetch_one(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }

    /// Case-insensitive substring search over artist, title, variant and
    /// display name of live entries. No ranking: results come back by name.
    pub async fn search(&self, needle: &str, limit: u32) -> Result<Vec<LibraryEntry>> {
        let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/search.sql"))
            .bind(pattern)
            .bind(i64::from(limit))
            .fetch_all(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(LibraryEntry::try_from).collect()
    }

    /// Fingerprints of soft-deleted entries, most recently hidden first.
    pub async fn hidden_fingerprints(&self) -> Result<Vec<(EntryId, Fingerprint)>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(include_str!("../queries/hidden_fingerprints.sql"))
            .fetch_all(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(|(id, fp)| (EntryId::new(id), Fingerprint::from_hex(fp))).collect())
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Apply reconciliation changes atomically.
    ///
    /// When `last_sync` is given it is recorded in the same transaction, which
    /// marks the sync that produced the changes as complete.
    #[instrument(skip(self, changes), fields(changes = changes.len()))]
    pub async fn apply(&self, changes: &[Change], last_sync: Option<UtcDateTime>) -> Result<()> {
        let now = millis(UtcDateTime::now());
        let mut tx = self.db.pool().await.begin().await.or_raise(|| ErrorKind::Database)?;
        for change in changes {
            apply_change(&mut tx, change, now).await?;
        }
        if let Some(at) = last_sync {
            state::put(&mut tx, LAST_SYNC, &millis(at).to_string()).await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Record a manual edit: fields given overwrite, the entry is marked
    /// `manual` and taken out of the queue. Nothing automated touches it again.
    #[instrument(skip(self, metadata))]
    pub async fn set_manual(&self, id: EntryId, metadata: Metadata) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/set_manual.sql"))
            .bind(id.get())
            .bind(metadata.artist)
            .bind(metadata.title)
            .bind(metadata.variant)
            .bind(metadata.year)
            .bind(metadata.genre)
            .bind(metadata.external_id)
            .bind(millis(UtcDateTime::now()))
            .execute(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::EntryNotFound(id.get()));
        }
        Ok(())
    }

    pub async fn set_priority(&self, id: EntryId, priority: i64) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/set_priority.sql"))
            .bind(id.get())
            .bind(priority)
            .execute(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::EntryNotFound(id.get()));
        }
        Ok(())
    }

    /// Put every live, non-manual entry back in the queue with no attempts
    /// spent. Returns how many entries were requeued.
    #[instrument(skip(self))]
    pub async fn requeue_all(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/requeue_all.sql"))
            .bind(millis(UtcDateTime::now()))
            .execute(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}

async fn apply_change(conn: &mut SqliteConnection, change: &Change, now: i64) -> Result<()> {
    let query = match change {
        Change::Insert(entry) => sqlx::query(include_str!("../queries/insert_entry.sql"))
            .bind(sqlx_hates_paths(&entry.path)?)
            .bind(entry.fingerprint.as_ref().map(Fingerprint::as_str))
            .bind(entry.display_name.as_str())
            .bind(entry.format.as_str())
            .bind(entry.metadata.artist.as_deref())
            .bind(entry.metadata.title.as_deref())
            .bind(entry.metadata.variant.as_deref())
            .bind(entry.metadata.year)
            .bind(entry.metadata.genre.as_deref())
            .bind(entry.metadata.external_id.as_deref())
            .bind(entry.status.as_str())
            .bind(entry.status.is_queueable())
            .bind(entry.priority)
            .bind(now)
            .bind(now),
        Change::Refresh { id, fingerprint, format, display_name, label_status, priority } => {
            sqlx::query(include_str!("../queries/refresh_entry.sql"))
                .bind(id.get())
                .bind(fingerprint.as_ref().map(Fingerprint::as_str))
                .bind(format.as_str())
                .bind(display_name.as_str())
                .bind(label_status.as_str())
                .bind(*priority)
                .bind(now)
        },
        Change::Move { id, path, display_name, format } => sqlx::query(include_str!("../queries/move_entry.sql"))
            .bind(id.get())
            .bind(sqlx_hates_paths(path)?)
            .bind(display_name.as_str())
            .bind(format.as_str())
            .bind(now),
        Change::Restore { id, path, display_name, format } => {
            sqlx::query(include_str!("../queries/restore_entry.sql"))
                .bind(id.get())
                .bind(sqlx_hates_paths(path)?)
                .bind(display_name.as_str())
                .bind(format.as_str())
                .bind(now)
        },
        Change::Hide { id } => sqlx::query(include_str!("../queries/hide_entry.sql")).bind(id.get()).bind(now),
    };
    query.execute(&mut *conn).await.or_raise(|| ErrorKind::Database)?;
    Ok(())
}

/// Escape LIKE wildcards so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
