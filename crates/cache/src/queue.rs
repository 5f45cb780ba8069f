//! The enrichment queue.
//!
//! There's no queue table: queued entries are those flagged `queued`, drained
//! highest priority first, then least recently updated, then by id.

use crate::Database;
use crate::entry::{EntryId, LibraryEntry, Metadata, Status};
use crate::error::{ErrorKind, Result};
use crate::models::{EntryRow, millis};
use crate::state::{self, FAILED, PROCESSED, SUCCEEDED};
use exn::ResultExt;
use time::UtcDateTime;
use tracing::instrument;

/// What an enrichment attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The lookup matched. `verified` marks a match the service vouches for.
    Enriched { metadata: Metadata, verified: bool },
    /// The lookup failed or found nothing.
    Failed,
}

/// What recording an [`Outcome`] did to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Metadata stored; the entry left the queue with this status.
    Enriched(Status),
    /// Still queued, with this many attempts spent.
    Retrying { attempts: u32 },
    /// The retry ceiling was reached; the entry is now `failed`.
    GaveUp,
    /// The entry was no longer waiting on enrichment (edited manually or
    /// refreshed in the meantime). Nothing was written and nothing counted.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Queue {
    db: Database,
}
impl From<&Database> for Queue {
    fn from(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}
impl Queue {
    /// The entry that should be enriched next, if any.
    pub async fn next(&self) -> Result<Option<LibraryEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(include_str!("../queries/next_queued.sql"))
            .fetch_optional(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(LibraryEntry::try_from).transpose()
    }

    pub async fn remaining(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(include_str!("../queries/count_queued.sql"))
            .fetch_one(&self.db.pool().await)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))
    }

    /// Record the outcome of an enrichment attempt.
    ///
    /// The entry update and the worker's progress counters are committed
    /// together. Failures spend an attempt; the attempt that reaches
    /// `retry_ceiling` marks the entry `failed` and takes it out of the queue.
    #[instrument(skip(self, outcome), fields(entry = id.get()))]
    pub async fn complete(&self, id: EntryId, outcome: Outcome, retry_ceiling: u32) -> Result<Applied> {
        let now = millis(UtcDateTime::now());
        let mut tx = self.db.pool().await.begin().await.or_raise(|| ErrorKind::Database)?;
        let applied = match outcome {
            Outcome::Enriched { metadata, verified } => {
                let status = if verified { Status::ApiVerified } else { Status::ApiEnriched };
                let result = sqlx::query(include_str!("../queries/complete_enriched.sql"))
                    .bind(id.get())
                    .bind(metadata.artist)
                    .bind(metadata.title)
                    .bind(metadata.variant)
                    .bind(metadata.year)
                    .bind(metadata.genre)
                    .bind(metadata.external_id)
                    .bind(status.as_str())
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                if result.rows_affected() == 0 { Applied::Skipped } else { Applied::Enriched(status) }
            },
            Outcome::Failed => {
                let row: Option<(i64, String)> = sqlx::query_as(include_str!("../queries/complete_failed.sql"))
                    .bind(id.get())
                    .bind(i64::from(retry_ceiling))
                    .bind(now)
                    .fetch_optional(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
                match row {
                    None => Applied::Skipped,
                    Some((attempts, status)) => {
                        if status.parse::<Status>()?.is_terminal() {
                            Applied::GaveUp
                        } else {
                            let attempts =
                                u32::try_from(attempts).or_raise(|| ErrorKind::InvalidData("enrichment attempts"))?;
                            Applied::Retrying { attempts }
                        }
                    },
                }
            },
        };
        match applied {
            Applied::Skipped => {},
            Applied::Enriched(_) => {
                state::increment(&mut tx, PROCESSED).await?;
                state::increment(&mut tx, SUCCEEDED).await?;
            },
            Applied::Retrying { .. } | Applied::GaveUp => {
                state::increment(&mut tx, PROCESSED).await?;
                state::increment(&mut tx, FAILED).await?;
            },
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Format, NewEntry};
    use crate::{Change, Repository, StateRepository};

    async fn setup(entries: Vec<NewEntry>) -> (Database, Repository, Queue) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let changes: Vec<Change> = entries.into_iter().map(Change::Insert).collect();
        repo.apply(&changes, None).await.unwrap();
        let queue = Queue::from(&db);
        (db, repo, queue)
    }

    fn song(path: &str) -> NewEntry {
        NewEntry::new(path, path, Format::Zip)
    }

    #[tokio::test]
    async fn test_higher_priority_drains_first() {
        let (_db, _repo, queue) =
            setup(vec![song("low.zip"), song("high.zip").with_priority(10), song("mid.zip").with_priority(5)]).await;
        let mut order = Vec::new();
        while let Some(entry) = queue.next().await.unwrap() {
            order.push(entry.path.to_string_lossy().to_string());
            queue
                .complete(entry.id, Outcome::Enriched { metadata: Metadata::default(), verified: false }, 3)
                .await
                .unwrap();
        }
        assert_eq!(order, ["high.zip", "mid.zip", "low.zip"]);
    }

    #[tokio::test]
    async fn test_equal_priority_drains_in_insertion_order() {
        let (_db, _repo, queue) = setup(vec![song("first.zip"), song("second.zip")]).await;
        let first = queue.next().await.unwrap().unwrap();
        assert_eq!(first.path.to_str(), Some("first.zip"));
    }

    #[tokio::test]
    async fn test_non_queueable_statuses_are_not_queued() {
        let done = song("done.zip").with_metadata(Metadata::default(), Status::ApiVerified);
        let (_db, _repo, queue) = setup(vec![done]).await;
        assert!(queue.next().await.unwrap().is_none());
        assert_eq!(queue.remaining().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_success_stores_metadata_and_dequeues() {
        let initial = Metadata { artist: Some("Abba".into()), variant: Some("Live".into()), ..Default::default() };
        let (db, repo, queue) = setup(vec![song("a.zip").with_metadata(initial, Status::ParsedWeak)]).await;
        let entry = queue.next().await.unwrap().unwrap();
        let found = Metadata {
            artist: Some("ABBA".into()),
            title: Some("Waterloo".into()),
            year: Some(1974),
            external_id: Some("mbid:123".into()),
            ..Default::default()
        };
        let applied = queue.complete(entry.id, Outcome::Enriched { metadata: found, verified: true }, 3).await.unwrap();
        assert_eq!(applied, Applied::Enriched(Status::ApiVerified));

        let stored = repo.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::ApiVerified);
        assert!(!stored.queued);
        assert_eq!(stored.metadata.artist.as_deref(), Some("ABBA"));
        assert_eq!(stored.metadata.variant.as_deref(), Some("Live"));
        assert!(stored.last_enrichment_attempt.is_some());
        assert_eq!(queue.remaining().await.unwrap(), 0);

        let state = StateRepository::from(&db).load().await.unwrap();
        assert_eq!((state.processed, state.succeeded, state.failed), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_retry_ceiling() {
        let (db, repo, queue) = setup(vec![song("a.zip")]).await;
        let id = queue.next().await.unwrap().unwrap().id;
        assert_eq!(queue.complete(id, Outcome::Failed, 3).await.unwrap(), Applied::Retrying { attempts: 1 });
        assert_eq!(queue.complete(id, Outcome::Failed, 3).await.unwrap(), Applied::Retrying { attempts: 2 });
        assert_eq!(queue.next().await.unwrap().map(|e| e.id), Some(id));
        assert_eq!(queue.complete(id, Outcome::Failed, 3).await.unwrap(), Applied::GaveUp);

        let stored = repo.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Failed);
        assert_eq!(stored.enrichment_attempts, 3);
        assert!(!stored.queued);
        assert!(queue.next().await.unwrap().is_none());

        // Once failed, further outcomes are ignored.
        assert_eq!(queue.complete(id, Outcome::Failed, 3).await.unwrap(), Applied::Skipped);
        let state = StateRepository::from(&db).load().await.unwrap();
        assert_eq!((state.processed, state.succeeded, state.failed), (3, 0, 3));
    }

    #[tokio::test]
    async fn test_manual_edit_wins_over_in_flight_lookup() {
        let (db, repo, queue) = setup(vec![song("a.zip")]).await;
        let entry = queue.next().await.unwrap().unwrap();
        let edit = Metadata { title: Some("Typed In".into()), ..Default::default() };
        repo.set_manual(entry.id, edit).await.unwrap();

        let found = Metadata { title: Some("From Service".into()), ..Default::default() };
        let applied = queue.complete(entry.id, Outcome::Enriched { metadata: found, verified: true }, 3).await.unwrap();
        assert_eq!(applied, Applied::Skipped);
        assert_eq!(queue.complete(entry.id, Outcome::Failed, 1).await.unwrap(), Applied::Skipped);

        let stored = repo.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, Status::Manual);
        assert_eq!(stored.metadata.title.as_deref(), Some("Typed In"));
        assert_eq!(stored.enrichment_attempts, 0);
        let state = StateRepository::from(&db).load().await.unwrap();
        assert_eq!(state.processed, 0);
    }

    #[tokio::test]
    async fn test_hidden_entries_are_not_dequeued() {
        let (_db, repo, queue) = setup(vec![song("a.zip")]).await;
        let entry = queue.next().await.unwrap().unwrap();
        repo.apply(&[Change::Hide { id: entry.id }], None).await.unwrap();
        assert!(queue.next().await.unwrap().is_none());
        assert_eq!(queue.remaining().await.unwrap(), 0);
    }
}
