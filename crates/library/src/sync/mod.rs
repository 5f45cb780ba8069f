//! Library synchronization.
//!
//! Brings the record store in line with what's on disk. The walk and the
//! fingerprinting happen first without touching the database; the resulting
//! plan is then committed in bounded batches, so a long sync never holds a
//! write lock for long and the enrichment worker keeps going alongside it.
//!
//! Files are matched to entries by path first, then by [fingerprint] among
//! entries whose path disappeared (a move), then among soft-deleted entries
//! (a file that came back). Entries are never deleted, only hidden.
//!
//! [fingerprint]: songbook_storage::Fingerprint

mod discover;
pub mod error;
mod plan;

use self::discover::discover;
use self::error::{ErrorKind, Result};
use self::plan::{Inputs, plan};
use crate::label::{BasicLabelParser, LabelParser};
use derive_more::Display;
use exn::ResultExt;
use songbook_cache::{Change, Database, Repository};
use songbook_storage::{DEFAULT_FINGERPRINT_BYTES, Fingerprinter, StorageBackend};
use time::UtcDateTime;
use tracing::instrument;

/// What a sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[display("{added} added, {moved} moved, {deleted} deleted, {updated} updated")]
pub struct ReconciliationReport {
    /// New entries, plus soft-deleted entries whose file came back.
    pub added: u64,
    pub moved: u64,
    /// Entries hidden because their file is gone.
    pub deleted: u64,
    /// Entries whose file content or format changed in place.
    pub updated: u64,
}
impl ReconciliationReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// How much of each file's head goes into its fingerprint. Changing this
    /// changes every fingerprint: the next sync reports every file as updated.
    pub fingerprint_bytes: usize,
    /// Changes committed per transaction.
    pub batch_size: usize,
    /// Queue priority for new and changed entries.
    pub default_priority: i64,
    /// Index dot-files and files in dot-directories.
    pub include_hidden: bool,
    /// Work out the report without writing anything.
    pub dry_run: bool,
}
impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fingerprint_bytes: DEFAULT_FINGERPRINT_BYTES,
            batch_size: 500,
            default_priority: 0,
            include_hidden: false,
            dry_run: false,
        }
    }
}

pub struct Synchronizer {
    repo: Repository,
    options: SyncOptions,
    parser: Box<dyn LabelParser>,
}
impl Synchronizer {
    pub fn new(db: &Database, options: SyncOptions) -> Self {
        Self { repo: Repository::from(db), options, parser: Box::new(BasicLabelParser) }
    }

    /// Replace the file name parser used to label new entries.
    pub fn with_label_parser(mut self, parser: impl LabelParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Reconcile the store with the library in `backend`.
    ///
    /// If the library root is unavailable this fails with
    /// [`ScanFailed`](ErrorKind::ScanFailed) before anything is written:
    /// an unmounted drive must not look like every song was deleted.
    #[instrument(skip_all, fields(backend = backend.name(), dry_run = self.options.dry_run))]
    pub async fn sync(&self, backend: &dyn StorageBackend) -> Result<ReconciliationReport> {
        let fingerprinter = Fingerprinter::new(self.options.fingerprint_bytes);
        let discovery = discover(backend, fingerprinter, self.options.include_hidden).await?;
        let live = self.repo.list_live().await.or_raise(|| ErrorKind::Store)?;
        let hidden = self.repo.hidden_fingerprints().await.or_raise(|| ErrorKind::Store)?;
        let plan = plan(Inputs {
            disk: &discovery.files,
            live: &live,
            hidden: &hidden,
            unlistable: &discovery.unlistable,
            parser: self.parser.as_ref(),
            default_priority: self.options.default_priority,
        });
        if self.options.dry_run {
            tracing::info!(report = %plan.report, "sync planned (dry run)");
            return Ok(plan.report);
        }

        let finished = UtcDateTime::now();
        let mut batches: Vec<&[Change]> = plan.changes.chunks(self.options.batch_size.max(1)).collect();
        if batches.is_empty() {
            batches.push(&[]);
        }
        let last = batches.len() - 1;
        for (index, batch) in batches.into_iter().enumerate() {
            // The sync only counts as done once the final batch lands.
            let last_sync = (index == last).then_some(finished);
            self.repo.apply(batch, last_sync).await.or_raise(|| ErrorKind::Store)?;
        }
        tracing::info!(report = %plan.report, "library synchronized");
        Ok(plan.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use songbook_cache::{Format, Metadata, Status, StateRepository};
    use songbook_storage::backend::{LocalBackend, MockBackend};
    use std::path::Path;

    async fn setup(files: &[(&str, &str)]) -> (Database, Synchronizer, MockBackend) {
        let db = Database::connect_in_memory().await.unwrap();
        let sync = Synchronizer::new(&db, SyncOptions::default());
        let backend = MockBackend::with_files(files.iter().map(|(p, d)| (*p, d.as_bytes().to_vec())));
        (db, sync, backend)
    }

    fn report(added: u64, moved: u64, deleted: u64, updated: u64) -> ReconciliationReport {
        ReconciliationReport { added, moved, deleted, updated }
    }

    #[tokio::test]
    async fn test_second_sync_is_a_no_op() {
        let (db, sync, backend) = setup(&[("a.mp4", "aaa"), ("b.zip", "bbb"), ("c.mp3", "c"), ("c.cdg", "c")]).await;
        assert_eq!(sync.sync(&backend).await.unwrap(), report(3, 0, 0, 0));
        assert_eq!(sync.sync(&backend).await.unwrap(), report(0, 0, 0, 0));
        assert_eq!(Repository::from(&db).count_live().await.unwrap(), 3);
        assert!(StateRepository::from(&db).load().await.unwrap().last_sync.is_some());
    }

    #[tokio::test]
    async fn test_move_keeps_the_entry() {
        let (db, sync, backend) = setup(&[("a/song.mp4", "the song")]).await;
        sync.sync(&backend).await.unwrap();
        let repo = Repository::from(&db);
        let before = repo.get_by_path("a/song.mp4").await.unwrap().unwrap();

        backend.rename("a/song.mp4", "b/song.mp4").await;
        assert_eq!(sync.sync(&backend).await.unwrap(), report(0, 1, 0, 0));
        let after = repo.get_by_path("b/song.mp4").await.unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.fingerprint, before.fingerprint);
        assert!(repo.get_by_path("a/song.mp4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_move_keeps_manual_metadata() {
        let (db, sync, backend) = setup(&[("track01.mp4", "the song")]).await;
        sync.sync(&backend).await.unwrap();
        let repo = Repository::from(&db);
        let entry = repo.get_by_path("track01.mp4").await.unwrap().unwrap();
        let edit = Metadata { artist: Some("Queen".into()), title: Some("Innuendo".into()), ..Default::default() };
        repo.set_manual(entry.id, edit.clone()).await.unwrap();

        backend.rename("track01.mp4", "Queen/Innuendo.mp4").await;
        sync.sync(&backend).await.unwrap();
        let moved = repo.get(entry.id).await.unwrap().unwrap();
        assert_eq!(moved.status, Status::Manual);
        assert_eq!(moved.metadata.title, edit.title);
        assert_eq!(moved.display_name, "Innuendo.mp4");
    }

    #[tokio::test]
    async fn test_delete_hides_the_entry() {
        let (db, sync, backend) = setup(&[("a.mp4", "a"), ("b.mp4", "b")]).await;
        sync.sync(&backend).await.unwrap();
        let repo = Repository::from(&db);
        let gone = repo.get_by_path("a.mp4").await.unwrap().unwrap();

        backend.remove("a.mp4").await;
        assert_eq!(sync.sync(&backend).await.unwrap(), report(0, 0, 1, 0));
        let live = repo.list_live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].path, Path::new("b.mp4"));
        // Hidden, not purged.
        assert!(!repo.get(gone.id).await.unwrap().unwrap().visible);
    }

    #[tokio::test]
    async fn test_returning_file_is_restored() {
        let (db, sync, backend) = setup(&[("a.mp4", "a")]).await;
        sync.sync(&backend).await.unwrap();
        let repo = Repository::from(&db);
        let original = repo.get_by_path("a.mp4").await.unwrap().unwrap();
        backend.remove("a.mp4").await;
        sync.sync(&backend).await.unwrap();

        backend.put("Archive/a.mp4", b"a".to_vec()).await;
        assert_eq!(sync.sync(&backend).await.unwrap(), report(1, 0, 0, 0));
        let restored = repo.get_by_path("Archive/a.mp4").await.unwrap().unwrap();
        assert_eq!(restored.id, original.id);
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sidecar_pair_is_one_entry() {
        let (db, sync, backend) = setup(&[("song.mp3", "audio"), ("song.cdg", "graphics")]).await;
        assert_eq!(sync.sync(&backend).await.unwrap(), report(1, 0, 0, 0));
        let repo = Repository::from(&db);
        let live = repo.list_live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].format, Format::Cdg);
        assert_eq!(live[0].path, Path::new("song.mp3"));

        backend.remove("song.mp3").await;
        assert_eq!(sync.sync(&backend).await.unwrap(), report(0, 0, 1, 0));
        assert_eq!(repo.count_live().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_content_change_requeues_at_default_priority() {
        let db = Database::connect_in_memory().await.unwrap();
        let options = SyncOptions { default_priority: 4, ..Default::default() };
        let sync = Synchronizer::new(&db, options);
        let backend = MockBackend::with_files([("Queen - Innuendo.mp4", b"take one".to_vec())]);
        sync.sync(&backend).await.unwrap();
        let repo = Repository::from(&db);
        let entry = repo.get_by_path("Queen - Innuendo.mp4").await.unwrap().unwrap();
        assert_eq!(entry.status, Status::ParsedStrong);
        assert_eq!(entry.priority, 4);

        let queue = songbook_cache::Queue::from(&db);
        queue.complete(entry.id, songbook_cache::Outcome::Failed, 1).await.unwrap();
        backend.put("Queen - Innuendo.mp4", b"take two!".to_vec()).await;
        assert_eq!(sync.sync(&backend).await.unwrap(), report(0, 0, 0, 1));
        let refreshed = repo.get(entry.id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, Status::ParsedStrong);
        assert!(refreshed.queued);
        assert_eq!(refreshed.enrichment_attempts, 0);
        assert_ne!(refreshed.fingerprint, entry.fingerprint);
    }

    #[tokio::test]
    async fn test_offline_root_changes_nothing() {
        let (db, sync, backend) = setup(&[("a.mp4", "a")]).await;
        sync.sync(&backend).await.unwrap();
        backend.set_offline(true).await;
        let err = sync.sync(&backend).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ScanFailed));
        assert_eq!(Repository::from(&db).count_live().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unlistable_directory_keeps_entries() {
        let (db, sync, backend) = setup(&[("Locked/a.mp4", "a"), ("Open/b.mp4", "b")]).await;
        sync.sync(&backend).await.unwrap();
        backend.deny_listing("Locked").await;
        assert_eq!(sync.sync(&backend).await.unwrap(), report(0, 0, 0, 0));
        assert_eq!(Repository::from(&db).count_live().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let db = Database::connect_in_memory().await.unwrap();
        let sync = Synchronizer::new(&db, SyncOptions { dry_run: true, ..Default::default() });
        let backend = MockBackend::with_files([("a.mp4", b"a")]);
        assert_eq!(sync.sync(&backend).await.unwrap(), report(1, 0, 0, 0));
        assert_eq!(Repository::from(&db).count_live().await.unwrap(), 0);
        assert!(StateRepository::from(&db).load().await.unwrap().last_sync.is_none());
    }

    #[tokio::test]
    async fn test_small_batches_apply_everything() {
        let db = Database::connect_in_memory().await.unwrap();
        let sync = Synchronizer::new(&db, SyncOptions { batch_size: 2, ..Default::default() });
        let files: Vec<(String, Vec<u8>)> = (0..7).map(|i| (format!("song{i}.mp4"), vec![i])).collect();
        let backend = MockBackend::with_files(files);
        assert_eq!(sync.sync(&backend).await.unwrap(), report(7, 0, 0, 0));
        assert_eq!(Repository::from(&db).count_live().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_local_library() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("Queen")).unwrap();
        std::fs::write(root.join("Queen/Queen - Bohemian Rhapsody.mp4"), b"video").unwrap();
        std::fs::write(root.join("Queen/Queen - Bohemian Rhapsody.ass"), b"subs").unwrap();
        std::fs::write(root.join("ABBA - Waterloo.zip"), b"zip").unwrap();
        std::fs::write(root.join(".DS_Store"), b"junk").unwrap();
        let backend = LocalBackend::new("local", root).unwrap();
        let db = Database::connect_in_memory().await.unwrap();
        let sync = Synchronizer::new(&db, SyncOptions::default());
        assert_eq!(sync.sync(&backend).await.unwrap(), report(2, 0, 0, 0));

        std::fs::create_dir_all(root.join("Archive")).unwrap();
        std::fs::rename(root.join("ABBA - Waterloo.zip"), root.join("Archive/ABBA - Waterloo.zip")).unwrap();
        assert_eq!(sync.sync(&backend).await.unwrap(), report(0, 1, 0, 0));
        let entry = Repository::from(&db).get_by_path("Queen/Queen - Bohemian Rhapsody.mp4").await.unwrap().unwrap();
        assert_eq!(entry.format, Format::VideoAss);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_name_does_not_block_the_library() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("good.mp4"), b"good").unwrap();
        std::fs::write(root.join(OsStr::from_bytes(b"bad\xff.mp4")), b"bad").unwrap();
        let backend = LocalBackend::new("local", root).unwrap();
        let db = Database::connect_in_memory().await.unwrap();
        let sync = Synchronizer::new(&db, SyncOptions::default());
        assert_eq!(sync.sync(&backend).await.unwrap(), report(1, 0, 0, 0));
        assert_eq!(sync.sync(&backend).await.unwrap(), report(0, 0, 0, 0));
        let live = Repository::from(&db).list_live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].path, Path::new("good.mp4"));
    }
}
