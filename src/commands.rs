use crate::cli::Command;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use songbook_cache::{Database, Repository, StateRepository};
use songbook_config::Config;
use songbook_library::{BackupManager, Scheduler, SchedulerOptions, SyncOptions, Synchronizer};
use songbook_storage::backend::LocalBackend;
use std::path::PathBuf;
use std::time::Duration;

fn sync_options(config: &Config, dry_run: bool) -> SyncOptions {
    SyncOptions {
        fingerprint_bytes: config.sync.fingerprint_bytes,
        batch_size: config.sync.batch_size,
        default_priority: config.sync.default_priority,
        include_hidden: config.library.hidden_files,
        dry_run,
    }
}

fn scheduler_options(config: &Config) -> SchedulerOptions {
    SchedulerOptions {
        retry_ceiling: config.enrichment.retry_ceiling,
        idle_poll: Duration::from_secs(config.enrichment.idle_poll_seconds),
        ..Default::default()
    }
    .with_max_calls_per_minute(config.enrichment.max_calls_per_minute)
}

async fn open(config: &Config) -> Result<Database> {
    let path = &config.database.path;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
    }
    Database::connect(path).await.or_raise(|| ErrorKind::Database)
}

pub async fn run(command: Command, config: &Config) -> Result<()> {
    let db = open(config).await?;
    let result = dispatch(command, config, &db).await;
    db.close().await;
    result
}

async fn dispatch(command: Command, config: &Config, db: &Database) -> Result<()> {
    let backups = || BackupManager::new(db, &config.backup.directory);
    match command {
        Command::Sync { root, dry_run } => sync(config, db, root, dry_run).await,
        Command::Snapshot => {
            let path = backups().create_snapshot().await.or_raise(|| ErrorKind::Backup)?;
            println!("{}", path.display());
            Ok(())
        },
        Command::Restore { path } => {
            let previous = backups().restore(&path).await.or_raise(|| ErrorKind::Backup)?;
            println!("restored from {}", path.display());
            if let Some(previous) = previous {
                println!("previous database saved as {}", previous.display());
            }
            Ok(())
        },
        Command::Snapshots => {
            for snapshot in backups().list_snapshots().await.or_raise(|| ErrorKind::Backup)? {
                println!("{}\t{}\t{} bytes", snapshot.taken, snapshot.path.display(), snapshot.size);
            }
            Ok(())
        },
        Command::Check => {
            let report = backups().check_integrity().await.or_raise(|| ErrorKind::Backup)?;
            println!("{report}");
            Ok(())
        },
        Command::Status => status(config, db).await,
        Command::Requeue => {
            let queued = Repository::from(db).requeue_all().await.or_raise(|| ErrorKind::Database)?;
            println!("{queued} entries queued for enrichment");
            Ok(())
        },
    }
}

async fn sync(config: &Config, db: &Database, root: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let root = match root {
        Some(root) => root,
        None => config.library_root().or_raise(|| ErrorKind::Config)?.to_path_buf(),
    };
    let backend = LocalBackend::new("library", &root).or_raise(|| ErrorKind::Library)?;
    let report = Synchronizer::new(db, sync_options(config, dry_run))
        .sync(&backend)
        .await
        .or_raise(|| ErrorKind::Sync)?;
    match dry_run {
        true => println!("{report} (dry run, nothing written)"),
        false => println!("{report}"),
    }
    Ok(())
}

async fn status(config: &Config, db: &Database) -> Result<()> {
    let entries = Repository::from(db).count_live().await.or_raise(|| ErrorKind::Database)?;
    let state = StateRepository::from(db).load().await.or_raise(|| ErrorKind::Database)?;
    let progress = Scheduler::new(db, scheduler_options(config))
        .progress()
        .await
        .or_raise(|| ErrorKind::Enrichment)?;
    println!("entries:    {entries}");
    println!("queued:     {}", progress.queue_remaining);
    println!(
        "enrichment: {} attempts, {} succeeded, {} failed",
        progress.processed, progress.succeeded, progress.failed
    );
    let worker = match (progress.running, progress.paused) {
        (true, true) => "running (paused)",
        (true, false) => "running",
        (false, true) => "stopped (paused)",
        (false, false) => "stopped",
    };
    println!("worker:     {worker}");
    match state.last_sync {
        Some(last_sync) => println!("last sync:  {last_sync}"),
        None => println!("last sync:  never"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_follow_config() {
        let mut config = Config::default();
        config.sync.batch_size = 25;
        config.library.hidden_files = true;
        config.enrichment.max_calls_per_minute = 30;
        config.enrichment.retry_ceiling = 4;

        let sync = sync_options(&config, true);
        assert_eq!(sync.batch_size, 25);
        assert!(sync.include_hidden && sync.dry_run);
        let scheduler = scheduler_options(&config);
        assert_eq!(scheduler.min_interval, Duration::from_secs(2));
        assert_eq!(scheduler.retry_ceiling, 4);
        assert_eq!(scheduler.idle_poll, Duration::from_secs(5));
    }
}
