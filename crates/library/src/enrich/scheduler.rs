//! The background enrichment worker.
//!
//! One tokio task drains the queue, one entry at a time, pacing calls to the
//! [`EnrichmentClient`] so that consecutive calls are at least
//! [`min_interval`](SchedulerOptions::min_interval) apart. The task is steered
//! through a `watch` channel; every state it depends on (flags, counters, the
//! queue itself) is read from and written to the record store, so a restarted
//! scheduler carries on where the last one stopped.

use crate::enrich::client::{EnrichmentClient, Lookup, Query};
use crate::enrich::error::{ErrorKind, Result};
use exn::ResultExt;
use songbook_cache::{Applied, Database, LibraryEntry, Outcome, Queue, StateRepository};
use std::sync::Arc;
use std::time::Duration;
use time::UtcDateTime;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Running,
    Paused,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Shortest gap between the end of one lookup and the start of the next.
    pub min_interval: Duration,
    /// Failed attempts after which an entry is given up on.
    pub retry_ceiling: u32,
    /// How long to wait before looking at an empty queue again.
    pub idle_poll: Duration,
}
impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            retry_ceiling: 3,
            idle_poll: Duration::from_secs(5),
        }
    }
}
impl SchedulerOptions {
    /// Pace lookups to at most `calls_per_minute`.
    pub fn with_max_calls_per_minute(mut self, calls_per_minute: u32) -> Self {
        self.min_interval = Duration::from_secs(60) / calls_per_minute.max(1);
        self
    }
}

/// Where the worker is at. `running` is whether this scheduler has a live
/// worker; everything else is read from the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub running: bool,
    pub paused: bool,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub queue_remaining: u64,
    pub started_at: Option<UtcDateTime>,
}

struct Worker {
    control: watch::Sender<Control>,
    task: JoinHandle<()>,
}

pub struct Scheduler {
    db: Database,
    options: SchedulerOptions,
    worker: Mutex<Option<Worker>>,
}
impl Scheduler {
    pub fn new(db: &Database, options: SchedulerOptions) -> Self {
        Self { db: db.clone(), options, worker: Mutex::new(None) }
    }

    /// Spawn the worker. It starts paused if it was paused when last
    /// stopped (or [`pause`](Self::pause) was called since).
    #[instrument(skip_all, fields(client = client.name()))]
    pub async fn start(&self, client: Arc<dyn EnrichmentClient>) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            exn::bail!(ErrorKind::AlreadyRunning);
        }
        let state = StateRepository::from(&self.db);
        let paused = state.load().await.or_raise(|| ErrorKind::Store)?.paused;
        state.set_running(true).await.or_raise(|| ErrorKind::Store)?;

        let (control, receiver) = watch::channel(if paused { Control::Paused } else { Control::Running });
        let task = tokio::spawn(run(Queue::from(&self.db), self.options.clone(), client, receiver));
        *worker = Some(Worker { control, task });
        tracing::info!(paused, "enrichment worker started");
        Ok(())
    }

    /// Hold the worker at its gate once the current entry is done.
    pub async fn pause(&self) -> Result<()> {
        self.set_paused(true).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.set_paused(false).await
    }

    async fn set_paused(&self, paused: bool) -> Result<()> {
        StateRepository::from(&self.db).set_paused(paused).await.or_raise(|| ErrorKind::Store)?;
        if let Some(worker) = self.worker.lock().await.as_ref() {
            let next = if paused { Control::Paused } else { Control::Running };
            worker.control.send_if_modified(|current| {
                let changed = *current != Control::Stopping && *current != next;
                if changed {
                    *current = next;
                }
                changed
            });
        }
        tracing::info!(paused, "enrichment gate updated");
        Ok(())
    }

    /// Ask the worker to exit and wait for it. An entry being enriched is
    /// finished and recorded first.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().await.take() else {
            return Ok(());
        };
        worker.control.send_replace(Control::Stopping);
        if let Err(err) = worker.task.await {
            tracing::error!(error = %err, "enrichment worker did not exit cleanly");
        }
        StateRepository::from(&self.db).set_running(false).await.or_raise(|| ErrorKind::Store)?;
        tracing::info!("enrichment worker stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    pub async fn progress(&self) -> Result<Progress> {
        let state = StateRepository::from(&self.db).load().await.or_raise(|| ErrorKind::Store)?;
        let queue_remaining = Queue::from(&self.db).remaining().await.or_raise(|| ErrorKind::Store)?;
        Ok(Progress {
            running: self.is_running().await,
            paused: state.paused,
            processed: state.processed,
            succeeded: state.succeeded,
            failed: state.failed,
            queue_remaining,
            started_at: state.started_at,
        })
    }
}
impl Drop for Scheduler {
    fn drop(&mut self) {
        // Without a stop() the task still winds down, just unobserved.
        if let Some(worker) = self.worker.get_mut().as_ref() {
            worker.control.send_replace(Control::Stopping);
        }
    }
}

async fn run(
    queue: Queue,
    options: SchedulerOptions,
    client: Arc<dyn EnrichmentClient>,
    mut control: watch::Receiver<Control>,
) {
    let mut next_call: Option<Instant> = None;
    loop {
        let current = *control.borrow_and_update();
        match current {
            Control::Stopping => break,
            Control::Paused => {
                if control.changed().await.is_err() {
                    break;
                }
                continue;
            },
            Control::Running => {},
        }
        if let Some(ready) = next_call.filter(|ready| *ready > Instant::now()) {
            // Any control change goes back through the gate; the deadline stays.
            tokio::select! {
                _ = sleep_until(ready) => {},
                changed = control.changed() => {
                    if changed.is_err() {
                        break;
                    }
                },
            }
            continue;
        }

        let entry = match queue.next().await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                if !idle(&mut control, options.idle_poll).await {
                    break;
                }
                continue;
            },
            Err(err) => {
                tracing::warn!(error = ?err, "could not read the enrichment queue");
                if !idle(&mut control, options.idle_poll).await {
                    break;
                }
                continue;
            },
        };
        enrich(&queue, client.as_ref(), &entry, options.retry_ceiling).await;
        next_call = Some(Instant::now() + options.min_interval);
    }
    tracing::debug!("enrichment loop exited");
}

/// Sleep for `period` or until the control state changes. `false` once the
/// scheduler is gone.
async fn idle(control: &mut watch::Receiver<Control>, period: Duration) -> bool {
    tokio::select! {
        _ = sleep(period) => true,
        changed = control.changed() => changed.is_ok(),
    }
}

#[instrument(skip_all, fields(entry = entry.id.get(), client = client.name()))]
async fn enrich(queue: &Queue, client: &dyn EnrichmentClient, entry: &LibraryEntry, retry_ceiling: u32) {
    let found = client.lookup(&Query::from(entry)).await.and_then(|lookup| match lookup {
        Lookup::Found(enrichment) => Ok(enrichment),
        Lookup::NotFound => Err(exn::Exn::new(ErrorKind::NotFound)),
    });
    let outcome = match found {
        Ok(enrichment) => Outcome::Enriched { metadata: enrichment.metadata, verified: enrichment.verified },
        Err(err) => {
            tracing::debug!(error = ?err, "enrichment attempt failed");
            Outcome::Failed
        },
    };
    match queue.complete(entry.id, outcome, retry_ceiling).await {
        Ok(Applied::Enriched(status)) => tracing::info!(%status, "entry enriched"),
        Ok(Applied::Retrying { attempts }) => tracing::debug!(attempts, "entry stays queued"),
        Ok(Applied::GaveUp) => tracing::info!(path = %entry.path.display(), "giving up on entry"),
        Ok(Applied::Skipped) => tracing::debug!("entry changed while it was being enriched"),
        Err(err) => tracing::warn!(error = ?err, "could not record enrichment outcome"),
    }
}
