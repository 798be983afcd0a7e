//! Index job queue.
//!
//! Jobs go through an unbounded channel to a fixed set of worker tasks. A
//! library stays in the active set from the moment it is queued until its
//! run finishes, so at most one run per library is ever queued or running.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rh_core::{LibraryId, Result};
use rh_db::pool::{get_conn, DbPool};
use rh_db::queries::libraries;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::indexer::{IndexMode, LibraryIndexer};

#[derive(Debug, Clone, Copy)]
struct IndexJob {
    library_id: LibraryId,
    mode: IndexMode,
}

pub struct IndexScheduler {
    db: DbPool,
    tx: mpsc::UnboundedSender<IndexJob>,
    active: Arc<DashMap<LibraryId, IndexMode>>,
    cancel: CancellationToken,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl IndexScheduler {
    /// Spawn `workers` index workers. They stop when `cancel` fires.
    pub fn start(
        indexer: Arc<LibraryIndexer>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<IndexJob>();
        let rx = Arc::new(Mutex::new(rx));
        let active = Arc::new(DashMap::new());

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    indexer.clone(),
                    rx.clone(),
                    active.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        Arc::new(Self {
            db: indexer.db().clone(),
            tx,
            active,
            cancel,
            handles: std::sync::Mutex::new(handles),
        })
    }

    /// Queue a run. Returns `false` if the library is already queued or
    /// running, or the scheduler is shut down.
    pub fn enqueue(&self, library_id: LibraryId, mode: IndexMode) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        match self.active.entry(library_id) {
            Entry::Occupied(_) => {
                tracing::debug!(library_id = %library_id, "Index already in flight");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(mode);
            }
        }

        if let Err(e) = self.mark_started(library_id) {
            tracing::warn!(library_id = %library_id, error = %e, "Failed to mark index started");
        }

        if self.tx.send(IndexJob { library_id, mode }).is_err() {
            self.active.remove(&library_id);
            tracing::warn!(library_id = %library_id, "Index queue closed");
            return false;
        }

        tracing::info!(library_id = %library_id, mode = %mode, "Index queued");
        true
    }

    /// Queue every library. Returns how many were queued.
    pub fn enqueue_all(&self, mode: IndexMode) -> Result<usize> {
        let ids: Vec<LibraryId> = {
            let conn = get_conn(&self.db)?;
            libraries::list_libraries(&conn)?
                .into_iter()
                .map(|l| l.id)
                .collect()
        };
        Ok(ids
            .into_iter()
            .filter(|id| self.enqueue(*id, mode))
            .count())
    }

    pub fn is_active(&self, library_id: LibraryId) -> bool {
        self.active.contains_key(&library_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Wait until nothing is queued or running.
    pub async fn wait_idle(&self) {
        while !self.active.is_empty() && !self.cancel.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Quick-index every library each `interval`, starting one interval
    /// from now.
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = scheduler.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match scheduler.enqueue_all(IndexMode::Quick) {
                            Ok(n) => tracing::debug!(queued = n, "Periodic index"),
                            Err(e) => tracing::error!(error = %e, "Periodic index failed"),
                        }
                    }
                }
            }
        })
    }

    /// Wait for the workers to exit. Call after cancelling.
    pub async fn join(&self) {
        let handles = self
            .handles
            .lock()
            .map(|mut h| std::mem::take(&mut *h))
            .unwrap_or_default();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Index worker panicked");
            }
        }
    }

    fn mark_started(&self, library_id: LibraryId) -> Result<()> {
        let conn = get_conn(&self.db)?;
        libraries::mark_index_started(&conn, library_id, &Utc::now().to_rfc3339())?;
        Ok(())
    }
}

async fn run_worker(
    worker: usize,
    indexer: Arc<LibraryIndexer>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<IndexJob>>>,
    active: Arc<DashMap<LibraryId, IndexMode>>,
    cancel: CancellationToken,
) {
    tracing::debug!(worker, "Index worker started");

    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        indexer.run(job.library_id, job.mode, &cancel).await;
        active.remove(&job.library_id);
    }

    tracing::debug!(worker, "Index worker stopped");
}
