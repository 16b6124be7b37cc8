//! The worker pool.
//!
//! Each worker task owns one database session, opened before the pool
//! reports ready; a worker that cannot connect aborts start-up. Workers
//! dequeue, dispatch by query type and retry handlers that leave the
//! status PENDING, with a checkpoint before every attempt so a broken
//! session reconnects instead of failing the query outright.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::DatabaseSession;
use crate::error::QueryManagerError;
use crate::hostcache::HostCache;
use crate::query::queue::{QueueReceiver, QueuedQuery};
use crate::query::{Query, QueryStatus};

use super::handlers;

pub type SharedHostCache = Arc<tokio::sync::Mutex<HostCache>>;

pub struct WorkerPool {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Open one database session per worker and start the workers.
    /// Fails start-up when any session cannot be opened.
    ///
    /// # Errors
    /// Propagates the first session-open failure.
    pub async fn start(
        config: Arc<Config>,
        queue: QueueReceiver,
        hosts: SharedHostCache,
    ) -> Result<WorkerPool, QueryManagerError> {
        let first = DatabaseSession::open(&config).await?;
        let worker_count = config.query_worker_threads.min(first.max_concurrency()).max(1);
        if worker_count < config.query_worker_threads {
            warn!(
                "clamping {} worker threads to the backend limit of {worker_count}",
                config.query_worker_threads
            );
        }

        let mut sessions = vec![first];
        for _ in 1..worker_count {
            sessions.push(DatabaseSession::open(&config).await?);
        }

        let (stop, _) = watch::channel(false);
        let mut handles = Vec::with_capacity(worker_count);
        for (worker_id, session) in sessions.into_iter().enumerate() {
            let config = config.clone();
            let queue = queue.clone();
            let hosts = hosts.clone();
            let stop_rx = stop.subscribe();
            handles.push(tokio::spawn(async move {
                run_worker(worker_id, session, config, queue, hosts, stop_rx).await;
            }));
        }

        Ok(WorkerPool { stop, handles })
    }

    /// Raise the stop flag and wait for every worker to finish its
    /// current query and close its session.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn run_worker(
    worker_id: usize,
    mut db: DatabaseSession,
    config: Arc<Config>,
    queue: QueueReceiver,
    hosts: SharedHostCache,
    mut stop: watch::Receiver<bool>,
) {
    info!("worker#{worker_id}: active");
    while let Some(QueuedQuery { mut query, done }) = queue.dequeue(&mut stop).await {
        process_query(worker_id, &mut db, &config, &hosts, &mut query).await;
        // The connection may be gone; its query is simply dropped then.
        let _ = done.send(query);
    }
    info!("worker#{worker_id}: done");
    db.close().await;
}

/// Run one query to a terminal status. PENDING outcomes are retried up
/// to the configured attempt count; whatever is still PENDING after
/// that becomes FAILED.
async fn process_query(
    worker_id: usize,
    db: &mut DatabaseSession,
    config: &Config,
    hosts: &SharedHostCache,
    query: &mut Query,
) {
    query.status = QueryStatus::Pending;

    if let Some(kind) = query.kind() {
        if db.checkpoint().await {
            let mut attempts = config.query_max_attempts.max(1);
            loop {
                if let Err(e) = handlers::dispatch(db, hosts, kind, query).await {
                    warn!("worker#{worker_id}: query {} failed: {e}", kind.name());
                }
                // A handler that bailed out mid-transaction must not
                // leak the transaction into the next attempt.
                if db.in_transaction() {
                    if let Err(e) = db.rollback().await {
                        warn!("worker#{worker_id}: rollback failed: {e}");
                    }
                }

                attempts -= 1;
                if query.status != QueryStatus::Pending
                    || attempts == 0
                    || !db.checkpoint().await
                {
                    break;
                }

                // Queries failing repeatedly usually mean trouble with
                // the query itself, so make the retries visible.
                warn!(
                    "worker#{worker_id}: query {} left pending, retrying",
                    kind.name()
                );
            }
        }
    } else {
        error!(
            "worker#{worker_id}: unknown query type {}",
            query.kind_code()
        );
    }

    if query.status == QueryStatus::Pending {
        query.failed();
    }
}
