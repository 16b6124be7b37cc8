//! The loopback listener and server lifecycle.
//!
//! Binding to 127.0.0.1 is what keeps the cleartext protocol private to
//! the machine; accepted peers are re-checked anyway as defense in
//! depth. Connection slots are a hard cap: when every slot is taken new
//! sockets are closed immediately. Shutdown stops the workers first so
//! in-flight handlers finish, then the connections, then the caches.

pub mod auth;
mod connection;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::QueryManagerError;
use crate::hostcache::HostCache;
use crate::query::queue::{QueryQueue, QueueReceiver, query_queue};
use crate::query::worker::{SharedHostCache, WorkerPool};

use connection::{ConnectionContext, serve_connection};

pub struct QueryManagerServer {
    local_addr: std::net::SocketAddr,
    shutdown: watch::Sender<bool>,
    workers: WorkerPool,
    queue_receiver: QueueReceiver,
    accept_task: JoinHandle<()>,
}

impl QueryManagerServer {
    /// Bring up the worker pool and the listener. Fails when any worker
    /// cannot open its database session or the port cannot be bound.
    ///
    /// # Errors
    /// Propagates worker start-up and bind failures.
    pub async fn start(config: Config) -> Result<QueryManagerServer, QueryManagerError> {
        config.validate()?;
        let config = Arc::new(config);

        let hosts: SharedHostCache = Arc::new(tokio::sync::Mutex::new(HostCache::new(
            config.max_cached_host_names,
            config.host_name_expire_time(),
        )));

        let (queue, queue_receiver) = query_queue(config.queue_capacity());
        let workers = WorkerPool::start(config.clone(), queue_receiver.clone(), hosts).await?;

        let listener = TcpListener::bind(("127.0.0.1", config.query_manager_port)).await?;
        let local_addr = listener.local_addr()?;
        info!("listening on {local_addr}");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            config.clone(),
            queue,
            shutdown_rx,
        ));

        Ok(QueryManagerServer {
            local_addr,
            shutdown,
            workers,
            queue_receiver,
            accept_task,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Run until SIGINT or SIGTERM, then shut down cleanly.
    ///
    /// # Errors
    /// Propagates signal-handler installation failures.
    pub async fn run_until_shutdown(self) -> Result<(), QueryManagerError> {
        wait_for_signal().await?;
        info!("shutting down");
        self.shutdown().await;
        Ok(())
    }

    /// Stop the workers (in-flight handlers run to completion), then
    /// the connections, answering whatever was still queued with
    /// FAILED.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.workers.shutdown().await;
        self.queue_receiver.drain().await;
        let _ = self.accept_task.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<Config>,
    queue: QueryQueue,
    shutdown: watch::Receiver<bool>,
) {
    let slots = Arc::new(Semaphore::new(config.max_connections));
    let mut shutdown_accept = shutdown.clone();

    loop {
        let accepted = tokio::select! {
            _ = shutdown_accept.changed() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let Ok(permit) = slots.clone().try_acquire_owned() else {
                    error!(
                        "rejecting connection {peer}: max number of connections reached ({})",
                        config.max_connections
                    );
                    continue;
                };

                let ctx = ConnectionContext {
                    config: config.clone(),
                    queue: queue.clone(),
                    shutdown: shutdown.clone(),
                };
                tokio::spawn(async move {
                    serve_connection(stream, peer, ctx).await;
                    drop(permit);
                });
            }
            Err(e) => {
                warn!("failed to accept connection: {e}");
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<(), QueryManagerError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => info!("received SIGINT"),
        _ = terminate.recv() => info!("received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<(), QueryManagerError> {
    tokio::signal::ctrl_c().await?;
    info!("received interrupt");
    Ok(())
}
