//! Bounded handoff between connection tasks and workers.
//!
//! The channel is sized at twice the connection slot count: a connection
//! has at most one query in flight, but a reset connection can leave its
//! query behind in the queue. A full channel blocks the producing
//! connection task, which is the intended back-pressure. Workers observe
//! the stop flag while waiting and refuse to consume once it is set;
//! whatever is still queued at teardown is answered FAILED so every
//! pending connection hears back.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::warn;

use super::Query;

/// A query travelling to the workers, with the channel that carries it
/// back to its connection once finished.
pub struct QueuedQuery {
    pub query: Query,
    pub done: oneshot::Sender<Query>,
}

#[derive(Clone)]
pub struct QueryQueue {
    sender: mpsc::Sender<QueuedQuery>,
}

#[derive(Clone)]
pub struct QueueReceiver {
    inner: Arc<Mutex<mpsc::Receiver<QueuedQuery>>>,
}

#[must_use]
pub fn query_queue(capacity: usize) -> (QueryQueue, QueueReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        QueryQueue { sender },
        QueueReceiver {
            inner: Arc::new(Mutex::new(receiver)),
        },
    )
}

impl QueryQueue {
    /// Hand a query to the workers, waiting while the queue is full.
    /// The returned receiver resolves once a worker finished the query.
    ///
    /// # Errors
    /// Fails when the workers have shut down.
    pub async fn enqueue(
        &self,
        query: Query,
    ) -> Result<oneshot::Receiver<Query>, crate::error::QueryManagerError> {
        let (done, completion) = oneshot::channel();
        self.sender
            .send(QueuedQuery { query, done })
            .await
            .map_err(|_| {
                crate::error::QueryManagerError::ConnectionError(
                    "worker queue is shut down".into(),
                )
            })?;
        Ok(completion)
    }
}

impl QueueReceiver {
    /// Take the next query, blocking while the queue is empty. Returns
    /// `None` once the stop flag is raised or every producer is gone.
    pub async fn dequeue(&self, stop: &mut watch::Receiver<bool>) -> Option<QueuedQuery> {
        if *stop.borrow() {
            return None;
        }

        let mut receiver = self.inner.lock().await;
        tokio::select! {
            biased;
            _ = stop.changed() => None,
            item = receiver.recv() => item,
        }
    }

    /// Answer everything still queued with FAILED. Called after the
    /// workers have stopped.
    pub async fn drain(&self) {
        let mut receiver = self.inner.lock().await;
        let mut drained = 0usize;
        while let Ok(QueuedQuery { mut query, done }) = receiver.try_recv() {
            query.failed();
            let _ = done.send(query);
            drained += 1;
        }
        if drained > 0 {
            warn!("failed {drained} queries still queued at shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryStatus;

    #[tokio::test]
    async fn queries_pass_through_in_order() {
        let (queue, receiver) = query_queue(4);
        let (_stop_tx, mut stop_rx) = watch::channel(false);

        let first = queue.enqueue(Query::new(vec![1], 64)).await.unwrap();
        let second = queue.enqueue(Query::new(vec![2], 64)).await.unwrap();

        let got = receiver.dequeue(&mut stop_rx).await.unwrap();
        assert_eq!(got.query.kind_code(), 1);
        let mut query = got.query;
        query.ok();
        got.done.send(query).unwrap();

        let got = receiver.dequeue(&mut stop_rx).await.unwrap();
        assert_eq!(got.query.kind_code(), 2);
        let mut query = got.query;
        query.failed();
        got.done.send(query).unwrap();

        assert_eq!(first.await.unwrap().status, QueryStatus::Ok);
        assert_eq!(second.await.unwrap().status, QueryStatus::Failed);
    }

    #[tokio::test]
    async fn stop_flag_unblocks_waiting_consumer() {
        let (_queue, receiver) = query_queue(4);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let waiter = tokio::spawn(async move { receiver.dequeue(&mut stop_rx).await });
        tokio::task::yield_now().await;
        stop_tx.send(true).unwrap();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn raised_stop_flag_refuses_queued_work() {
        let (queue, receiver) = query_queue(4);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let _completion = queue.enqueue(Query::new(vec![1], 64)).await.unwrap();
        stop_tx.send(true).unwrap();
        assert!(receiver.dequeue(&mut stop_rx).await.is_none());
    }

    #[tokio::test]
    async fn drain_answers_leftovers_with_failed() {
        let (queue, receiver) = query_queue(4);
        let completion = queue.enqueue(Query::new(vec![1], 64)).await.unwrap();
        receiver.drain().await;
        assert_eq!(completion.await.unwrap().status, QueryStatus::Failed);
    }

    #[tokio::test]
    async fn full_queue_blocks_the_producer() {
        let (queue, receiver) = query_queue(1);
        let (_stop_tx, mut stop_rx) = watch::channel(false);

        let _first = queue.enqueue(Query::new(vec![1], 64)).await.unwrap();
        // The second enqueue cannot complete until a consumer makes room.
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            queue.enqueue(Query::new(vec![2], 64)),
        )
        .await;
        assert!(blocked.is_err());

        let _ = receiver.dequeue(&mut stop_rx).await.unwrap();
        let unblocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            queue.enqueue(Query::new(vec![3], 64)),
        )
        .await;
        assert!(unblocked.is_ok());
    }
}
