//! Fixed-size worker pool over a bounded queue.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 100,
        }
    }
}

impl WorkerPool {
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Feeds every job through the queue and returns once all workers have
    /// drained it. Handler failures are the handler's business; a panicking
    /// worker is logged and the rest keep going.
    pub async fn run<J, I, F, Fut>(&self, jobs: I, handler: F)
    where
        J: Send + 'static,
        I: IntoIterator<Item = J>,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<J>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let handler = Arc::new(handler);

        let mut set = JoinSet::new();
        for worker in 0..self.workers {
            let rx = rx.clone();
            let handler = handler.clone();
            set.spawn(async move {
                loop {
                    // Hold the lock only while waiting for the next job.
                    let next = rx.lock().await.recv().await;
                    match next {
                        Some(job) => handler(job).await,
                        None => break,
                    }
                }
                debug!(worker, "worker drained");
            });
        }

        for job in jobs {
            if tx.send(job).await.is_err() {
                error!("all workers gone, remaining jobs dropped");
                break;
            }
        }
        drop(tx);

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "worker task failed");
            }
        }
    }
}
