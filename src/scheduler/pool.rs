//! Bounded worker pool.
//!
//! # Responsibilities
//! - Queue tasks in a bounded channel
//! - Run them on a fixed number of worker tasks
//! - Drain with a deadline on shutdown
//!
//! # Design Decisions
//! - `try_send` for admission: full means reject, never wait
//! - Workers share one receiver behind an async mutex
//! - After the deadline, workers stop pulling and the remaining queue is
//!   handed back to the caller instead of being executed late

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::scheduler::task::RequestTask;
use crate::scheduler::{RejectReason, ScheduleError, Scheduler};

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<RequestTask>>>;

#[derive(Debug)]
pub struct WorkerPool {
    name: String,
    workers: usize,
    capacity: usize,
    tx: Mutex<Option<mpsc::Sender<RequestTask>>>,
    rx: SharedReceiver,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `workers` workers over a queue of `capacity` tasks.
    pub fn new(name: &str, workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let stop = Arc::new(AtomicBool::new(false));

        let handles = (0..workers)
            .map(|id| tokio::spawn(worker_loop(name.to_string(), id, rx.clone(), stop.clone())))
            .collect();

        tracing::info!(scheduler = %name, workers, capacity, "Worker pool started");

        Self {
            name: name.to_string(),
            workers,
            capacity,
            tx: Mutex::new(Some(tx)),
            rx,
            handles: Mutex::new(handles),
            stop,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

async fn worker_loop(name: String, id: usize, rx: SharedReceiver, stop: Arc<AtomicBool>) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            if stop.load(Ordering::Acquire) {
                break;
            }
            rx.recv().await
        };
        match next {
            Some(task) => task.run().await,
            None => break,
        }
    }
    tracing::debug!(scheduler = %name, worker = id, "Worker exited");
}

impl Scheduler for WorkerPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self, task: RequestTask) -> Result<(), ScheduleError> {
        let guard = self.tx.lock().expect("pool sender mutex poisoned");
        let Some(tx) = guard.as_ref() else {
            return Err(ScheduleError::rejected(&self.name, RejectReason::ShuttingDown, task));
        };
        tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(task) => {
                ScheduleError::rejected(&self.name, RejectReason::QueueFull, task)
            }
            mpsc::error::TrySendError::Closed(task) => {
                ScheduleError::rejected(&self.name, RejectReason::ShuttingDown, task)
            }
        })
    }

    fn shutdown(&self, timeout: Duration) -> BoxFuture<'_, Vec<RequestTask>> {
        Box::pin(async move {
            // Dropping the sender lets workers exit once the queue is empty.
            self.tx.lock().expect("pool sender mutex poisoned").take();
            let handles =
                std::mem::take(&mut *self.handles.lock().expect("pool handles mutex poisoned"));

            if tokio::time::timeout(timeout, join_all(handles)).await.is_ok() {
                tracing::info!(scheduler = %self.name, "Worker pool drained");
                return Vec::new();
            }

            self.stop.store(true, Ordering::Release);
            let mut rx = self.rx.lock().await;
            let mut leftover = Vec::new();
            while let Ok(task) = rx.try_recv() {
                leftover.push(task);
            }
            tracing::warn!(
                scheduler = %self.name,
                leftover = leftover.len(),
                timeout_ms = timeout.as_millis() as u64,
                "Worker pool drain timed out"
            );
            leftover
        })
    }
}
