//! Background dispatch of pipeline jobs
//!
//! Submissions hand a [`PipelineJob`] to a [`Dispatcher`] and return at once.
//! [`WorkerPool`] is the production dispatcher: an unbounded queue drained by
//! a fixed number of tokio worker tasks. Delivery is at-least-once from the
//! orchestrator's point of view; the executor skips jobs whose record has
//! already left `PENDING`.

use crate::observability::metrics::metrics;
use crate::pipeline::PipelineExecutor;
use crate::task::TaskType;
use serde_json::Value;
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Message asking a worker to run one task's pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineJob {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub payload: Value,
}

#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("dispatch queue is closed")]
    Closed,
}

/// Hands jobs to background execution without waiting for them
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: PipelineJob) -> Result<(), DispatchError>;
}

type JobReceiver = Arc<Mutex<mpsc::UnboundedReceiver<PipelineJob>>>;

/// Fixed-size pool of workers consuming a shared job queue
pub struct WorkerPool {
    size: usize,
    sender: StdMutex<Option<mpsc::UnboundedSender<PipelineJob>>>,
    receiver: StdMutex<Option<mpsc::UnboundedReceiver<PipelineJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool; jobs dispatched before [`WorkerPool::start`] are buffered
    pub fn new(size: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            size: size.max(1),
            sender: StdMutex::new(Some(sender)),
            receiver: StdMutex::new(Some(receiver)),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Spawn the workers; calling it again has no effect
    pub async fn start(&self, executor: Arc<PipelineExecutor>) {
        let receiver = match self.receiver.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(receiver) = receiver else {
            warn!("Worker pool already started");
            return;
        };

        let shared: JobReceiver = Arc::new(Mutex::new(receiver));
        let mut handles = self.handles.lock().await;
        for worker_id in 0..self.size {
            let receiver = shared.clone();
            let executor = executor.clone();
            handles.push(tokio::spawn(worker_loop(worker_id, receiver, executor)));
        }
        info!(workers = self.size, "Worker pool started");
    }

    /// Close the queue and wait for workers to drain it
    pub async fn shutdown(&self) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker terminated abnormally: {}", e);
            }
        }
        info!("Worker pool stopped");
    }
}

impl Dispatcher for WorkerPool {
    fn dispatch(&self, job: PipelineJob) -> Result<(), DispatchError> {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let sender = guard.as_ref().ok_or(DispatchError::Closed)?;
        sender.send(job).map_err(|_| DispatchError::Closed)?;
        metrics().job_enqueued();
        Ok(())
    }
}

async fn worker_loop(worker_id: usize, receiver: JobReceiver, executor: Arc<PipelineExecutor>) {
    debug!(worker_id, "Worker waiting for jobs");

    loop {
        let job = { receiver.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        metrics().job_dequeued();

        let task_id = job.task_id;
        let run_executor = executor.clone();
        // A panicking run must not take the worker down with it
        let run = tokio::spawn(async move { run_executor.run(job).await });
        if let Err(e) = run.await {
            error!(worker_id, task_id = %task_id, "Pipeline run aborted: {}", e);
            executor.fail_aborted_run(task_id, &e.to_string()).await;
        }
    }

    debug!(worker_id, "Worker exiting, queue closed");
}
