//! Master/worker pool that distributes jobs over point-to-point channels.
//!
//! One dispatcher task owns the job stream and performs pull-based flow
//! control: a worker's completion report is itself the signal to send that
//! worker its next job, so faster workers naturally receive more jobs. No
//! job is ever sent to more than one worker and there is no work stealing.
//!
//! # Ranks
//!
//! The dispatcher is rank 0; workers are ranks `1..=N`. Each worker has its
//! own job channel (capacity 1), and all workers share one completion
//! channel back to the dispatcher, which gives the dispatcher the
//! source-agnostic "whichever worker finishes first" receive.

pub mod dispatcher;
pub mod worker;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Options;
use crate::error::Result;
use crate::job::Job;
use crate::pipeline::runner::JobRunner;

use dispatcher::Dispatcher;
use worker::Worker;

pub use dispatcher::PoolStats;

/// Message from the dispatcher to a worker. `Shutdown` is the sentinel of
/// the shutdown handshake and is sent exactly once per worker.
#[derive(Debug)]
pub enum WorkerMessage {
    Job(Box<Job>),
    Shutdown,
}

/// Completion report from a worker back to the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct CompletionReport {
    /// Rank of the reporting worker.
    pub worker: usize,
}

/// The assembled pool: one dispatcher plus the spawned worker tasks.
pub struct SummarizerPool {
    dispatcher: Dispatcher,
    workers: Vec<JoinHandle<()>>,
}

impl SummarizerPool {
    /// Spawn the worker tasks and wire up the channels.
    pub fn new(
        options: Arc<Options>,
        runner: Arc<JobRunner>,
        cancel: CancellationToken,
    ) -> Self {
        let worker_count = options.workers;
        let (completion_tx, completion_rx) = mpsc::channel(worker_count.max(1));

        let mut senders = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for rank in 1..=worker_count {
            // Capacity 1: a worker holds at most one queued job handle.
            let (job_tx, job_rx) = mpsc::channel(1);
            senders.push(job_tx);
            let worker = Worker::new(rank, job_rx, completion_tx.clone(), runner.clone());
            workers.push(tokio::spawn(worker.run()));
        }

        Self {
            dispatcher: Dispatcher::new(senders, completion_rx, cancel),
            workers,
        }
    }

    /// Drive the dispatcher over the job stream, then join the workers.
    pub async fn run(self, jobs: impl Iterator<Item = Job>) -> Result<PoolStats> {
        let stats = self.dispatcher.run(jobs).await?;
        for handle in self.workers {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "worker task failed");
            }
        }
        Ok(stats)
    }
}
