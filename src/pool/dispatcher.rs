use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::diag;
use crate::error::{Result, SummarizeError};
use crate::job::Job;

use super::{CompletionReport, WorkerMessage};

/// Steady-state dispatch counts at which the dispatcher snapshots the
/// process table. The first checkpoint fires once every rank is busy.
const PROCLIST_CHECKPOINTS: [u64; 2] = [1, 1000];

/// Dispatcher counters. After the drain phase `sent == received` holds for
/// every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub sent: u64,
    pub received: u64,
}

/// Rank 0: owns the job stream and drives the dispatch protocol.
pub struct Dispatcher {
    senders: Vec<mpsc::Sender<WorkerMessage>>,
    completions: mpsc::Receiver<CompletionReport>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        senders: Vec<mpsc::Sender<WorkerMessage>>,
        completions: mpsc::Receiver<CompletionReport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            senders,
            completions,
            cancel,
        }
    }

    /// Run the dispatch protocol: fill every worker, then hand each further
    /// job to whichever worker reports completion first, drain the in-flight
    /// work once the stream is exhausted, and send one shutdown sentinel per
    /// worker.
    pub async fn run(mut self, jobs: impl Iterator<Item = Job>) -> Result<PoolStats> {
        let workers = self.senders.len() as u64;
        let mut stats = PoolStats::default();
        let mut waits = 0u64;

        tracing::debug!(workers, "dispatcher starting");

        for job in jobs {
            if self.cancel.is_cancelled() {
                tracing::info!("shutdown requested, no further jobs will be dispatched");
                break;
            }

            if stats.sent < workers {
                // Fill phase: one job to each worker in turn.
                let index = stats.sent as usize;
                self.send(index, job).await?;
                stats.sent += 1;
                tracing::debug!(
                    sent = stats.sent,
                    received = stats.received,
                    "initial batch"
                );
            } else {
                waits += 1;
                if PROCLIST_CHECKPOINTS.contains(&waits) {
                    diag::dump_process_table(0, waits);
                }

                // Pull-based balancing: the first worker to finish gets the
                // next job.
                let report = self.recv_completion().await?;
                stats.received += 1;
                self.send(report.worker - 1, job).await?;
                stats.sent += 1;
                tracing::debug!(
                    sent = stats.sent,
                    received = stats.received,
                    worker = report.worker,
                    "sent next job"
                );
            }
        }

        tracing::info!(
            sent = stats.sent,
            received = stats.received,
            "all jobs sent"
        );

        // Drain phase: collect reports for everything still in flight.
        while stats.received < stats.sent {
            self.recv_completion().await?;
            stats.received += 1;
            tracing::debug!(
                sent = stats.sent,
                received = stats.received,
                "drained completion"
            );
        }

        // Shutdown handshake: exactly one sentinel per worker.
        for (index, sender) in self.senders.iter().enumerate() {
            tracing::debug!(worker = index + 1, "shutting down worker");
            if sender.send(WorkerMessage::Shutdown).await.is_err() {
                tracing::warn!(worker = index + 1, "worker exited before shutdown message");
            }
        }

        Ok(stats)
    }

    async fn send(&self, index: usize, job: Job) -> Result<()> {
        self.senders[index]
            .send(WorkerMessage::Job(Box::new(job)))
            .await
            .map_err(|_| {
                SummarizeError::ChannelClosed(format!("worker {} is gone", index + 1))
            })
    }

    async fn recv_completion(&mut self) -> Result<CompletionReport> {
        self.completions
            .recv()
            .await
            .ok_or_else(|| SummarizeError::ChannelClosed("all workers are gone".to_string()))
    }
}
