use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::diag;
use crate::job::Job;
use crate::pipeline::runner::{JobReport, JobRunner};

use super::{CompletionReport, WorkerMessage};

/// Immediate re-polls before the idle loop backs off to sleeping.
const RECV_SPIN_LIMIT: u32 = 1000;
/// Sleep between polls once the spin limit is reached. Keeps an idle worker
/// around 1% of a core without materially delaying the next job.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(1);
/// Warn when the handoff from completion report to next job exceeds this.
const SLOW_HANDOFF: Duration = Duration::from_secs(2);

/// Processed-job counts at which a worker snapshots the process table.
const PROCLIST_CHECKPOINTS: [u64; 2] = [1, 10];

/// One worker rank: waits for a job handle, runs it to completion, reports
/// back. Processes exactly one job at a time.
pub struct Worker {
    rank: usize,
    jobs: mpsc::Receiver<WorkerMessage>,
    completions: mpsc::Sender<CompletionReport>,
    runner: Arc<JobRunner>,
}

impl Worker {
    pub fn new(
        rank: usize,
        jobs: mpsc::Receiver<WorkerMessage>,
        completions: mpsc::Sender<CompletionReport>,
        runner: Arc<JobRunner>,
    ) -> Self {
        Self {
            rank,
            jobs,
            completions,
            runner,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(rank = self.rank, "worker starting");
        let mut processed = 0u64;
        let mut reported_at: Option<Instant> = None;

        loop {
            let message = match self.next_message().await {
                Some(message) => message,
                // Dispatcher gone; nothing more will arrive.
                None => break,
            };

            let job = match message {
                WorkerMessage::Job(job) => *job,
                WorkerMessage::Shutdown => {
                    tracing::debug!(rank = self.rank, "received shutdown message");
                    break;
                }
            };

            if let Some(at) = reported_at.take() {
                let handoff = at.elapsed();
                if handoff > SLOW_HANDOFF {
                    tracing::warn!(
                        rank = self.rank,
                        handoff_secs = handoff.as_secs_f64(),
                        "slow dispatcher handoff"
                    );
                }
            }

            let report = self.process(job).await;
            processed += 1;
            tracing::debug!(
                rank = self.rank,
                job_id = %report.local_job_id,
                success = report.success,
                "finished job"
            );

            if self
                .completions
                .send(CompletionReport { worker: self.rank })
                .await
                .is_err()
            {
                tracing::warn!(rank = self.rank, "dispatcher is gone, stopping");
                break;
            }
            reported_at = Some(Instant::now());

            if PROCLIST_CHECKPOINTS.contains(&processed) {
                diag::dump_process_table(self.rank, processed);
            }
        }

        tracing::debug!(rank = self.rank, processed, "worker finished");
    }

    /// Poll for the next message without blocking: a bounded spin of
    /// immediate re-polls, then a fixed sleep between polls while idle.
    async fn next_message(&mut self) -> Option<WorkerMessage> {
        let mut spins = 0u32;
        loop {
            match self.jobs.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Empty) => {
                    if spins < RECV_SPIN_LIMIT {
                        spins += 1;
                    } else {
                        tokio::time::sleep(RECV_POLL_INTERVAL).await;
                    }
                }
                Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Run one job on the blocking thread pool. A panic in the runner is
    /// contained here, the same way the runner contains its own errors.
    async fn process(&self, job: Job) -> JobReport {
        tracing::debug!(rank = self.rank, job_id = %job.local_job_id, "starting job");
        let local_job_id = job.local_job_id.clone();
        let runner = self.runner.clone();
        match tokio::task::spawn_blocking(move || runner.run(job)).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(
                    rank = self.rank,
                    job_id = %local_job_id,
                    error = %err,
                    "job processing panicked"
                );
                JobReport {
                    local_job_id,
                    success: false,
                    error: None,
                    contained_failure: true,
                }
            }
        }
    }
}
