use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::config::{Options, ResourceConfig};
use crate::error::Result;
use crate::job::Job;

use super::classify::{classify, Classification, ProcessingError};
use super::evaluate::{enough_nodes, evaluate};
use super::extract::{extract, ExtractionOutcome, LogExtractor};

/// Key/value annotations accumulated while one job runs and handed verbatim
/// to the outcome sink. Keys are only ever added, never removed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RunMetadata(BTreeMap<String, Value>);

impl RunMetadata {
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// Analysis engine built per job from the resource's plugin set. External
/// collaborator; only the calls the runner makes are specified here.
pub trait AnalysisEngine: Send {
    /// Run the analysis. Only called when enough node data is present.
    fn process(&mut self) -> Result<()>;

    /// The engine's own judgment of whether it produced a usable summary.
    /// False when [`process`](Self::process) never ran.
    fn good_enough(&self) -> bool;

    /// Computed metrics for the outcome sink to persist.
    fn metrics(&self) -> Value;
}

/// Builds one [`AnalysisEngine`] per job.
pub trait EngineFactory: Send + Sync {
    fn build(&self, job: &Job) -> Box<dyn AnalysisEngine>;
}

/// Persistent job-outcome log. Must tolerate concurrent writers and
/// out-of-order completion across jobs.
pub trait OutcomeSink: Send + Sync {
    /// Persist the computed metrics together with the run metadata.
    fn process(&self, engine: &dyn AnalysisEngine, metadata: &RunMetadata) -> Result<()>;

    /// Record the final verdict for a job. Called at most once per job.
    fn mark_as_done(
        &self,
        job: &Job,
        success: bool,
        elapsed_secs: f64,
        error: Option<ProcessingError>,
    ) -> Result<()>;
}

/// What the worker loop reports after one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub local_job_id: String,
    pub success: bool,
    pub error: Option<ProcessingError>,
    /// An unexpected failure was caught and logged instead of propagating.
    pub contained_failure: bool,
}

impl JobReport {
    fn contained(local_job_id: String) -> Self {
        Self {
            local_job_id,
            success: false,
            error: None,
            contained_failure: true,
        }
    }
}

/// Runs the whole pipeline for one job: classify, extract, analyze,
/// evaluate, log, clean up.
pub struct JobRunner {
    options: Arc<Options>,
    resource: Arc<ResourceConfig>,
    extractor: Arc<dyn LogExtractor>,
    engines: Arc<dyn EngineFactory>,
    sink: Arc<dyn OutcomeSink>,
}

impl JobRunner {
    pub fn new(
        options: Arc<Options>,
        resource: Arc<ResourceConfig>,
        extractor: Arc<dyn LogExtractor>,
        engines: Arc<dyn EngineFactory>,
        sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        Self {
            options,
            resource,
            extractor,
            engines,
            sink,
        }
    }

    /// Process one job to completion. Never returns an error: unexpected
    /// failures are logged with the job id and contained here, so one bad
    /// job cannot take the worker down.
    ///
    /// The working directory is removed on every exit path, after outcome
    /// logging, unless deletion is disabled or the job has no directory.
    pub fn run(&self, job: Job) -> JobReport {
        let _cleanup = WorkdirCleanup::new(&job, &self.options);

        match self.process(&job) {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(
                    job_id = %job.local_job_id,
                    workdir = ?job.workdir,
                    error = %err,
                    "failure while summarizing job"
                );
                JobReport::contained(job.local_job_id.clone())
            }
        }
    }

    fn process(&self, job: &Job) -> Result<JobReport> {
        let started = Instant::now();
        let mut metadata = RunMetadata::default();

        let classification = classify(job, &self.options);
        let outcome = match classification {
            Classification::Proceed => {
                extract(self.extractor.as_ref(), job, &self.resource, &self.options)
            }
            Classification::Skip {
                reason,
                missing_nodes,
            } => {
                metadata.set(reason.metadata_key(), true);
                tracing::info!(job_id = %job.local_job_id, reason = %reason, "skipping job");
                ExtractionOutcome::skipped(missing_nodes)
            }
        };
        let merge_secs = started.elapsed().as_secs_f64();

        if self.options.extract_only {
            // Extraction is the whole task: no analysis, no outcome
            // logging, and deletion was disabled by option resolution.
            return Ok(JobReport {
                local_job_id: job.local_job_id.clone(),
                success: outcome.merge_result == 0,
                error: None,
                contained_failure: false,
            });
        }

        let mut engine = self.engines.build(job);
        let enough = enough_nodes(&outcome, job.nodecount);
        if enough {
            tracing::info!(
                job_id = %job.local_job_id,
                missing = outcome.missing_nodes,
                nodes = job.nodecount,
                "enough node data, running analysis"
            );
            engine.process()?;
        }

        let verdict = evaluate(
            &classification,
            &outcome,
            enough && engine.good_enough(),
            job.nodecount,
            job.end_time,
            Utc::now(),
            self.options.force_timeout_secs,
        );

        if let Some(
            reason @ (ProcessingError::PmlogextractError | ProcessingError::SummarizationError),
        ) = verdict.error
        {
            metadata.set(reason.metadata_key(), true);
            tracing::info!(job_id = %job.local_job_id, reason = %reason, "skipping job");
        }
        metadata.set("mergetime", merge_secs);
        if let Some(tag) = &self.options.tag {
            metadata.set("tag", tag.as_str());
        }
        if outcome.missing_nodes > 0 {
            metadata.set("missingnodes", outcome.missing_nodes);
        }

        self.sink.process(engine.as_ref(), &metadata)?;
        self.sink.mark_as_done(
            job,
            verdict.recorded_success(),
            started.elapsed().as_secs_f64(),
            verdict.error,
        )?;

        Ok(JobReport {
            local_job_id: job.local_job_id.clone(),
            success: verdict.recorded_success(),
            error: verdict.error,
            contained_failure: false,
        })
    }
}

/// Removes the job's working directory when dropped, so cleanup happens on
/// every exit path of the per-job processing block, after outcome logging.
struct WorkdirCleanup {
    path: Option<PathBuf>,
}

impl WorkdirCleanup {
    fn new(job: &Job, options: &Options) -> Self {
        let path = if options.dodelete {
            job.workdir.clone()
        } else {
            None
        };
        Self { path }
    }
}

impl Drop for WorkdirCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if path.exists() {
                if let Err(err) = fs::remove_dir_all(&path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to remove job working directory"
                    );
                }
            }
        }
    }
}
