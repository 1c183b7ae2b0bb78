use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One HPC batch job whose performance archives are to be summarized.
///
/// Constructed by the job-selection query and consumed exactly once:
/// ownership moves from the dispatcher to a single worker, so no two workers
/// ever hold the same job or touch the same working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub local_job_id: String,
    pub resource: String,
    pub nodecount: i64,
    /// Wall-clock duration in seconds.
    pub walltime_secs: f64,
    /// When the job finished on the cluster.
    pub end_time: DateTime<Utc>,
    /// Working directory holding this job's merged archives. Removed by the
    /// runner after processing when the deletion policy allows it.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// At least one raw per-node archive exists.
    #[serde(default)]
    pub any_archives: bool,
    /// Enough raw archives exist to cover the job's nodes.
    #[serde(default)]
    pub enough_archives: bool,
}

impl Job {
    pub fn has_any_archives(&self) -> bool {
        self.any_archives
    }

    pub fn has_enough_raw_archives(&self) -> bool {
        self.enough_archives
    }
}
