use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Options;
use crate::job::Job;

/// Parallel jobs shorter than this are not worth summarizing.
pub const MIN_PARALLEL_WALLTIME_SECS: f64 = 300.0;
/// Any job at or below this duration is skipped.
pub const MIN_WALLTIME_SECS: f64 = 180.0;
/// 49 hours. Longer jobs produce archives too large to merge reliably.
pub const MAX_WALLTIME_SECS: f64 = 176_400.0;

/// Why a job was skipped or failed. Set at most once per job and never
/// overwritten; the first assigned reason wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingError {
    ParallelTooShort,
    TimeTooShort,
    InvalidNodecount,
    NoArchives,
    RawArchives,
    JobTooBig,
    TimeTooLong,
    PmlogextractError,
    SummarizationError,
}

impl ProcessingError {
    /// Stable numeric code recorded in the outcome log.
    pub fn code(&self) -> i32 {
        match self {
            ProcessingError::ParallelTooShort => 1,
            ProcessingError::TimeTooShort => 2,
            ProcessingError::InvalidNodecount => 3,
            ProcessingError::NoArchives => 4,
            ProcessingError::RawArchives => 5,
            ProcessingError::JobTooBig => 6,
            ProcessingError::TimeTooLong => 7,
            ProcessingError::PmlogextractError => 8,
            ProcessingError::SummarizationError => 9,
        }
    }

    /// Key under which this reason is flagged in the run metadata.
    pub fn metadata_key(&self) -> &'static str {
        match self {
            ProcessingError::ParallelTooShort => "skipped_parallel_too_short",
            ProcessingError::TimeTooShort => "skipped_too_short",
            ProcessingError::InvalidNodecount => "skipped_invalid_nodecount",
            ProcessingError::NoArchives => "skipped_noarchives",
            ProcessingError::RawArchives => "skipped_rawarchives",
            ProcessingError::JobTooBig => "skipped_job_too_big",
            ProcessingError::TimeTooLong => "skipped_too_long",
            ProcessingError::PmlogextractError => "skipped_pmlogextract_error",
            ProcessingError::SummarizationError => "skipped_summarization_error",
        }
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metadata_key())
    }
}

/// Outcome of pre-extraction classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Extraction must run.
    Proceed,
    /// Do not attempt extraction or analysis.
    Skip {
        reason: ProcessingError,
        missing_nodes: i64,
    },
}

/// Decide whether a job should be attempted at all.
///
/// The rule order is part of the contract: several conditions can hold at
/// once and the first match wins. Pure function, no I/O.
pub fn classify(job: &Job, options: &Options) -> Classification {
    let skip = |reason| Classification::Skip {
        reason,
        missing_nodes: job.nodecount,
    };

    if job.nodecount > 1 && job.walltime_secs < MIN_PARALLEL_WALLTIME_SECS {
        skip(ProcessingError::ParallelTooShort)
    } else if job.walltime_secs <= MIN_WALLTIME_SECS {
        skip(ProcessingError::TimeTooShort)
    } else if job.nodecount < 1 {
        skip(ProcessingError::InvalidNodecount)
    } else if !job.has_any_archives() {
        skip(ProcessingError::NoArchives)
    } else if !job.has_enough_raw_archives() {
        skip(ProcessingError::RawArchives)
    } else if options.max_nodes > 0 && job.nodecount > options.max_nodes {
        skip(ProcessingError::JobTooBig)
    } else if job.walltime_secs >= MAX_WALLTIME_SECS {
        skip(ProcessingError::TimeTooLong)
    } else {
        Classification::Proceed
    }
}
