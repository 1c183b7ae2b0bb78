use chrono::{DateTime, Utc};

use super::classify::{Classification, ProcessingError};
use super::extract::ExtractionOutcome;

/// Fraction of a job's nodes that may be missing before summarization is
/// not worth attempting.
pub const MISSING_NODE_TOLERANCE: f64 = 0.05;

/// Final verdict for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// The analysis engine judged its own output good enough.
    pub success: bool,
    /// The grace period elapsed; record the job as done despite the failure
    /// so it is not retried indefinitely.
    pub forced: bool,
    /// First assigned skip or error reason, kept for diagnostics even when
    /// the verdict is forced.
    pub error: Option<ProcessingError>,
}

impl Verdict {
    /// What the persistent log records as the job's done flag.
    pub fn recorded_success(&self) -> bool {
        self.success || self.forced
    }
}

/// Whether extraction yielded enough node data to attempt analysis.
pub fn enough_nodes(outcome: &ExtractionOutcome, nodecount: i64) -> bool {
    outcome.merge_result == 0
        || (nodecount != 0
            && (outcome.missing_nodes as f64 / nodecount as f64) < MISSING_NODE_TOLERANCE)
}

/// Combine the classification, extraction outcome, analysis verdict, and
/// grace period into the final per-job verdict.
///
/// `analysis_completed` is the engine's own `good_enough` judgment; it is
/// false whenever the engine was never invoked. The error code is assigned
/// at most once: a skip reason is never overwritten by a later failure, and
/// the grace-period override preserves it. The override is monotone in
/// `now`: once forced, re-evaluating at any later time stays forced.
pub fn evaluate(
    classification: &Classification,
    outcome: &ExtractionOutcome,
    analysis_completed: bool,
    nodecount: i64,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
    grace_secs: i64,
) -> Verdict {
    let mut error = match classification {
        Classification::Skip { reason, .. } => Some(*reason),
        Classification::Proceed => None,
    };

    let enough = enough_nodes(outcome, nodecount);
    if !enough && error.is_none() {
        // Extraction did not yield enough node data to even try analysis.
        error = Some(ProcessingError::PmlogextractError);
    }

    let success = analysis_completed;
    if !success && enough && error.is_none() {
        // Enough nodes were extracted but summarization still fell short.
        error = Some(ProcessingError::SummarizationError);
    }

    let forced = !success && (now - end_time).num_seconds() > grace_secs;

    Verdict {
        success,
        forced,
        error,
    }
}
