use std::process::Command;

use crate::config::{Options, ResourceConfig};
use crate::job::Job;

/// External archive-merge operation.
///
/// Failures surface as a non-zero merge result, never as an error: this
/// layer cannot tell a crashed tool from one that reported partial data.
pub trait LogExtractor: Send + Sync {
    fn extract_and_merge(&self, job: &Job, resource: &ResourceConfig, options: &Options) -> i64;
}

/// Normalized result of the extraction gateway.
///
/// A merge result of 0 is fully successful; a negative result encodes the
/// number of nodes whose data could not be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub merge_result: i64,
    /// Number of nodes without usable data. Non-positive means none.
    pub missing_nodes: i64,
}

impl ExtractionOutcome {
    pub fn from_merge_result(merge_result: i64, nodecount: i64) -> Self {
        // Positive codes are tool failures that carry no per-node
        // information; count every node as missing so the evaluator
        // rejects the extraction.
        let missing_nodes = if merge_result <= 0 {
            -merge_result
        } else {
            nodecount
        };
        Self {
            merge_result,
            missing_nodes,
        }
    }

    /// Outcome for a job that was skipped before extraction ran.
    pub fn skipped(missing_nodes: i64) -> Self {
        Self {
            merge_result: 1,
            missing_nodes,
        }
    }
}

/// Invoke the merge operation for a job and normalize its result.
pub fn extract(
    extractor: &dyn LogExtractor,
    job: &Job,
    resource: &ResourceConfig,
    options: &Options,
) -> ExtractionOutcome {
    let merge_result = extractor.extract_and_merge(job, resource, options);
    tracing::debug!(
        job_id = %job.local_job_id,
        merge_result,
        "archive merge finished"
    );
    ExtractionOutcome::from_merge_result(merge_result, job.nodecount)
}

/// Reference extractor that shells out to the resource's merge command.
///
/// The command receives the local job id and, when configured, the output
/// directory; its exit status is the merge result. A command that cannot be
/// started counts as a failed merge, not an error.
pub struct CommandExtractor;

impl LogExtractor for CommandExtractor {
    fn extract_and_merge(&self, job: &Job, resource: &ResourceConfig, options: &Options) -> i64 {
        let mut command = Command::new(&resource.merge_command);
        command.arg(&job.local_job_id);
        if let Some(dir) = &resource.job_output_dir {
            command.arg("--output").arg(dir);
        }
        if options.lib_extract {
            command.arg("--use-lib");
        }

        match command.status() {
            Ok(status) => status.code().map(i64::from).unwrap_or(1),
            Err(err) => {
                tracing::warn!(
                    job_id = %job.local_job_id,
                    command = %resource.merge_command,
                    error = %err,
                    "merge command failed to start"
                );
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_merge_result_counts_missing_nodes() {
        let outcome = ExtractionOutcome::from_merge_result(-3, 100);
        assert_eq!(outcome.merge_result, -3);
        assert_eq!(outcome.missing_nodes, 3);
    }

    #[test]
    fn zero_merge_result_has_no_missing_nodes() {
        let outcome = ExtractionOutcome::from_merge_result(0, 100);
        assert_eq!(outcome.missing_nodes, 0);
    }

    #[test]
    fn positive_merge_result_marks_all_nodes_missing() {
        let outcome = ExtractionOutcome::from_merge_result(2, 100);
        assert_eq!(outcome.missing_nodes, 100);
    }
}
