use chrono::{Duration, Utc};

use jobsumm::pipeline::classify::{Classification, ProcessingError};
use jobsumm::pipeline::evaluate::{enough_nodes, evaluate};
use jobsumm::pipeline::extract::ExtractionOutcome;

const GRACE_SECS: i64 = 2 * 24 * 3600;

#[test]
fn clean_merge_is_always_enough() {
    let outcome = ExtractionOutcome::from_merge_result(0, 100);
    assert!(enough_nodes(&outcome, 100));
    // Even a degenerate nodecount does not matter when the merge was clean.
    assert!(enough_nodes(&outcome, 0));
}

#[test]
fn missing_node_tolerance_boundary() {
    // 4 of 100 missing: under the 5% tolerance.
    assert!(enough_nodes(&ExtractionOutcome::from_merge_result(-4, 100), 100));
    // Exactly 5% is too many.
    assert!(!enough_nodes(&ExtractionOutcome::from_merge_result(-5, 100), 100));
    // Zero nodes with a dirty merge can never have enough.
    assert!(!enough_nodes(&ExtractionOutcome::from_merge_result(-1, 0), 0));
}

#[test]
fn good_summarization_has_no_error() {
    let now = Utc::now();
    let verdict = evaluate(
        &Classification::Proceed,
        &ExtractionOutcome::from_merge_result(0, 8),
        true,
        8,
        now,
        now,
        GRACE_SECS,
    );
    assert!(verdict.success);
    assert!(!verdict.forced);
    assert_eq!(verdict.error, None);
    assert!(verdict.recorded_success());
}

#[test]
fn tolerable_missing_nodes_still_succeed() {
    let now = Utc::now();
    let verdict = evaluate(
        &Classification::Proceed,
        &ExtractionOutcome::from_merge_result(-4, 100),
        true,
        100,
        now,
        now,
        GRACE_SECS,
    );
    assert!(verdict.success);
    assert_eq!(verdict.error, None);
}

#[test]
fn too_many_missing_nodes_is_an_extraction_error() {
    let now = Utc::now();
    let verdict = evaluate(
        &Classification::Proceed,
        &ExtractionOutcome::from_merge_result(-10, 100),
        false,
        100,
        now,
        now,
        GRACE_SECS,
    );
    assert!(!verdict.success);
    assert_eq!(verdict.error, Some(ProcessingError::PmlogextractError));
}

#[test]
fn failed_analysis_on_enough_nodes_is_a_summarization_error() {
    let now = Utc::now();
    let verdict = evaluate(
        &Classification::Proceed,
        &ExtractionOutcome::from_merge_result(0, 8),
        false,
        8,
        now,
        now,
        GRACE_SECS,
    );
    assert!(!verdict.success);
    assert_eq!(verdict.error, Some(ProcessingError::SummarizationError));
}

#[test]
fn skip_reason_is_never_overwritten() {
    let now = Utc::now();
    let classification = Classification::Skip {
        reason: ProcessingError::TimeTooShort,
        missing_nodes: 8,
    };
    let verdict = evaluate(
        &classification,
        &ExtractionOutcome::skipped(8),
        false,
        8,
        now,
        now,
        GRACE_SECS,
    );
    assert!(!verdict.success);
    assert_eq!(verdict.error, Some(ProcessingError::TimeTooShort));
}

#[test]
fn grace_period_forces_success_and_keeps_the_error() {
    let now = Utc::now();
    let end_time = now - Duration::days(50);
    let verdict = evaluate(
        &Classification::Proceed,
        &ExtractionOutcome::from_merge_result(0, 8),
        false,
        8,
        end_time,
        now,
        GRACE_SECS,
    );
    assert!(!verdict.success);
    assert!(verdict.forced);
    assert!(verdict.recorded_success());
    assert_eq!(verdict.error, Some(ProcessingError::SummarizationError));
}

#[test]
fn grace_override_is_monotone_in_now() {
    let now = Utc::now();
    let end_time = now - Duration::days(50);
    let outcome = ExtractionOutcome::from_merge_result(0, 8);
    let first = evaluate(
        &Classification::Proceed,
        &outcome,
        false,
        8,
        end_time,
        now,
        GRACE_SECS,
    );
    assert!(first.forced);

    // Re-evaluating later never un-forces the verdict.
    let later = evaluate(
        &Classification::Proceed,
        &outcome,
        false,
        8,
        end_time,
        now + Duration::days(10),
        GRACE_SECS,
    );
    assert!(later.forced);
}

#[test]
fn recent_failures_are_not_forced() {
    let now = Utc::now();
    let end_time = now - Duration::hours(12);
    let verdict = evaluate(
        &Classification::Proceed,
        &ExtractionOutcome::from_merge_result(0, 8),
        false,
        8,
        end_time,
        now,
        GRACE_SECS,
    );
    assert!(!verdict.forced);
    assert!(!verdict.recorded_success());
}
