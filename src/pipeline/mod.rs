//! Per-job summarization pipeline.
//!
//! One job flows classify → extract → analyze → evaluate → log → cleanup:
//!
//! - [`classify`]: pure skip-vs-attempt decision, evaluated before any
//!   expensive work
//! - [`extract`]: gateway to the external archive-merge tool
//! - [`evaluate`]: final success/failure verdict, including the grace-period
//!   override
//! - [`runner`]: sequences the steps for one job with failure containment
//!   and guaranteed working-directory cleanup

pub mod classify;
pub mod evaluate;
pub mod extract;
pub mod runner;

pub use classify::{classify, Classification, ProcessingError};
pub use evaluate::{enough_nodes, evaluate, Verdict};
pub use extract::{ExtractionOutcome, LogExtractor};
pub use runner::{JobReport, JobRunner, RunMetadata};
