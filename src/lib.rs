//! Master/worker summarization of HPC job performance archives.
//!
//! A dispatcher pulls jobs from the job-selection query and hands each one to
//! exactly one worker over point-to-point channels. Every worker runs the
//! per-job pipeline: classify, extract the archives, run the analysis engine
//! when enough node data is present, evaluate the outcome, and record the
//! verdict in the persistent outcome log.
//!
//! The archive extraction tool, the analytics engine, the job database, and
//! the outcome log are external collaborators reached through the traits in
//! [`pipeline::extract`], [`pipeline::runner`], [`source`], and [`sink`].

pub mod config;
pub mod diag;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod plugins;
pub mod pool;
pub mod shutdown;
pub mod sink;
pub mod source;
