//! Persistent outcome log interface lives in [`crate::pipeline::runner`];
//! this module provides a JSON-lines reference sink.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{Result, SummarizeError};
use crate::job::Job;
use crate::pipeline::classify::ProcessingError;
use crate::pipeline::runner::{AnalysisEngine, OutcomeSink, RunMetadata};

/// Appends summary and verdict records to a JSON-lines file.
///
/// Safe for concurrent workers; records from different jobs may interleave
/// in any order, and each record stands alone.
pub struct JsonlOutcomeSink {
    run_id: Uuid,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlOutcomeSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            run_id: Uuid::new_v4(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn append(&self, record: &Value) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SummarizeError::ChannelClosed("outcome log writer".to_string()))?;
        writeln!(writer, "{record}")?;
        writer.flush()?;
        Ok(())
    }
}

impl OutcomeSink for JsonlOutcomeSink {
    fn process(&self, engine: &dyn AnalysisEngine, metadata: &RunMetadata) -> Result<()> {
        self.append(&json!({
            "kind": "summary",
            "run_id": self.run_id,
            "written_at": Utc::now(),
            "metrics": engine.metrics(),
            "metadata": metadata,
        }))
    }

    fn mark_as_done(
        &self,
        job: &Job,
        success: bool,
        elapsed_secs: f64,
        error: Option<ProcessingError>,
    ) -> Result<()> {
        self.append(&json!({
            "kind": "markasdone",
            "run_id": self.run_id,
            "written_at": Utc::now(),
            "resource": job.resource,
            "local_job_id": job.local_job_id,
            "success": success,
            "elapsed_secs": elapsed_secs,
            "error_code": error.map(|e| e.code()),
        }))
    }
}
