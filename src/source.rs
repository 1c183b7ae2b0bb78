//! Job-selection query interface and a JSON-lines reference implementation.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::config::{JobFilters, Options, SelectionMode};
use crate::error::Result;
use crate::job::Job;

/// Lazy, finite stream of jobs selected from the job database. Not
/// restartable; the dispatcher consumes it exactly once.
pub type JobStream = Box<dyn Iterator<Item = Job> + Send>;

/// The job-selection query against the job database.
pub trait JobSource: Send + Sync {
    fn get_by_local_job_id(&self, resource: &str, local_job_id: &str) -> Result<JobStream>;

    fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &JobFilters,
    ) -> Result<JobStream>;

    fn get_all(&self) -> Result<JobStream>;
}

/// Select the job stream for the configured mode.
pub fn select_jobs(source: &dyn JobSource, options: &Options) -> Result<JobStream> {
    match &options.mode {
        SelectionMode::Single {
            resource,
            local_job_id,
        } => source.get_by_local_job_id(resource, local_job_id),
        SelectionMode::TimeRange { start, end } => {
            source.get_by_time_range(*start, *end, &options.filters)
        }
        SelectionMode::All => source.get_all(),
    }
}

/// Reads jobs from a JSON-lines file, one record per line.
///
/// Stands in for the accounting database. The reprocessing filters
/// (bad/old/notdone/current) are selection semantics of that database and
/// are accepted but not interpreted here; resource and time-range selection
/// are applied. Malformed lines are logged and skipped.
pub struct JsonlJobSource {
    path: PathBuf,
    resource: Option<String>,
}

impl JsonlJobSource {
    pub fn new(path: impl Into<PathBuf>, resource: Option<String>) -> Self {
        Self {
            path: path.into(),
            resource,
        }
    }

    fn read_jobs(&self) -> Result<Vec<Job>> {
        let file = File::open(&self.path)?;
        let mut jobs = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Job>(&line) {
                Ok(job) => {
                    if self
                        .resource
                        .as_ref()
                        .is_none_or(|resource| &job.resource == resource)
                    {
                        jobs.push(job);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        error = %err,
                        "skipping malformed job record"
                    );
                }
            }
        }
        Ok(jobs)
    }
}

impl JobSource for JsonlJobSource {
    fn get_by_local_job_id(&self, resource: &str, local_job_id: &str) -> Result<JobStream> {
        let resource = resource.to_string();
        let local_job_id = local_job_id.to_string();
        let jobs = self.read_jobs()?;
        Ok(Box::new(jobs.into_iter().filter(move |job| {
            job.resource == resource && job.local_job_id == local_job_id
        })))
    }

    fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _filters: &JobFilters,
    ) -> Result<JobStream> {
        let jobs = self.read_jobs()?;
        Ok(Box::new(jobs.into_iter().filter(move |job| {
            job.end_time >= start && job.end_time < end
        })))
    }

    fn get_all(&self) -> Result<JobStream> {
        let jobs = self.read_jobs()?;
        Ok(Box::new(jobs.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::TimeZone;

    use super::*;
    use crate::config::parse_time;

    fn job_line(id: &str, resource: &str, end_time: &str) -> String {
        format!(
            r#"{{"local_job_id":"{id}","resource":"{resource}","nodecount":4,"walltime_secs":3600.0,"end_time":"{end_time}","any_archives":true,"enough_archives":true}}"#
        )
    }

    fn write_jobs(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn selects_by_local_job_id_and_resource() {
        let file = write_jobs(&[
            job_line("100", "cluster1", "2024-05-01T10:00:00Z"),
            job_line("100", "cluster2", "2024-05-01T10:00:00Z"),
            job_line("200", "cluster1", "2024-05-01T10:00:00Z"),
        ]);
        let source = JsonlJobSource::new(file.path(), None);
        let jobs: Vec<Job> = source.get_by_local_job_id("cluster1", "100").unwrap().collect();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].resource, "cluster1");
    }

    #[test]
    fn time_range_is_half_open() {
        let file = write_jobs(&[
            job_line("1", "cluster1", "2024-04-30T23:59:59Z"),
            job_line("2", "cluster1", "2024-05-01T00:00:00Z"),
            job_line("3", "cluster1", "2024-05-02T00:00:00Z"),
        ]);
        let source = JsonlJobSource::new(file.path(), None);
        let start = parse_time("2024-05-01").unwrap();
        let end = parse_time("2024-05-02").unwrap();
        let jobs: Vec<Job> = source
            .get_by_time_range(start, end, &JobFilters::default())
            .unwrap()
            .collect();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].local_job_id, "2");
    }

    #[test]
    fn resource_filter_and_malformed_lines() {
        let file = write_jobs(&[
            job_line("1", "cluster1", "2024-05-01T10:00:00Z"),
            "not json".to_string(),
            job_line("2", "cluster2", "2024-05-01T10:00:00Z"),
        ]);
        let source = JsonlJobSource::new(file.path(), Some("cluster1".to_string()));
        let jobs: Vec<Job> = source.get_all().unwrap().collect();
        assert_eq!(jobs.len(), 1);
        assert_eq!(
            jobs[0].end_time,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
    }
}
