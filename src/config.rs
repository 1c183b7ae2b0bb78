use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SummarizeError};

/// Default grace period: two days after a job ends, a failed summarization
/// is still marked done so it is not retried forever.
pub const DEFAULT_FORCE_TIMEOUT_SECS: i64 = 2 * 24 * 3600;

/// How jobs are selected from the job database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    /// One specific job on one resource.
    Single {
        resource: String,
        local_job_id: String,
    },
    /// All jobs that ended within the range, narrowed by [`JobFilters`].
    TimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Every selectable job, optionally restricted to one resource.
    All,
}

/// Reprocessing filters applied by the job-selection query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFilters {
    pub process_all: bool,
    pub process_bad: bool,
    pub process_old: bool,
    pub process_notdone: bool,
    pub process_current: bool,
    pub process_big: bool,
    /// Select jobs previously marked with this error code (0 = unset).
    pub process_error: i32,
}

impl JobFilters {
    fn reprocess_everything(&self) -> bool {
        self.process_bad && self.process_old && self.process_notdone && self.process_current
    }

    fn none_selected(&self) -> bool {
        !self.process_bad
            && !self.process_old
            && !self.process_notdone
            && !self.process_current
            && !self.process_big
            && self.process_error == 0
    }
}

/// Command-line selections before mode resolution.
#[derive(Debug, Clone, Default)]
pub struct RawOptions {
    pub local_job_id: Option<String>,
    pub resource: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub filters: JobFilters,
    pub max_nodes: i64,
    pub force_timeout_secs: i64,
    pub dodelete: bool,
    pub extract_only: bool,
    pub lib_extract: bool,
    pub tag: Option<String>,
    pub job_output_dir: Option<PathBuf>,
    /// Total process slots: one dispatcher plus the workers.
    pub ranks: usize,
}

/// Resolved process-wide configuration. Built once at startup, immutable for
/// the life of the run, and shared by reference across all workers.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub mode: SelectionMode,
    pub filters: JobFilters,
    pub resource: Option<String>,
    /// Skip jobs with more nodes than this (0 = unlimited).
    pub max_nodes: i64,
    /// Grace period for force-marking failed jobs as done.
    pub force_timeout_secs: i64,
    /// Delete the job working directory after processing.
    pub dodelete: bool,
    /// Stop after archive extraction; no analysis, no outcome logging.
    pub extract_only: bool,
    /// Use the extraction library instead of the command-line tool.
    pub lib_extract: bool,
    /// Tag propagated into every summarization record.
    pub tag: Option<String>,
    /// Output-directory override, honored in single-job mode only.
    pub job_output_dir: Option<PathBuf>,
    /// Number of worker slots (ranks minus the dispatcher).
    pub workers: usize,
}

impl Options {
    /// Resolve the raw command-line selections into a selection mode,
    /// mirroring the historical behavior of the summarization script:
    ///
    /// - extract-only suppresses archive deletion;
    /// - selecting bad+old+notdone+current is the same as selecting all;
    /// - a bare time range selects all jobs in the range;
    /// - no time range and no filters defaults to bad+old+notdone;
    /// - selecting all without a time range is a configuration error.
    pub fn resolve(raw: RawOptions) -> Result<Options> {
        if raw.ranks < 2 {
            return Err(SummarizeError::Config(
                "need at least 2 ranks: one dispatcher and one worker".to_string(),
            ));
        }

        let dodelete = if raw.extract_only { false } else { raw.dodelete };

        let mut filters = raw.filters;
        if filters.reprocess_everything() {
            filters.process_all = true;
        }

        let start = raw.start.as_deref().map(parse_time).transpose()?;
        let end = raw.end.as_deref().map(parse_time).transpose()?;

        let mode = match (start, end) {
            (Some(start), Some(end)) => {
                if end <= start {
                    return Err(SummarizeError::Config(format!(
                        "end time {end} is not after start time {start}"
                    )));
                }
                if filters.none_selected() {
                    // A bare time range keeps the historical meaning of
                    // "every job in the range".
                    filters.process_all = true;
                }
                SelectionMode::TimeRange { start, end }
            }
            (None, None) => {
                if filters.none_selected() && !filters.process_all {
                    filters.process_bad = true;
                    filters.process_old = true;
                    filters.process_notdone = true;
                }
                if filters.process_all {
                    return Err(SummarizeError::Config(
                        "cannot process all jobs without a time range".to_string(),
                    ));
                }
                match (raw.local_job_id, raw.resource.as_ref()) {
                    (Some(local_job_id), Some(resource)) => SelectionMode::Single {
                        resource: resource.clone(),
                        local_job_id,
                    },
                    (Some(_), None) => {
                        return Err(SummarizeError::Config(
                            "a resource must be specified together with a local job id"
                                .to_string(),
                        ));
                    }
                    (None, _) => SelectionMode::All,
                }
            }
            _ => {
                return Err(SummarizeError::Config(
                    "a time range requires both a start and an end time".to_string(),
                ));
            }
        };

        let job_output_dir = match mode {
            SelectionMode::Single { .. } => raw.job_output_dir,
            _ => None,
        };

        Ok(Options {
            mode,
            filters,
            resource: raw.resource,
            max_nodes: raw.max_nodes,
            force_timeout_secs: raw.force_timeout_secs,
            dodelete,
            extract_only: raw.extract_only,
            lib_extract: raw.lib_extract,
            tag: raw.tag,
            job_output_dir,
            workers: raw.ranks - 1,
        })
    }

    /// Per-resource view of the options. A single-job selector may name the
    /// resource by its numeric id, but job records carry the name; the job
    /// query must see the name.
    pub fn for_resource(&self, resource: &ResourceConfig) -> Options {
        let mut options = self.clone();
        if let SelectionMode::Single {
            resource: selector, ..
        } = &mut options.mode
        {
            selector.clone_from(&resource.name);
        }
        options
    }
}

/// Parse a user-supplied timestamp. Accepts `2024-05-01T12:00:00`,
/// `2024-05-01 12:00:00`, and bare dates, all interpreted as UTC.
pub fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    Err(SummarizeError::Config(format!(
        "unrecognized time '{text}'"
    )))
}

/// Per-resource settings from the resource configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub resource_id: i64,
    pub name: String,
    /// Directory the merged job-level archives are written to.
    #[serde(default)]
    pub job_output_dir: Option<PathBuf>,
    /// Only these plugins run on this resource. Takes precedence over the
    /// blacklist when both are present.
    #[serde(default)]
    pub plugin_whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub plugin_blacklist: Option<Vec<String>>,
    /// Command invoked to extract and merge the per-node archives.
    #[serde(default = "default_merge_command")]
    pub merge_command: String,
}

fn default_merge_command() -> String {
    "pmlogextract".to_string()
}

impl ResourceConfig {
    /// Apply the command-line overrides that beat the configuration file.
    pub fn override_defaults(&mut self, options: &Options) {
        if let Some(dir) = &options.job_output_dir {
            self.job_output_dir = Some(dir.clone());
        }
    }

    /// A resource can be selected by name or by numeric id.
    pub fn matches(&self, selector: &str) -> bool {
        self.name == selector || self.resource_id.to_string() == selector
    }
}

/// Load the resource configurations from a JSON file.
pub fn load_resource_configs(path: &Path) -> Result<Vec<ResourceConfig>> {
    let file = File::open(path)?;
    let configs = serde_json::from_reader(BufReader::new(file))?;
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawOptions {
        RawOptions {
            dodelete: true,
            force_timeout_secs: DEFAULT_FORCE_TIMEOUT_SECS,
            ranks: 4,
            ..RawOptions::default()
        }
    }

    #[test]
    fn defaults_to_reprocessing_unfinished_jobs() {
        let options = Options::resolve(raw()).unwrap();
        assert_eq!(options.mode, SelectionMode::All);
        assert!(options.filters.process_bad);
        assert!(options.filters.process_old);
        assert!(options.filters.process_notdone);
        assert!(!options.filters.process_current);
        assert!(!options.filters.process_all);
        assert_eq!(options.workers, 3);
    }

    #[test]
    fn bare_time_range_selects_all_jobs_in_range() {
        let mut r = raw();
        r.start = Some("2024-01-01".to_string());
        r.end = Some("2024-02-01".to_string());
        let options = Options::resolve(r).unwrap();
        assert!(matches!(options.mode, SelectionMode::TimeRange { .. }));
        assert!(options.filters.process_all);
    }

    #[test]
    fn time_range_with_filter_keeps_filter() {
        let mut r = raw();
        r.start = Some("2024-01-01".to_string());
        r.end = Some("2024-02-01".to_string());
        r.filters.process_bad = true;
        let options = Options::resolve(r).unwrap();
        assert!(!options.filters.process_all);
        assert!(options.filters.process_bad);
    }

    #[test]
    fn all_four_reprocess_filters_mean_process_all() {
        let mut r = raw();
        r.start = Some("2024-01-01".to_string());
        r.end = Some("2024-02-01".to_string());
        r.filters.process_bad = true;
        r.filters.process_old = true;
        r.filters.process_notdone = true;
        r.filters.process_current = true;
        let options = Options::resolve(r).unwrap();
        assert!(options.filters.process_all);
    }

    #[test]
    fn process_all_without_time_range_is_an_error() {
        let mut r = raw();
        r.filters.process_all = true;
        assert!(Options::resolve(r).is_err());
    }

    #[test]
    fn start_without_end_is_an_error() {
        let mut r = raw();
        r.start = Some("2024-01-01".to_string());
        assert!(Options::resolve(r).is_err());
    }

    #[test]
    fn inverted_time_range_is_an_error() {
        let mut r = raw();
        r.start = Some("2024-02-01".to_string());
        r.end = Some("2024-01-01".to_string());
        assert!(Options::resolve(r).is_err());
    }

    #[test]
    fn single_job_requires_resource() {
        let mut r = raw();
        r.local_job_id = Some("1234567".to_string());
        assert!(Options::resolve(r).is_err());

        let mut r = raw();
        r.local_job_id = Some("1234567".to_string());
        r.resource = Some("cluster1".to_string());
        let options = Options::resolve(r).unwrap();
        assert_eq!(
            options.mode,
            SelectionMode::Single {
                resource: "cluster1".to_string(),
                local_job_id: "1234567".to_string(),
            }
        );
    }

    #[test]
    fn numeric_selector_resolves_to_resource_name() {
        let mut r = raw();
        r.local_job_id = Some("42".to_string());
        r.resource = Some("7".to_string());
        let options = Options::resolve(r).unwrap();

        let config = ResourceConfig {
            resource_id: 7,
            name: "cluster1".to_string(),
            job_output_dir: None,
            plugin_whitelist: None,
            plugin_blacklist: None,
            merge_command: default_merge_command(),
        };
        assert!(config.matches("7"));
        assert_eq!(
            options.for_resource(&config).mode,
            SelectionMode::Single {
                resource: "cluster1".to_string(),
                local_job_id: "42".to_string(),
            }
        );
    }

    #[test]
    fn extract_only_disables_deletion() {
        let mut r = raw();
        r.extract_only = true;
        let options = Options::resolve(r).unwrap();
        assert!(!options.dodelete);
        assert!(options.extract_only);
    }

    #[test]
    fn output_dir_only_honored_in_single_mode() {
        let mut r = raw();
        r.job_output_dir = Some(PathBuf::from("/tmp/out"));
        let options = Options::resolve(r).unwrap();
        assert!(options.job_output_dir.is_none());

        let mut r = raw();
        r.local_job_id = Some("42".to_string());
        r.resource = Some("cluster1".to_string());
        r.job_output_dir = Some(PathBuf::from("/tmp/out"));
        let options = Options::resolve(r).unwrap();
        assert_eq!(options.job_output_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn fewer_than_two_ranks_is_an_error() {
        let mut r = raw();
        r.ranks = 1;
        assert!(Options::resolve(r).is_err());
    }

    #[test]
    fn parse_time_formats() {
        assert!(parse_time("2024-05-01T12:30:00").is_ok());
        assert!(parse_time("2024-05-01 12:30:00").is_ok());
        let midnight = parse_time("2024-05-01").unwrap();
        assert_eq!(midnight, parse_time("2024-05-01T00:00:00").unwrap());
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn resource_config_matches_name_or_id() {
        let config = ResourceConfig {
            resource_id: 7,
            name: "cluster1".to_string(),
            job_output_dir: None,
            plugin_whitelist: None,
            plugin_blacklist: None,
            merge_command: default_merge_command(),
        };
        assert!(config.matches("cluster1"));
        assert!(config.matches("7"));
        assert!(!config.matches("cluster2"));
    }
}
