use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use jobsumm::config::{
    load_resource_configs, JobFilters, Options, RawOptions, DEFAULT_FORCE_TIMEOUT_SECS,
};
use jobsumm::error::Result;
use jobsumm::pipeline::extract::CommandExtractor;
use jobsumm::pipeline::runner::JobRunner;
use jobsumm::plugins::{PluginEngineFactory, PluginRegistry};
use jobsumm::pool::SummarizerPool;
use jobsumm::shutdown::install_shutdown_handler;
use jobsumm::sink::JsonlOutcomeSink;
use jobsumm::source::{select_jobs, JsonlJobSource};

#[derive(Parser, Debug)]
#[command(name = "jobsumm")]
#[command(version)]
#[command(about = "Summarizes HPC job performance archives with a master/worker pool")]
struct Args {
    /// Process only the job with this local job id (requires --resource)
    #[arg(short = 'j', long)]
    local_job_id: Option<String>,

    /// Process only jobs on this resource (name or numeric id)
    #[arg(short = 'r', long)]
    resource: Option<String>,

    /// Process jobs that ended after this time (requires --end)
    #[arg(short = 's', long)]
    start: Option<String>,

    /// Process jobs that ended before this time (requires --start)
    #[arg(short = 'e', long)]
    end: Option<String>,

    /// With a time range, look for all jobs
    #[arg(short = 'A', long)]
    process_all: bool,

    /// With a time range, look for jobs that previously failed to process
    #[arg(short = 'B', long)]
    process_bad: bool,

    /// With a time range, look for jobs with an old process version
    #[arg(short = 'O', long)]
    process_old: bool,

    /// With a time range, look for unprocessed jobs
    #[arg(short = 'N', long)]
    process_notdone: bool,

    /// With a time range, look for jobs with the current process version
    #[arg(short = 'C', long)]
    process_current: bool,

    /// With a time range, look for jobs previously marked as too big
    #[arg(short = 'b', long)]
    process_big: bool,

    /// With a time range, look for jobs previously marked with this error code
    #[arg(short = 'P', long, default_value_t = 0)]
    process_error: i32,

    /// Only process jobs with at most this many nodes (0 = unlimited)
    #[arg(short = 'M', long, default_value_t = 0)]
    max_nodes: i64,

    /// Seconds from a job ending after which a failed summarization is
    /// still marked done
    #[arg(short = 'T', long, default_value_t = DEFAULT_FORCE_TIMEOUT_SECS)]
    timeout: i64,

    /// Tag added to every summarization record
    #[arg(short = 't', long)]
    tag: Option<String>,

    /// Whether to delete job-level archives after processing
    #[arg(short = 'D', long, default_value_t = true, action = clap::ArgAction::Set)]
    delete: bool,

    /// Only extract the job-level archives (implies --delete false)
    #[arg(short = 'E', long)]
    extract_only: bool,

    /// Use the extraction library instead of the command-line tool
    #[arg(short = 'L', long)]
    use_lib_extract: bool,

    /// Override the output directory for job archives (single-job mode only)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Total process slots: one dispatcher plus the workers
    #[arg(long, default_value_t = default_ranks())]
    ranks: usize,

    /// Resource configuration file (JSON)
    #[arg(short = 'c', long, default_value = "resources.json")]
    config: PathBuf,

    /// Job records to select from (JSON lines)
    #[arg(long, default_value = "jobs.jsonl")]
    jobs: PathBuf,

    /// Outcome log to append to (JSON lines)
    #[arg(long, default_value = "outcomes.jsonl")]
    outcome_log: PathBuf,

    /// Set log level to debug
    #[arg(short = 'd', long)]
    debug: bool,

    /// Only log errors
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn default_ranks() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().max(2))
        .unwrap_or(2)
}

fn raw_options(args: &Args) -> RawOptions {
    RawOptions {
        local_job_id: args.local_job_id.clone(),
        resource: args.resource.clone(),
        start: args.start.clone(),
        end: args.end.clone(),
        filters: JobFilters {
            process_all: args.process_all,
            process_bad: args.process_bad,
            process_old: args.process_old,
            process_notdone: args.process_notdone,
            process_current: args.process_current,
            process_big: args.process_big,
            process_error: args.process_error,
        },
        max_nodes: args.max_nodes,
        force_timeout_secs: args.timeout,
        dodelete: args.delete,
        extract_only: args.extract_only,
        lib_extract: args.use_lib_extract,
        tag: args.tag.clone(),
        job_output_dir: args.output.clone(),
        ranks: args.ranks,
    }
}

async fn run(args: Args) -> Result<()> {
    // Configuration errors abort the run before any jobs are processed.
    let options = Arc::new(Options::resolve(raw_options(&args))?);
    let cancel = install_shutdown_handler();
    let registry = PluginRegistry::builtin();

    let resources = load_resource_configs(&args.config)?;
    let sink = Arc::new(JsonlOutcomeSink::create(&args.outcome_log)?);

    for mut resource in resources {
        if let Some(selector) = &options.resource {
            if !resource.matches(selector) {
                continue;
            }
        }
        tracing::info!(resource = %resource.name, "processing resource");
        resource.override_defaults(&options);
        // Resolves a numeric-id selector to the resource name before the
        // job query sees it.
        let options = Arc::new(options.for_resource(&resource));

        let factory = PluginEngineFactory::new(&registry, &resource);
        tracing::debug!(
            resource = %resource.name,
            plugins = factory.plugin_count(),
            "plugin set filtered"
        );

        let source = JsonlJobSource::new(&args.jobs, Some(resource.name.clone()));
        let runner = Arc::new(JobRunner::new(
            options.clone(),
            Arc::new(resource),
            Arc::new(CommandExtractor),
            Arc::new(factory),
            sink.clone(),
        ));

        let pool = SummarizerPool::new(options.clone(), runner, cancel.clone());
        let jobs = select_jobs(&source, &options)?;
        let stats = pool.run(jobs).await?;
        tracing::info!(
            sent = stats.sent,
            received = stats.received,
            "resource finished"
        );

        if cancel.is_cancelled() {
            break;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = if args.debug {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(err) = run(args).await {
        tracing::error!(error = %err, "run aborted");
        std::process::exit(1);
    }
}
