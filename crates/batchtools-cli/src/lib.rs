//! CLI argument parsing for csub, cjobs, ckill and cfail.

use batchtools_core::{BatchSystem, JobStatus};
use batchtools_parsers::{MemoryFormat, parse_duration_secs, parse_memory_mb};
use camino::Utf8PathBuf;
use clap::{ArgGroup, Args, Parser};

/// Flags shared by all four tools.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Batch system (local, lsf or slurm); detected when not given
    #[arg(short = 'b', long = "batch", value_parser = parse_system)]
    pub batch: Option<BatchSystem>,

    /// Configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<Utf8PathBuf>,

    /// More output (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Parser, Debug)]
#[command(name = "csub", version)]
#[command(about = "Submit a command to the batch system")]
pub struct CsubArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Job name
    #[arg(short = 'J', long = "jobname")]
    pub jobname: Option<String>,

    /// Log file for stdout and stderr (overwritten)
    #[arg(short = 'o', long = "logfile")]
    pub logfile: Option<Utf8PathBuf>,

    /// Queue (LSF) or partition (SLURM)
    #[arg(short = 'Q', long = "queue")]
    pub queue: Option<String>,

    /// Number of CPUs
    #[arg(short = 'n', long = "ncpus")]
    pub ncpus: Option<u32>,

    /// Memory, e.g. 4G, 512M, 4.5GB (bare numbers are MB)
    #[arg(short = 'm', long = "memory", value_parser = parse_memory)]
    pub memory: Option<u64>,

    /// Run limit: D-HH:MM:SS, HH:MM:SS, H:MM or minutes
    #[arg(short = 'W', long = "runtime", value_parser = parse_runtime)]
    pub runtime: Option<u64>,

    /// Raw scheduler option KEY[=VALUE], repeatable
    #[arg(short = 'O', long = "option", value_parser = parse_option)]
    pub options: Vec<(String, Option<String>)>,

    /// Wait until fewer than N of your jobs are queued before submitting
    #[arg(long = "max-jobs")]
    pub max_jobs: Option<usize>,

    /// Seconds between queue checks while waiting
    #[arg(short = 's', long = "sleep")]
    pub sleep: Option<u64>,

    /// Print the submission command instead of running it
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Command to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug)]
#[command(name = "cjobs", version)]
#[command(about = "List batch jobs")]
#[command(group(ArgGroup::new("mode").args(["count", "summary", "json"])))]
pub struct CjobsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Whose jobs to list (default: you)
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// Only jobs whose name matches this regex
    #[arg(short = 'J', long = "name")]
    pub name: Option<String>,

    /// Only jobs in this status, repeatable
    #[arg(short = 'S', long = "status", value_parser = parse_status)]
    pub status: Vec<JobStatus>,

    /// Print only the number of jobs
    #[arg(long)]
    pub count: bool,

    /// Print the number of jobs per status
    #[arg(long)]
    pub summary: bool,

    /// Print jobs as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(name = "ckill", version)]
#[command(about = "Kill batch jobs")]
pub struct CkillArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Job ids or ranges (e.g. 1200-1250)
    pub jobids: Vec<String>,

    /// Kill jobs whose name matches this regex
    #[arg(short = 'J', long = "name", conflicts_with = "jobids")]
    pub name: Option<String>,

    /// Kill jobs in this status, repeatable
    #[arg(short = 'S', long = "status", value_parser = parse_status, conflicts_with = "jobids")]
    pub status: Vec<JobStatus>,

    /// Kill all of your jobs
    #[arg(long, conflicts_with = "jobids")]
    pub all: bool,

    /// Show what would be killed
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
#[command(name = "cfail", version)]
#[command(about = "Find failed batch jobs")]
pub struct CfailArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Log files or directories to search (default: current directory)
    pub paths: Vec<Utf8PathBuf>,

    /// Log file extension searched for in directories
    #[arg(long = "ext", default_value = "log")]
    pub ext: String,

    /// Show why each job failed
    #[arg(short = 'r', long = "reason")]
    pub reason: bool,

    /// Also list logs of jobs that have not finished
    #[arg(long)]
    pub incomplete: bool,

    /// Analyze these jobs with the scheduler instead of reading logs
    #[arg(short = 'j', long = "job", conflicts_with_all = ["paths", "since"])]
    pub jobs: Vec<String>,

    /// List your jobs that failed in the last HOURS
    #[arg(long, value_name = "HOURS", conflicts_with = "paths")]
    pub since: Option<u64>,

    /// Print counts instead of paths
    #[arg(long)]
    pub summary: bool,
}

fn parse_system(s: &str) -> Result<BatchSystem, String> {
    s.parse().map_err(|e: batchtools_core::BatchError| e.to_string())
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    s.parse().map_err(|e: batchtools_core::BatchError| e.to_string())
}

/// Memory in MB.
pub fn parse_memory(s: &str) -> Result<u64, String> {
    match parse_memory_mb(s, MemoryFormat::Human) {
        Some(mb) if mb > 0 => Ok(mb),
        _ => Err(format!("invalid memory '{}' (e.g. 4G, 512M)", s)),
    }
}

/// Run limit in seconds.
///
/// A single colon means `H:MM` and a bare number means minutes, as both
/// bsub -W and sbatch --time read them.
pub fn parse_runtime(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let err = || format!("invalid runtime '{}' (e.g. 2:00, 01:30:00, 1-00:00:00, 90)", s);
    let secs = match s.matches(':').count() {
        0 if !s.contains('-') => s.parse::<u64>().map_err(|_| err())? * 60,
        1 if !s.contains('-') => {
            let (h, m) = s.split_once(':').ok_or_else(err)?;
            let h: u64 = h.parse().map_err(|_| err())?;
            let m: u64 = m.parse().map_err(|_| err())?;
            if m >= 60 {
                return Err(err());
            }
            h * 3600 + m * 60
        }
        _ => parse_duration_secs(s).ok_or_else(err)?,
    };
    if secs == 0 {
        return Err(err());
    }
    Ok(secs)
}

/// Parse `KEY[=VALUE]`; leading dashes on the key are dropped.
pub fn parse_option(s: &str) -> Result<(String, Option<String>), String> {
    let (key, value) = match s.split_once('=') {
        Some((key, value)) => (key, Some(value.to_string())),
        None => (s, None),
    };
    let key = key.trim().trim_start_matches('-');
    if key.is_empty() {
        return Err(format!("invalid option '{}' (expected KEY[=VALUE])", s));
    }
    Ok((key.to_string(), value))
}
