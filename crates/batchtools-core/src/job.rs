//! Unified job types.

use batchtools_lsf::{LsfJob, LsfJobState};
use batchtools_slurm::{SlurmJob, SlurmJobState};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::BatchError;
use crate::local::LocalJob;
use crate::system::BatchSystem;

/// Largest number of ids a single `a-b` range may expand to.
const MAX_RANGE_IDS: u64 = 100_000;

/// Unified job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued, waiting for resources
    Pending,
    Running,
    /// Stopped by the user or the scheduler
    Suspended,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        Self::Pending,
        Self::Running,
        Self::Suspended,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "pend" => Ok(Self::Pending),
            "running" | "run" => Ok(Self::Running),
            "suspended" => Ok(Self::Suspended),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "unknown" => Ok(Self::Unknown),
            _ => Err(BatchError::UnknownStatus(s.to_string())),
        }
    }
}

/// Trait for converting scheduler-specific states to unified JobStatus.
pub trait ToJobStatus {
    fn to_job_status(&self) -> JobStatus;
}

impl ToJobStatus for SlurmJobState {
    fn to_job_status(&self) -> JobStatus {
        match self {
            Self::Pending => JobStatus::Pending,
            Self::Running => JobStatus::Running,
            Self::Suspended => JobStatus::Suspended,
            Self::Completed => JobStatus::Completed,
            Self::Failed { .. } | Self::NodeFail | Self::Timeout | Self::OutOfMemory => {
                JobStatus::Failed
            }
            Self::Cancelled => JobStatus::Cancelled,
            Self::Other(_) => JobStatus::Unknown,
        }
    }
}

impl ToJobStatus for LsfJobState {
    fn to_job_status(&self) -> JobStatus {
        match self {
            Self::Pend => JobStatus::Pending,
            Self::Run => JobStatus::Running,
            Self::Suspended => JobStatus::Suspended,
            Self::Done => JobStatus::Completed,
            Self::Exit { .. } => JobStatus::Failed,
            Self::Zombie | Self::Other(_) => JobStatus::Unknown,
        }
    }
}

/// A job as reported by any batch system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub queue: Option<String>,
    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    /// Execution host(s) or node list
    pub host: Option<String>,
    pub system: BatchSystem,
}

impl From<SlurmJob> for Job {
    fn from(job: SlurmJob) -> Self {
        Self {
            status: job.state.to_job_status(),
            id: job.id,
            name: job.name,
            queue: job.partition,
            submit_time: job.submitted,
            start_time: job.started,
            host: job.nodes,
            system: BatchSystem::Slurm,
        }
    }
}

impl From<LsfJob> for Job {
    fn from(job: LsfJob) -> Self {
        Self {
            status: job.state.to_job_status(),
            id: job.id,
            name: job.name,
            queue: job.queue,
            submit_time: job.submitted,
            start_time: job.started,
            host: job.hosts,
            system: BatchSystem::Lsf,
        }
    }
}

/// Registered local jobs are reported as running; callers adjust the
/// status once the process is known to be gone.
impl From<&LocalJob> for Job {
    fn from(job: &LocalJob) -> Self {
        Self {
            id: job.pid.to_string(),
            name: job.name.clone(),
            status: JobStatus::Running,
            queue: None,
            submit_time: Some(job.submitted),
            start_time: Some(job.submitted),
            host: None,
            system: BatchSystem::Local,
        }
    }
}

/// Select jobs by name pattern and status.
///
/// Every criterion that is set must match; an empty filter matches all jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Searched anywhere in the job name
    pub name: Option<Regex>,
    pub statuses: Vec<JobStatus>,
}

impl JobFilter {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.statuses.is_empty()
    }

    pub fn matches(&self, job: &Job) -> bool {
        if let Some(re) = &self.name {
            if !re.is_match(&job.name) {
                return false;
            }
        }
        self.statuses.is_empty() || self.statuses.contains(&job.status)
    }
}

static RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)-(\d+)$").expect("valid regex"));

/// Expand job id arguments.
///
/// Each argument is a single id or an inclusive numeric range `a-b`.
/// Duplicates are dropped, keeping the first occurrence.
pub fn parse_job_ids<S: AsRef<str>>(args: &[S]) -> Result<Vec<String>, BatchError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut push = |id: String| {
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    };

    for arg in args {
        let arg = arg.as_ref().trim();
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            return Err(BatchError::InvalidJobId(arg.to_string()));
        }

        if let Some(caps) = RANGE_RE.captures(arg) {
            let start: u64 = caps[1]
                .parse()
                .map_err(|_| BatchError::InvalidJobId(arg.to_string()))?;
            let end: u64 = caps[2]
                .parse()
                .map_err(|_| BatchError::InvalidJobId(arg.to_string()))?;
            if start > end || end - start + 1 > MAX_RANGE_IDS {
                return Err(BatchError::InvalidJobId(arg.to_string()));
            }
            for id in start..=end {
                push(id.to_string());
            }
        } else {
            push(arg.to_string());
        }
    }

    Ok(ids)
}
