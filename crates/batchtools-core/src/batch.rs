//! Scheduler-neutral job operations.

use batchtools_lsf::{BsubOptions, LsfJobState};
use batchtools_slurm::{FAILED_STATES, SbatchOptions};
use batchtools_parsers::run_command;
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::slice::Chunks;
use std::time::Duration;
use tokio::process::Command;

use crate::config::Config;
use crate::error::BatchError;
use crate::failure::FailureReport;
use crate::job::{Job, JobFilter, JobStatus};
use crate::local::LocalBackend;
use crate::logscan::{LogOutcome, scan_log_file};
use crate::system::BatchSystem;

/// Job ids passed to one scancel/bkill/kill invocation.
pub const KILL_CHUNK_SIZE: usize = 500;

/// Job name used when neither the request nor the config names the job.
const DEFAULT_JOB_NAME: &str = "batchtools";

/// What to run and with which resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Program and arguments; a single word is run as a shell line
    pub command: Vec<String>,
    pub jobname: Option<String>,
    pub logfile: Option<Utf8PathBuf>,
    pub queue: Option<String>,
    pub ncpus: Option<u32>,
    pub memory_mb: Option<u64>,
    pub runtime_secs: Option<u64>,
    /// Raw scheduler options, in order
    pub options: Vec<(String, Option<String>)>,
}

/// A job that was handed to the batch system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub id: String,
    pub system: BatchSystem,
    /// Program and arguments that were executed
    pub argv: Vec<String>,
}

/// Login name from `$USER`, else `$LOGNAME`.
fn user_from_env(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    ["USER", "LOGNAME"]
        .into_iter()
        .filter_map(lookup)
        .map(|u| u.trim().to_string())
        .find(|u| !u.is_empty())
}

/// Ids in the groups handed to one scancel/bkill/kill invocation each.
fn kill_chunks(ids: &[String]) -> Chunks<'_, String> {
    ids.chunks(KILL_CHUNK_SIZE)
}

/// Entry point for all job operations on one batch system.
pub struct Batch {
    system: BatchSystem,
    config: Config,
    user: Option<String>,
    local: LocalBackend,
}

impl Batch {
    /// Operate on `system` as the current user (`$USER`, else `$LOGNAME`,
    /// else the name `id -un` reports when a scheduler is queried).
    pub fn new(system: BatchSystem, config: Config) -> Self {
        let user = user_from_env(|key| std::env::var(key).ok());
        let local = LocalBackend::new(&config.state_dir());
        Self {
            system,
            config,
            user,
            local,
        }
    }

    /// Operate on another user's jobs.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn system(&self) -> BatchSystem {
        self.system
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// User whose jobs scheduler queries are limited to. Never widens to
    /// all users.
    async fn scheduler_user(&self) -> Result<String, BatchError> {
        if let Some(user) = &self.user {
            return Ok(user.clone());
        }
        let mut cmd = Command::new("id");
        cmd.arg("-un");
        let name = run_command(&mut cmd, "id").await?.trim().to_string();
        if name.is_empty() {
            return Err(BatchError::UnknownUser);
        }
        tracing::debug!(user = %name, "user taken from id -un");
        Ok(name)
    }

    /// Fill in config defaults. Request values win.
    fn resolve(&self, req: &SubmitRequest) -> Result<SubmitRequest, BatchError> {
        if req.command.iter().all(|w| w.trim().is_empty()) {
            return Err(BatchError::EmptyCommand);
        }

        let scheduler = match self.system {
            BatchSystem::Lsf => Some(&self.config.lsf),
            BatchSystem::Slurm => Some(&self.config.slurm),
            BatchSystem::Local => None,
        };

        let queue = req
            .queue
            .clone()
            .or_else(|| scheduler.and_then(|s| s.queue.clone()));

        let runtime_secs = req.runtime_secs.or_else(|| {
            queue
                .as_deref()
                .and_then(|q| self.config.runlimit_secs(q))
        });

        let mut options = scheduler.map(|s| s.option_pairs()).unwrap_or_default();
        let overridden: HashSet<&str> = req.options.iter().map(|(k, _)| k.as_str()).collect();
        options.retain(|(key, _)| !overridden.contains(key.as_str()));
        options.extend(req.options.iter().cloned());

        Ok(SubmitRequest {
            command: req.command.clone(),
            jobname: req.jobname.clone().or_else(|| self.config.jobname.clone()),
            logfile: req.logfile.clone(),
            queue,
            ncpus: req.ncpus,
            memory_mb: req.memory_mb,
            runtime_secs,
            options,
        })
    }

    fn sbatch_options(req: &SubmitRequest) -> SbatchOptions {
        SbatchOptions {
            job_name: req.jobname.clone(),
            output: req.logfile.as_ref().map(|p| p.to_string()),
            partition: req.queue.clone(),
            cpus: req.ncpus,
            mem_mb: req.memory_mb,
            time_limit_secs: req.runtime_secs,
            extra: req.options.clone(),
        }
    }

    fn bsub_options(req: &SubmitRequest) -> BsubOptions {
        BsubOptions {
            job_name: req.jobname.clone(),
            output: req.logfile.as_ref().map(|p| p.to_string()),
            queue: req.queue.clone(),
            nprocs: req.ncpus,
            mem_mb: req.memory_mb,
            run_limit_secs: req.runtime_secs,
            extra: req.options.clone(),
        }
    }

    /// The argv (program and arguments) a submission would execute.
    pub fn submission(&self, req: &SubmitRequest) -> Result<Vec<String>, BatchError> {
        let req = self.resolve(req)?;
        let argv: Vec<String> = match self.system {
            BatchSystem::Slurm => {
                let args =
                    batchtools_slurm::build_sbatch_args(&Self::sbatch_options(&req), &req.command)?;
                std::iter::once("sbatch".to_string()).chain(args).collect()
            }
            BatchSystem::Lsf => {
                let args = batchtools_lsf::build_bsub_args(&Self::bsub_options(&req), &req.command)?;
                std::iter::once("bsub".to_string()).chain(args).collect()
            }
            BatchSystem::Local => self.local.submission(&req.command, req.logfile.as_deref())?,
        };
        Ok(argv)
    }

    /// Submit a job.
    pub async fn submit(&self, req: &SubmitRequest) -> Result<SubmittedJob, BatchError> {
        let argv = self.submission(req)?;
        let req = self.resolve(req)?;

        if let Some(parent) = req.logfile.as_ref().and_then(|p| p.parent()) {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let id = match self.system {
            BatchSystem::Slurm => {
                batchtools_slurm::submit(&Self::sbatch_options(&req), &req.command).await?
            }
            BatchSystem::Lsf => {
                batchtools_lsf::submit(&Self::bsub_options(&req), &req.command).await?
            }
            BatchSystem::Local => {
                if !req.options.is_empty() || req.queue.is_some() {
                    tracing::warn!("queue and scheduler options are ignored for local jobs");
                }
                let name = req.jobname.as_deref().unwrap_or(DEFAULT_JOB_NAME);
                self.local
                    .submit(name, &req.command, req.logfile.as_deref())
                    .await?
                    .pid
                    .to_string()
            }
        };

        tracing::info!(job_id = %id, system = %self.system, "submitted job");
        Ok(SubmittedJob {
            id,
            system: self.system,
            argv,
        })
    }

    /// The user's active jobs that match `filter`.
    pub async fn jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, BatchError> {
        let jobs: Vec<Job> = match self.system {
            BatchSystem::Slurm => {
                let user = self.scheduler_user().await?;
                batchtools_slurm::query_squeue(Some(user.as_str()), None)
                    .await?
                    .into_iter()
                    .map(Job::from)
                    .collect()
            }
            BatchSystem::Lsf => {
                let user = self.scheduler_user().await?;
                batchtools_lsf::query_bjobs(Some(user.as_str()), None)
                    .await?
                    .into_iter()
                    .map(Job::from)
                    .collect()
            }
            BatchSystem::Local => self.local.jobs().await?.iter().map(Job::from).collect(),
        };
        Ok(jobs.into_iter().filter(|job| filter.matches(job)).collect())
    }

    /// Number of the user's active jobs.
    pub async fn njobs(&self) -> Result<usize, BatchError> {
        Ok(self.jobs(&JobFilter::default()).await?.len())
    }

    /// Wait until fewer than `max_jobs` jobs are active.
    pub async fn throttle(&self, max_jobs: Option<usize>, sleep: Duration) -> Result<(), BatchError> {
        let Some(max_jobs) = max_jobs else {
            return Ok(());
        };
        if max_jobs == 0 {
            return Err(BatchError::InvalidThrottle);
        }

        loop {
            let n = self.njobs().await?;
            if n < max_jobs {
                return Ok(());
            }
            tracing::info!("{} jobs already in queue, waiting...", n);
            tokio::time::sleep(sleep).await;
        }
    }

    /// Kill jobs by id. Returns the number of ids handed to the scheduler.
    pub async fn kill(&self, ids: &[String]) -> Result<usize, BatchError> {
        let mut count = 0;
        for chunk in kill_chunks(ids) {
            match self.system {
                BatchSystem::Slurm => {
                    batchtools_slurm::scancel(chunk).await?;
                    count += chunk.len();
                }
                BatchSystem::Lsf => {
                    batchtools_lsf::bkill(chunk).await?;
                    count += chunk.len();
                }
                BatchSystem::Local => count += self.local.kill(chunk).await?,
            }
        }
        Ok(count)
    }

    /// Explain why a job failed.
    pub async fn analyze_failure(&self, job_id: &str) -> Result<FailureReport, BatchError> {
        match self.system {
            BatchSystem::Slurm => Ok(batchtools_slurm::analyze_failure(job_id).await?.into()),
            BatchSystem::Lsf => Ok(batchtools_lsf::analyze_failure(job_id).await?.into()),
            BatchSystem::Local => {
                let job = self
                    .local
                    .registered()?
                    .into_iter()
                    .find(|job| job.pid.to_string() == job_id)
                    .ok_or_else(|| BatchError::JobNotFound(job_id.to_string()))?;
                let Some(logfile) = job.logfile else {
                    return Err(BatchError::Unsupported {
                        system: self.system,
                        operation: "Failure analysis without a log file",
                    });
                };
                let outcome = scan_log_file(&logfile)?;
                Ok(FailureReport::from_log(job_id, &outcome))
            }
        }
    }

    /// Jobs of the user that failed since `since`.
    pub async fn recent_failures(&self, since: DateTime<Utc>) -> Result<Vec<Job>, BatchError> {
        let jobs: Vec<Job> = match self.system {
            BatchSystem::Slurm => {
                let user = self.scheduler_user().await?;
                batchtools_slurm::query_sacct(Some(user.as_str()), since, &FAILED_STATES)
                    .await?
                    .into_iter()
                    .map(Job::from)
                    .collect()
            }
            BatchSystem::Lsf => {
                let user = self.scheduler_user().await?;
                batchtools_lsf::query_bhist(Some(user.as_str()), None, Some(since))
                    .await?
                    .into_iter()
                    .filter(|job| matches!(job.state, LsfJobState::Exit { .. }))
                    .map(Job::from)
                    .collect()
            }
            BatchSystem::Local => {
                let mut failed = Vec::new();
                for local in self.local.registered()? {
                    if local.submitted < since {
                        continue;
                    }
                    let Some(logfile) = &local.logfile else {
                        continue;
                    };
                    match scan_log_file(logfile) {
                        Ok(LogOutcome::Failed { .. }) => {
                            let mut job = Job::from(&local);
                            job.status = JobStatus::Failed;
                            failed.push(job);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!(%logfile, "cannot read log: {}", e),
                    }
                }
                failed
            }
        };
        Ok(jobs)
    }
}
