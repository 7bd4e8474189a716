//! Local backend: jobs run as background processes on this host.
//!
//! Every job is started through `sh -c` in its own process group. The
//! script redirects its own output to the log file. The wrapper appends the same completion
//! line LSF writes to job output ("Successfully completed." or "Exited with
//! exit code N."), so logs can be checked by [`crate::logscan`] no matter
//! where the job ran. Submitted jobs are remembered in a JSON registry keyed
//! by process id.

use batchtools_parsers::{run_command_allow_failure, shell_join, shell_quote};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

use crate::error::BatchError;

/// Registry entries kept; the oldest are dropped first.
const MAX_REGISTRY_JOBS: usize = 1000;

const REGISTRY_FILE: &str = "local_jobs.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A job started by the local backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalJob {
    /// Process id, also the process group id and the job id
    pub pid: u32,
    pub name: String,
    /// Shell line the job runs
    pub command: String,
    pub logfile: Option<Utf8PathBuf>,
    pub submitted: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Registry {
    jobs: Vec<LocalJob>,
}

/// Persistent storage for the local job registry.
pub struct LocalStore {
    path: Utf8PathBuf,
}

impl LocalStore {
    /// Registry stored at `<state_dir>/local_jobs.json`.
    pub fn new(state_dir: &Utf8Path) -> Self {
        Self {
            path: state_dir.join(REGISTRY_FILE),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Load registered jobs, oldest first.
    ///
    /// Returns an empty list if the file doesn't exist.
    pub fn load(&self) -> Result<Vec<LocalJob>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let registry: Registry = serde_json::from_str(&content)?;
        Ok(registry.jobs)
    }

    /// Save registered jobs, keeping only the newest entries.
    ///
    /// Creates parent directories if needed.
    pub fn save(&self, jobs: &[LocalJob]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let skip = jobs.len().saturating_sub(MAX_REGISTRY_JOBS);
        let registry = Registry {
            jobs: jobs[skip..].to_vec(),
        };
        let content = serde_json::to_string_pretty(&registry)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Shell line for the command: a single word is taken as a complete shell
/// line, several words are quoted and joined.
fn command_line(command: &[String]) -> String {
    match command {
        [line] => line.clone(),
        words => shell_join(words),
    }
}

/// Script run by `sh -c` for a local job. Output goes to `logfile`, or
/// is discarded.
fn wrapper_script(command: &[String], logfile: Option<&Utf8Path>) -> String {
    let target = logfile.map_or_else(|| "/dev/null".to_string(), |p| shell_quote(p.as_str()));
    format!(
        "exec > {} 2>&1\n{}\nrc=$?\nif [ $rc -eq 0 ]; then\n  echo 'Successfully completed.'\nelse\n  echo \"Exited with exit code $rc.\"\nfi\nexit $rc",
        target,
        command_line(command)
    )
}

/// Whether a process (group leader) with this pid exists.
async fn is_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Runs jobs as detached background processes.
pub struct LocalBackend {
    store: LocalStore,
}

impl LocalBackend {
    pub fn new(state_dir: &Utf8Path) -> Self {
        Self {
            store: LocalStore::new(state_dir),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// The argv a submission executes. It runs in a new process group.
    pub fn submission(
        &self,
        command: &[String],
        logfile: Option<&Utf8Path>,
    ) -> Result<Vec<String>, BatchError> {
        if command.iter().all(|w| w.trim().is_empty()) {
            return Err(BatchError::EmptyCommand);
        }
        Ok(vec![
            "sh".to_string(),
            "-c".to_string(),
            wrapper_script(command, logfile),
        ])
    }

    /// Start a job in the background and register it.
    pub async fn submit(
        &self,
        name: &str,
        command: &[String],
        logfile: Option<&Utf8Path>,
    ) -> Result<LocalJob, BatchError> {
        let argv = self.submission(command, logfile)?;
        // An unreadable registry must fail before anything starts.
        let mut jobs = self.store.load()?;
        if let Some(path) = logfile {
            File::create(path)?;
        }

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()?;
        let pid = child.id().ok_or_else(|| {
            BatchError::Io(std::io::Error::other("local job exited before its pid was read"))
        })?;

        let job = LocalJob {
            pid,
            name: name.to_string(),
            command: command_line(command),
            logfile: logfile.map(Utf8Path::to_path_buf),
            submitted: Utc::now(),
        };

        jobs.push(job.clone());
        self.store.save(&jobs)?;

        tracing::debug!(pid, name, "started local job");
        Ok(job)
    }

    /// All registered jobs, finished ones included.
    pub fn registered(&self) -> Result<Vec<LocalJob>, BatchError> {
        Ok(self.store.load()?)
    }

    /// Registered jobs whose process is still alive.
    pub async fn jobs(&self) -> Result<Vec<LocalJob>, BatchError> {
        let mut alive = Vec::new();
        for job in self.store.load()? {
            if is_alive(job.pid).await {
                alive.push(job);
            }
        }
        Ok(alive)
    }

    /// Send SIGTERM to each registered job's process group and drop it from
    /// the registry. Ids that are not registered are skipped.
    ///
    /// Returns the number of jobs signalled.
    pub async fn kill(&self, ids: &[String]) -> Result<usize, BatchError> {
        let mut jobs = self.store.load()?;
        let mut signalled = Vec::new();
        for id in ids {
            let pid: u32 = id
                .parse()
                .map_err(|_| BatchError::InvalidJobId(id.clone()))?;
            if signalled.contains(&pid) {
                continue;
            }
            if !jobs.iter().any(|job| job.pid == pid) {
                tracing::warn!(pid, "not a registered local job, skipping");
                continue;
            }
            let mut cmd = Command::new("kill");
            cmd.args(["-TERM", "--", &format!("-{}", pid)]);
            let out = run_command_allow_failure(&mut cmd, "kill").await?;
            tracing::debug!(pid, output = out.trim(), "signalled local job");
            signalled.push(pid);
        }

        if !signalled.is_empty() {
            jobs.retain(|job| !signalled.contains(&job.pid));
            self.store.save(&jobs)?;
        }
        Ok(signalled.len())
    }
}
