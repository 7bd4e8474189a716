//! Queued and running SLURM jobs from squeue.

use crate::types::{SlurmJob, SlurmJobState};
use batchtools_parsers::{non_empty_string, parse_slurm_timestamp, run_command, split_delimited};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum SqueueError {
    #[error("squeue failed: {0}")]
    Command(String),
    #[error("Unexpected squeue line: {0}")]
    Line(String),
}

/// id, state, partition, submit time, start time, nodes, then the name,
/// which may itself contain `|`.
const SQUEUE_FORMAT: &str = "%A|%T|%P|%V|%S|%N|%j";
const SQUEUE_FIELDS: usize = 7;

fn parse_line(line: &str) -> Result<SlurmJob, SqueueError> {
    let f = split_delimited(line, SQUEUE_FIELDS).map_err(SqueueError::Line)?;
    Ok(SlurmJob {
        id: f[0].trim().to_string(),
        state: SlurmJobState::parse(f[1], 0),
        partition: non_empty_string(f[2]),
        submitted: parse_slurm_timestamp(f[3]),
        started: parse_slurm_timestamp(f[4]),
        nodes: non_empty_string(f[5]),
        name: f[6..].join("|"),
    })
}

fn parse_output(stdout: &str) -> Vec<SlurmJob> {
    let mut jobs = Vec::new();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        match parse_line(line) {
            Ok(job) => jobs.push(job),
            Err(e) => tracing::warn!("Skipping squeue line: {}", e),
        }
    }
    jobs
}

/// Active jobs of `user` (everyone's when `None`), optionally only those
/// with exactly the name `name`.
pub async fn query_squeue(
    user: Option<&str>,
    name: Option<&str>,
) -> Result<Vec<SlurmJob>, SqueueError> {
    let mut cmd = Command::new("squeue");
    cmd.args(["--noheader", "--format", SQUEUE_FORMAT]);
    if let Some(user) = user {
        cmd.args(["--user", user]);
    }
    if let Some(name) = name {
        cmd.args(["--name", name]);
    }

    let stdout = run_command(&mut cmd, "squeue")
        .await
        .map_err(|e| SqueueError::Command(e.to_string()))?;
    Ok(parse_output(&stdout))
}
