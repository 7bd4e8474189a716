//! Finished SLURM jobs from sacct.

use crate::types::{SlurmJob, SlurmJobState};
use batchtools_parsers::{
    non_empty_string, parse_exit_code, parse_slurm_timestamp, run_command, split_delimited,
};
use chrono::{DateTime, Local, Utc};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum SacctError {
    #[error("sacct failed: {0}")]
    Command(String),
    #[error("Unexpected sacct line: {0}")]
    Line(String),
}

/// States `cfail --since` reports.
pub const FAILED_STATES: [&str; 4] = ["FAILED", "TIMEOUT", "OUT_OF_MEMORY", "NODE_FAIL"];

/// The name goes last so a `|` inside it cannot shift the other columns.
const SACCT_FORMAT: &str = "JobIDRaw,State,ExitCode,Partition,Submit,Start,NodeList,JobName";
const SACCT_FIELDS: usize = 8;

fn parse_line(line: &str) -> Result<SlurmJob, SacctError> {
    let f = split_delimited(line, SACCT_FIELDS).map_err(SacctError::Line)?;
    Ok(SlurmJob {
        id: f[0].to_string(),
        state: SlurmJobState::parse(f[1], parse_exit_code(f[2])),
        partition: non_empty_string(f[3]),
        submitted: parse_slurm_timestamp(f[4]),
        started: parse_slurm_timestamp(f[5]),
        nodes: non_empty_string(f[6]),
        name: f[7..].join("|"),
    })
}

/// sacct reads `--starttime` in the host's local time.
fn starttime_arg(since: DateTime<Utc>) -> String {
    since
        .with_timezone(&Local)
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

/// Allocations (`-X`, no steps) that started after `since`.
///
/// `user` limits the query to one user, otherwise all users are included.
/// A non-empty `states` limits it to those states, e.g. [`FAILED_STATES`].
pub async fn query_sacct(
    user: Option<&str>,
    since: DateTime<Utc>,
    states: &[&str],
) -> Result<Vec<SlurmJob>, SacctError> {
    let mut cmd = Command::new("sacct");
    cmd.args(["-X", "--parsable2", "--noheader", "--format", SACCT_FORMAT])
        .arg("--starttime")
        .arg(starttime_arg(since));
    match user {
        Some(user) => cmd.args(["--user", user]),
        None => cmd.arg("--allusers"),
    };
    if !states.is_empty() {
        cmd.arg(format!("--state={}", states.join(",")));
    }

    let stdout = run_command(&mut cmd, "sacct")
        .await
        .map_err(|e| SacctError::Command(e.to_string()))?;

    Ok(stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| {
            parse_line(l)
                .inspect_err(|e| tracing::warn!("Skipping sacct line: {}", e))
                .ok()
        })
        .collect())
}
