//! Unfinished LSF jobs from bjobs.

use crate::types::{LsfJob, LsfJobState};
use batchtools_parsers::{
    non_empty_string, parse_lsf_timestamp, run_command_allow_failure, split_delimited,
};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum BjobsError {
    #[error("bjobs failed: {0}")]
    Command(String),
    #[error("Unexpected bjobs line: {0}")]
    Line(String),
}

/// Columns for `bjobs -o`. The name is last: it may contain the delimiter.
const COLUMNS: [&str; 7] = [
    "jobid",
    "stat",
    "queue",
    "submit_time",
    "start_time",
    "exec_host",
    "job_name",
];

fn output_format() -> String {
    format!("{} delimiter='|'", COLUMNS.join(" "))
}

fn parse_line(line: &str) -> Result<LsfJob, BjobsError> {
    let f = split_delimited(line, COLUMNS.len()).map_err(BjobsError::Line)?;
    let mut job = LsfJob::new(f[0].trim());
    job.state = LsfJobState::from(f[1]);
    job.queue = non_empty_string(f[2]);
    job.submitted = parse_lsf_timestamp(f[3]);
    job.started = parse_lsf_timestamp(f[4]);
    job.hosts = non_empty_string(f[5]);
    job.name = f[6..].join("|").trim().to_string();
    Ok(job)
}

/// "No unfinished job found" and similar notes go to stdout on some
/// LSF versions; they are not jobs.
fn parse_output(stdout: &str) -> Vec<LsfJob> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("No "))
        .filter_map(|l| match parse_line(l) {
            Ok(job) => Some(job),
            Err(e) => {
                tracing::warn!("Skipping bjobs line: {}", e);
                None
            }
        })
        .collect()
}

/// Unfinished jobs of `user` (everyone's when `None`), optionally only
/// those named `name`.
pub async fn query_bjobs(
    user: Option<&str>,
    name: Option<&str>,
) -> Result<Vec<LsfJob>, BjobsError> {
    let mut cmd = Command::new("bjobs");
    cmd.args(["-noheader", "-o", &output_format(), "-u", user.unwrap_or("all")]);
    if let Some(name) = name {
        cmd.args(["-J", name]);
    }

    // Non-zero when nothing matches
    let stdout = run_command_allow_failure(&mut cmd, "bjobs")
        .await
        .map_err(|e| BjobsError::Command(e.to_string()))?;
    Ok(parse_output(&stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_job() {
        let job = parse_line("4711|RUN|long|Dec 18 10:30|Dec 18 10:31|4*node01|fit_tile_0042").unwrap();
        assert_eq!(job.id, "4711");
        assert_eq!(job.state, LsfJobState::Run);
        assert_eq!(job.queue.as_deref(), Some("long"));
        assert!(job.submitted.is_some() && job.started.is_some());
        assert_eq!(job.hosts.as_deref(), Some("4*node01"));
        assert_eq!(job.name, "fit_tile_0042");
    }

    #[test]
    fn test_pending_job_with_pipe_in_name() {
        let job = parse_line("4712|PEND|short|Dec 18 10:30|-|-|a|b").unwrap();
        assert_eq!(job.state, LsfJobState::Pend);
        assert_eq!(job.started, None);
        assert_eq!(job.hosts, None);
        assert_eq!(job.name, "a|b");
    }

    #[test]
    fn test_output() {
        assert!(parse_output("No unfinished job found\n").is_empty());
        let jobs = parse_output("1|RUN|q|-|-|h|x\ngarbage\n\n2|PEND|q|-|-|-|y\n");
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[test]
    fn test_output_format() {
        assert_eq!(
            output_format(),
            "jobid stat queue submit_time start_time exec_host job_name delimiter='|'"
        );
    }
}
