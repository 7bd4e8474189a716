//! Submit jobs via bsub.

use batchtools_parsers::{format_duration_lsf, run_command};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum BsubError {
    #[error("bsub failed: {0}")]
    Command(String),
    #[error("Unexpected bsub output: {0}")]
    Output(String),
    #[error("No command to submit")]
    EmptyCommand,
}

/// Options for one bsub submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BsubOptions {
    pub job_name: Option<String>,
    /// Job output file, overwritten on resubmission (`-oo`)
    pub output: Option<String>,
    pub queue: Option<String>,
    pub nprocs: Option<u32>,
    pub mem_mb: Option<u64>,
    pub run_limit_secs: Option<u64>,
    /// Raw options, in order, rendered as `-key value` or `-key`.
    pub extra: Vec<(String, Option<String>)>,
}

/// Build the bsub arguments (without the program name).
pub fn build_bsub_args(opts: &BsubOptions, command: &[String]) -> Result<Vec<String>, BsubError> {
    if command.is_empty() || command.iter().all(|w| w.trim().is_empty()) {
        return Err(BsubError::EmptyCommand);
    }

    let mut args = Vec::new();

    if let Some(name) = &opts.job_name {
        args.extend(["-J".to_string(), name.clone()]);
    }
    if let Some(output) = &opts.output {
        args.extend(["-oo".to_string(), output.clone()]);
    }
    if let Some(queue) = &opts.queue {
        args.extend(["-q".to_string(), queue.clone()]);
    }
    if let Some(n) = opts.nprocs {
        args.extend(["-n".to_string(), n.to_string()]);
        if n > 1 {
            // Keep all slots on one host
            args.extend(["-R".to_string(), "span[hosts=1]".to_string()]);
        }
    }
    if let Some(mem) = opts.mem_mb {
        args.extend(["-M".to_string(), mem.to_string()]);
        args.extend(["-R".to_string(), format!("rusage[mem={}]", mem)]);
    }
    if let Some(secs) = opts.run_limit_secs {
        args.extend(["-W".to_string(), format_duration_lsf(secs)]);
    }
    for (key, value) in &opts.extra {
        args.push(format!("-{}", key.trim_start_matches('-')));
        if let Some(value) = value {
            args.push(value.clone());
        }
    }

    args.extend(command.iter().cloned());
    Ok(args)
}

/// Extract the job id from "Job <123> is submitted to queue <long>."
pub fn parse_bsub_output(stdout: &str) -> Result<String, BsubError> {
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Job <") {
            if let Some(end) = rest.find('>') {
                let id = &rest[..end];
                if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
                    return Ok(id.to_string());
                }
            }
        }
    }
    Err(BsubError::Output(stdout.trim().to_string()))
}

/// Submit a command with bsub and return the new job id.
pub async fn submit(opts: &BsubOptions, command: &[String]) -> Result<String, BsubError> {
    let args = build_bsub_args(opts, command)?;

    let mut cmd = Command::new("bsub");
    cmd.args(&args);

    let stdout = run_command(&mut cmd, "bsub")
        .await
        .map_err(|e| BsubError::Command(e.to_string()))?;

    parse_bsub_output(&stdout)
}
