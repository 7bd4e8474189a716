//! Kill jobs via bkill.

use batchtools_parsers::run_command_allow_failure;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum BkillError {
    #[error("bkill failed: {0}")]
    Command(String),
}

/// Kill the given jobs with a single bkill call.
///
/// bkill exits non-zero when any job in the list has already finished;
/// the remaining jobs are still killed, so that status is not an error.
pub async fn bkill(job_ids: &[String]) -> Result<(), BkillError> {
    if job_ids.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new("bkill");
    cmd.args(job_ids);

    let stdout = run_command_allow_failure(&mut cmd, "bkill")
        .await
        .map_err(|e| BkillError::Command(e.to_string()))?;

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        tracing::debug!("bkill: {}", line.trim());
    }
    tracing::info!(count = job_ids.len(), "killed LSF jobs");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bkill_nothing_is_noop() {
        assert!(bkill(&[]).await.is_ok());
    }
}
