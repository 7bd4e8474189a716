//! Cancel jobs via scancel.

use batchtools_parsers::run_command;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ScancelError {
    #[error("scancel failed: {0}")]
    Command(String),
}

/// Cancel the given jobs with a single scancel call.
pub async fn scancel(job_ids: &[String]) -> Result<(), ScancelError> {
    if job_ids.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new("scancel");
    cmd.args(job_ids);

    run_command(&mut cmd, "scancel")
        .await
        .map_err(|e| ScancelError::Command(e.to_string()))?;

    tracing::info!(count = job_ids.len(), "cancelled SLURM jobs");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scancel_nothing_is_noop() {
        assert!(scancel(&[]).await.is_ok());
    }
}
