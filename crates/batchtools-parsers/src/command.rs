//! Running scheduler commands and capturing their output.

use crate::shell::shell_join;
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with status {code}: {stderr}")]
    Status {
        program: String,
        code: i32,
        stderr: String,
    },
}

/// The command as it would be typed at a shell prompt.
pub fn command_line(cmd: &Command) -> String {
    let std_cmd = cmd.as_std();
    let words: Vec<String> = std::iter::once(std_cmd.get_program())
        .chain(std_cmd.get_args())
        .map(|w| w.to_string_lossy().into_owned())
        .collect();
    shell_join(&words)
}

async fn capture(cmd: &mut Command, program: &str) -> Result<Output, CommandError> {
    tracing::debug!(command = %command_line(cmd), "running");
    cmd.output().await.map_err(|source| CommandError::Spawn {
        program: program.to_string(),
        source,
    })
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stdout of a command that must succeed.
pub async fn run_command(cmd: &mut Command, program: &str) -> Result<String, CommandError> {
    let output = capture(cmd, program).await?;
    if output.status.success() {
        return Ok(stdout_text(&output));
    }
    Err(CommandError::Status {
        program: program.to_string(),
        // -1 when killed by a signal
        code: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Stdout of a command whose exit status carries no meaning, like bjobs
/// and bhist which exit non-zero when no job matches.
pub async fn run_command_allow_failure(
    cmd: &mut Command,
    program: &str,
) -> Result<String, CommandError> {
    let output = capture(cmd, program).await?;
    if !output.status.success() {
        tracing::debug!(program, status = ?output.status.code(), "ignoring exit status");
    }
    Ok(stdout_text(&output))
}
