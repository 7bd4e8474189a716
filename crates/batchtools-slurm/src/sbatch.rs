//! Submit jobs via sbatch.

use batchtools_parsers::{format_duration_slurm, run_command, shell_join};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum SbatchError {
    #[error("sbatch failed: {0}")]
    Command(String),
    #[error("Unexpected sbatch output: {0}")]
    Output(String),
    #[error("No command to submit")]
    EmptyCommand,
}

/// Options for one sbatch submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SbatchOptions {
    pub job_name: Option<String>,
    /// stdout and stderr both go here
    pub output: Option<String>,
    pub partition: Option<String>,
    pub cpus: Option<u32>,
    pub mem_mb: Option<u64>,
    pub time_limit_secs: Option<u64>,
    /// Raw options, in order. Single-letter keys become `-k value`,
    /// longer keys `--key=value`.
    pub extra: Vec<(String, Option<String>)>,
}

fn push_extra(args: &mut Vec<String>, key: &str, value: Option<&str>) {
    let key = key.trim_start_matches('-');
    match (key.len(), value) {
        (1, Some(value)) => {
            args.push(format!("-{}", key));
            args.push(value.to_string());
        }
        (1, None) => args.push(format!("-{}", key)),
        (_, Some(value)) => args.push(format!("--{}={}", key, value)),
        (_, None) => args.push(format!("--{}", key)),
    }
}

/// Build the sbatch arguments (without the program name).
///
/// The command is passed through `--wrap`: a single word is used verbatim
/// so callers can hand over a complete shell line, several words are
/// shell-quoted and joined.
pub fn build_sbatch_args(
    opts: &SbatchOptions,
    command: &[String],
) -> Result<Vec<String>, SbatchError> {
    if command.is_empty() || command.iter().all(|w| w.trim().is_empty()) {
        return Err(SbatchError::EmptyCommand);
    }

    let mut args = vec!["--parsable".to_string()];

    if let Some(name) = &opts.job_name {
        args.push(format!("--job-name={}", name));
    }
    if let Some(output) = &opts.output {
        args.push(format!("--output={}", output));
        args.push(format!("--error={}", output));
    }
    if let Some(partition) = &opts.partition {
        args.push(format!("--partition={}", partition));
    }
    if let Some(cpus) = opts.cpus {
        args.push(format!("--cpus-per-task={}", cpus));
    }
    if let Some(mem) = opts.mem_mb {
        args.push(format!("--mem={}M", mem));
    }
    if let Some(secs) = opts.time_limit_secs {
        args.push(format!("--time={}", format_duration_slurm(secs)));
    }
    for (key, value) in &opts.extra {
        push_extra(&mut args, key, value.as_deref());
    }

    let wrapped = if command.len() == 1 {
        command[0].clone()
    } else {
        shell_join(command)
    };
    args.push(format!("--wrap={}", wrapped));

    Ok(args)
}

/// Extract the job id from `sbatch --parsable` output ("123" or "123;cluster").
pub fn parse_sbatch_output(stdout: &str) -> Result<String, SbatchError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| SbatchError::Output("empty output".to_string()))?;

    let id = line.split(';').next().unwrap_or(line).trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(SbatchError::Output(line.to_string()));
    }
    Ok(id.to_string())
}

/// Submit a command with sbatch and return the new job id.
pub async fn submit(opts: &SbatchOptions, command: &[String]) -> Result<String, SbatchError> {
    let args = build_sbatch_args(opts, command)?;

    let mut cmd = Command::new("sbatch");
    cmd.args(&args);

    let stdout = run_command(&mut cmd, "sbatch")
        .await
        .map_err(|e| SbatchError::Command(e.to_string()))?;

    parse_sbatch_output(&stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(ws: &[&str]) -> Vec<String> {
        ws.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_build_sbatch_args_full() {
        let opts = SbatchOptions {
            job_name: Some("fit".to_string()),
            output: Some("logs/fit.log".to_string()),
            partition: Some("normal".to_string()),
            cpus: Some(4),
            mem_mb: Some(8192),
            time_limit_secs: Some(90061),
            extra: vec![
                ("account".to_string(), Some("des".to_string())),
                ("N".to_string(), Some("1".to_string())),
                ("exclusive".to_string(), None),
            ],
        };
        let args = build_sbatch_args(&opts, &words(&["python", "fit.py", "a b"])).unwrap();
        assert_eq!(
            args,
            words(&[
                "--parsable",
                "--job-name=fit",
                "--output=logs/fit.log",
                "--error=logs/fit.log",
                "--partition=normal",
                "--cpus-per-task=4",
                "--mem=8192M",
                "--time=1-01:01:01",
                "--account=des",
                "-N",
                "1",
                "--exclusive",
                "--wrap=python fit.py 'a b'",
            ])
        );
    }

    #[test]
    fn test_build_sbatch_args_single_word_command_is_verbatim() {
        let args =
            build_sbatch_args(&SbatchOptions::default(), &words(&["echo $HOSTNAME && sleep 1"]))
                .unwrap();
        assert_eq!(
            args,
            words(&["--parsable", "--wrap=echo $HOSTNAME && sleep 1"])
        );
    }

    #[test]
    fn test_build_sbatch_args_empty_command() {
        assert!(matches!(
            build_sbatch_args(&SbatchOptions::default(), &[]),
            Err(SbatchError::EmptyCommand)
        ));
    }

    #[test]
    fn test_parse_sbatch_output() {
        assert_eq!(parse_sbatch_output("12345\n").unwrap(), "12345");
        assert_eq!(parse_sbatch_output("12345;cluster1\n").unwrap(), "12345");
        assert!(parse_sbatch_output("").is_err());
        assert!(parse_sbatch_output("Submitted batch job 1").is_err());
    }
}
