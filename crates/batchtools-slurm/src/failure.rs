//! Why did a SLURM job fail?
//!
//! `sacct` reports one record for the allocation and one per step. The
//! allocation carries the state, limits and exit code; the steps carry the
//! memory actually used.

use batchtools_parsers::{
    MemoryFormat, format_duration, format_duration_slurm, format_memory, parse_duration_secs,
    parse_memory_mb, run_command_allow_failure, suggest_memory_mb, suggest_runtime_secs,
};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum FailureError {
    #[error("sacct query failed: {0}")]
    Sacct(String),
    #[error("No accounting record for job {0}")]
    NotFound(String),
    #[error("Malformed sacct record: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureMode {
    OutOfMemory {
        peak_mb: u64,
        requested_mb: u64,
        suggested_mb: u64,
    },
    Timeout {
        elapsed_secs: u64,
        limit_secs: u64,
        suggested_secs: u64,
    },
    /// Non-zero exit, possibly from a signal
    ExitCode { code: i32, signal: Option<i32> },
    Cancelled { by: Option<String> },
    NodeFailure { node: Option<String> },
    /// Pending, running or completed
    NotFailed { state: String },
    Unknown { state: String },
}

#[derive(Debug, Clone)]
pub struct FailureAnalysis {
    pub job_id: String,
    pub mode: FailureMode,
    pub explanation: String,
    pub suggestion: String,
    /// State column of the allocation record, e.g. "CANCELLED by 1001"
    pub state: String,
    /// Largest MaxRSS over all steps
    pub peak_rss_mb: Option<u64>,
    pub requested_mem_mb: Option<u64>,
    pub elapsed_secs: Option<u64>,
    pub limit_secs: Option<u64>,
}

const SACCT_FIELDS: &str = "JobID,State,ExitCode,MaxRSS,ReqMem,Elapsed,Timelimit,NodeList";
const SACCT_FIELD_COUNT: usize = 8;

/// One line of `sacct --parsable2` output in `SACCT_FIELDS` order.
#[derive(Debug)]
struct SacctRecord<'a> {
    id: &'a str,
    state: &'a str,
    exit: &'a str,
    max_rss: &'a str,
    req_mem: &'a str,
    elapsed: &'a str,
    limit: &'a str,
    nodes: &'a str,
}

impl<'a> SacctRecord<'a> {
    fn parse(line: &'a str) -> Result<Self, FailureError> {
        let f: Vec<&str> = line.split('|').collect();
        if f.len() < SACCT_FIELD_COUNT {
            return Err(FailureError::Malformed(format!(
                "{} of {} fields in '{}'",
                f.len(),
                SACCT_FIELD_COUNT,
                line
            )));
        }
        Ok(Self {
            id: f[0],
            state: f[1],
            exit: f[2],
            max_rss: f[3],
            req_mem: f[4],
            elapsed: f[5],
            limit: f[6],
            nodes: f[7],
        })
    }

    /// Step records are suffixed: "123.batch", "123.0".
    fn is_step(&self) -> bool {
        self.id.contains('.')
    }
}

pub async fn analyze_failure(job_id: &str) -> Result<FailureAnalysis, FailureError> {
    let mut cmd = Command::new("sacct");
    cmd.args(["-j", job_id, "--parsable2", "--noheader", "--format", SACCT_FIELDS]);

    let stdout = run_command_allow_failure(&mut cmd, "sacct")
        .await
        .map_err(|e| FailureError::Sacct(e.to_string()))?;
    if stdout.trim().is_empty() {
        return Err(FailureError::NotFound(job_id.to_string()));
    }
    parse_failure_output(job_id, &stdout)
}

fn parse_failure_output(job_id: &str, output: &str) -> Result<FailureAnalysis, FailureError> {
    let records = output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(SacctRecord::parse)
        .collect::<Result<Vec<_>, _>>()?;

    let peak_rss_mb = records
        .iter()
        .filter_map(|r| parse_memory_mb(r.max_rss, MemoryFormat::SlurmSacct))
        .max();
    let alloc = records
        .iter()
        .find(|r| !r.is_step())
        .ok_or_else(|| FailureError::NotFound(job_id.to_string()))?;

    let requested_mem_mb = parse_memory_mb(alloc.req_mem, MemoryFormat::SlurmSacct);
    let elapsed_secs = parse_duration_secs(alloc.elapsed);
    let limit_secs = parse_duration_secs(alloc.limit);
    let mode = classify(alloc, peak_rss_mb, requested_mem_mb, elapsed_secs, limit_secs);

    Ok(FailureAnalysis {
        job_id: job_id.to_string(),
        explanation: explain(&mode),
        suggestion: suggest(&mode),
        mode,
        state: alloc.state.to_string(),
        peak_rss_mb,
        requested_mem_mb,
        elapsed_secs,
        limit_secs,
    })
}

fn classify(
    alloc: &SacctRecord<'_>,
    peak_rss_mb: Option<u64>,
    requested_mem_mb: Option<u64>,
    elapsed_secs: Option<u64>,
    limit_secs: Option<u64>,
) -> FailureMode {
    let oom = || {
        let peak = peak_rss_mb.unwrap_or(0);
        let requested = requested_mem_mb.unwrap_or(0);
        FailureMode::OutOfMemory {
            peak_mb: peak,
            requested_mb: requested,
            suggested_mb: suggest_memory_mb(peak, requested),
        }
    };

    let mut words = alloc.state.split_whitespace();
    let base = words.next().unwrap_or_default().to_uppercase();
    match base.as_str() {
        "OUT_OF_MEMORY" => oom(),
        "TIMEOUT" | "DEADLINE" => {
            let elapsed = elapsed_secs.unwrap_or(0);
            let limit = limit_secs.unwrap_or(0);
            FailureMode::Timeout {
                elapsed_secs: elapsed,
                limit_secs: limit,
                suggested_secs: suggest_runtime_secs(elapsed, limit),
            }
        }
        "CANCELLED" => {
            // "CANCELLED by 1001"
            let by = match (words.next(), words.next()) {
                (Some("by"), Some(who)) => Some(who.to_string()),
                _ => None,
            };
            FailureMode::Cancelled { by }
        }
        "NODE_FAIL" => FailureMode::NodeFailure {
            node: match alloc.nodes.trim() {
                "" | "None" | "None assigned" => None,
                n => Some(n.to_string()),
            },
        },
        "FAILED" | "BOOT_FAIL" => {
            let (code, signal) = split_exit(alloc.exit);
            let sigkill = signal == Some(9) && peak_rss_mb.is_some();
            if code == 137 || sigkill {
                oom()
            } else {
                FailureMode::ExitCode { code, signal }
            }
        }
        "PENDING" | "RUNNING" | "COMPLETED" | "COMPLETING" | "SUSPENDED" | "REQUEUED" => {
            FailureMode::NotFailed { state: base }
        }
        _ => FailureMode::Unknown { state: base },
    }
}

/// "137:9" -> (137, Some(9)); a zero signal is no signal.
fn split_exit(s: &str) -> (i32, Option<i32>) {
    let (code, signal) = s.split_once(':').unwrap_or((s, ""));
    let code = code.trim().parse().unwrap_or(0);
    let signal = signal.trim().parse().ok().filter(|&n: &i32| n != 0);
    (code, signal)
}

fn signal_name(signal: i32) -> Option<&'static str> {
    match signal {
        6 => Some("SIGABRT"),
        9 => Some("SIGKILL"),
        11 => Some("SIGSEGV, segmentation fault"),
        15 => Some("SIGTERM"),
        _ => None,
    }
}

fn exit_code_meaning(code: i32) -> Option<&'static str> {
    match code {
        1 => Some("general error"),
        2 => Some("misuse of shell builtin"),
        126 => Some("command not executable"),
        127 => Some("command not found"),
        137 => Some("killed by SIGKILL, often the OOM killer"),
        _ => None,
    }
}

fn gigabytes(mb: u64) -> f64 {
    mb as f64 / 1024.0
}

fn explain(mode: &FailureMode) -> String {
    match mode {
        FailureMode::OutOfMemory {
            peak_mb,
            requested_mb,
            ..
        } => format!(
            "Job ran out of memory: peaked at {:.1} GB with {:.1} GB requested",
            gigabytes(*peak_mb),
            gigabytes(*requested_mb)
        ),
        FailureMode::Timeout {
            elapsed_secs,
            limit_secs,
            ..
        } => format!(
            "Job hit its time limit after {} (limit {})",
            format_duration(*elapsed_secs),
            format_duration(*limit_secs)
        ),
        FailureMode::ExitCode {
            code,
            signal: Some(sig),
        } => match signal_name(*sig) {
            Some(name) => format!("Job killed by signal {} ({}), exit code {}", sig, name, code),
            None => format!("Job killed by signal {}, exit code {}", sig, code),
        },
        FailureMode::ExitCode { code, signal: None } => match exit_code_meaning(*code) {
            Some(meaning) => format!("Job failed with exit code {} ({})", code, meaning),
            None => format!("Job failed with exit code {}", code),
        },
        FailureMode::Cancelled { by: Some(who) } => format!("Job was cancelled by {}", who),
        FailureMode::Cancelled { by: None } => "Job was cancelled".to_string(),
        FailureMode::NodeFailure { node: Some(node) } => format!("Node {} failed", node),
        FailureMode::NodeFailure { node: None } => "A node allocated to the job failed".to_string(),
        FailureMode::NotFailed { state } => format!("Job has not failed ({})", state),
        FailureMode::Unknown { state } => format!("Job ended in state {}", state),
    }
}

fn suggest(mode: &FailureMode) -> String {
    match mode {
        FailureMode::OutOfMemory { suggested_mb, .. } => format!(
            "Resubmit with more memory, e.g. csub --memory {}",
            format_memory(*suggested_mb)
        ),
        FailureMode::Timeout { suggested_secs, .. } => format!(
            "Resubmit with a longer limit, e.g. csub --runtime {}",
            format_duration_slurm(*suggested_secs)
        ),
        FailureMode::ExitCode { code: 137, .. } => {
            "Probably out of memory; resubmit with a larger --memory.".to_string()
        }
        FailureMode::ExitCode { .. } => {
            "Look for the error in the job's log (cfail -r <logdir>).".to_string()
        }
        FailureMode::Cancelled { .. } => {
            "Check whether the cancellation was intended or caused by a dependency.".to_string()
        }
        FailureMode::NodeFailure { .. } => {
            "Resubmit; report the node to the administrators if it keeps happening.".to_string()
        }
        FailureMode::NotFailed { .. } => "Nothing to do.".to_string(),
        FailureMode::Unknown { .. } => "Inspect `sacct -j <id> -l` for details.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(out: &str) -> FailureAnalysis {
        parse_failure_output("1", out).unwrap()
    }

    #[test]
    fn test_split_exit() {
        assert_eq!(split_exit("0:0"), (0, None));
        assert_eq!(split_exit("2:0"), (2, None));
        assert_eq!(split_exit("0:15"), (0, Some(15)));
        assert_eq!(split_exit("137:9"), (137, Some(9)));
    }

    #[test]
    fn test_oom_takes_peak_over_steps() {
        let a = analyze(
            "1|OUT_OF_MEMORY|0:125||4000M|00:12:00|02:00:00|node07\n\
             1.batch|OUT_OF_MEMORY|0:125|4100000K||00:12:00||node07\n\
             1.extern|COMPLETED|0:0|1000K||00:12:00||node07\n",
        );
        assert_eq!(a.peak_rss_mb, Some(4004));
        assert_eq!(a.requested_mem_mb, Some(4000));
        assert_eq!(
            a.mode,
            FailureMode::OutOfMemory {
                peak_mb: 4004,
                requested_mb: 4000,
                suggested_mb: 6144,
            }
        );
        assert!(a.suggestion.ends_with("csub --memory 6G"));
    }

    #[test]
    fn test_exit_137_is_oom() {
        let a = analyze("1|FAILED|137:0||2G|00:05:00|01:00:00|node02\n");
        assert!(matches!(a.mode, FailureMode::OutOfMemory { requested_mb: 2048, .. }));
    }

    #[test]
    fn test_time_limit() {
        let a = analyze("1|TIMEOUT|0:0||1G|01:00:10|01:00:00|node01\n");
        assert_eq!(a.elapsed_secs, Some(3610));
        assert_eq!(
            a.mode,
            FailureMode::Timeout {
                elapsed_secs: 3610,
                limit_secs: 3600,
                suggested_secs: 7200,
            }
        );
        assert!(a.suggestion.ends_with("csub --runtime 02:00:00"));
    }

    #[test]
    fn test_cancelled() {
        let a = analyze("1|CANCELLED by 1001|0:0||1G|00:01:00|01:00:00|node01\n");
        assert_eq!(a.mode, FailureMode::Cancelled { by: Some("1001".to_string()) });
        assert_eq!(a.explanation, "Job was cancelled by 1001");
        assert_eq!(a.state, "CANCELLED by 1001");

        let a = analyze("1|CANCELLED|0:0||1G|00:01:00|01:00:00|node01\n");
        assert_eq!(a.mode, FailureMode::Cancelled { by: None });
    }

    #[test]
    fn test_exit_codes_and_signals() {
        let a = analyze("1|FAILED|127:0||1G|00:00:01|01:00:00|node01\n");
        assert_eq!(a.mode, FailureMode::ExitCode { code: 127, signal: None });
        assert_eq!(a.explanation, "Job failed with exit code 127 (command not found)");

        let a = analyze("1|FAILED|0:11||1G|00:00:01|01:00:00|node01\n");
        assert_eq!(a.mode, FailureMode::ExitCode { code: 0, signal: Some(11) });
        assert!(a.explanation.contains("SIGSEGV"));
    }

    #[test]
    fn test_node_failure() {
        let a = analyze("1|NODE_FAIL|0:0||1G|00:10:00|01:00:00|node13\n");
        assert_eq!(a.mode, FailureMode::NodeFailure { node: Some("node13".to_string()) });
        assert_eq!(a.explanation, "Node node13 failed");
    }

    #[test]
    fn test_not_failed_and_unknown() {
        let a = analyze("1|COMPLETED|0:0||1G|00:10:00|01:00:00|node13\n");
        assert_eq!(a.mode, FailureMode::NotFailed { state: "COMPLETED".to_string() });

        let a = analyze("1|PREEMPTED|0:0||1G|00:10:00|01:00:00|node13\n");
        assert_eq!(a.mode, FailureMode::Unknown { state: "PREEMPTED".to_string() });
    }

    #[test]
    fn test_bad_input() {
        assert!(matches!(
            parse_failure_output("1", "1|FAILED\n"),
            Err(FailureError::Malformed(_))
        ));
        // Only step records, no allocation
        assert!(matches!(
            parse_failure_output("1", "1.batch|FAILED|1:0||1G|00:00:01||n\n"),
            Err(FailureError::NotFound(_))
        ));
    }
}
