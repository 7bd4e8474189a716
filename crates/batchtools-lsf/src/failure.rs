//! Why did an LSF job fail?
//!
//! `bhist -l` records the exit, the TERM_* reason LSF gave for it, the
//! limits in force and the peak memory. Limits are printed as small tables:
//!
//! ```text
//!  RUNLIMIT
//!  60.0 min of login01
//! ```

use crate::bhist::parse_bhist_long_output;
use crate::types::{LsfJob, LsfJobState};
use batchtools_parsers::{
    MemoryFormat, format_duration, format_duration_lsf, format_memory, parse_memory_mb,
    run_command_allow_failure, suggest_memory_mb, suggest_runtime_secs,
};
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum FailureError {
    #[error("bhist query failed: {0}")]
    Bhist(String),
    #[error("No history for job {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureMode {
    OutOfMemory {
        peak_mb: u64,
        limit_mb: u64,
        suggested_mb: u64,
    },
    Timeout {
        run_secs: u64,
        limit_secs: u64,
        suggested_secs: u64,
    },
    ExitCode { code: i32 },
    /// TERM_OWNER or TERM_ADMIN
    Killed { by_admin: bool },
    /// TERM_HOST or TERM_LOAD
    HostFailure { host: Option<String> },
    NotFailed,
    Unknown { reason: String },
}

#[derive(Debug, Clone)]
pub struct FailureAnalysis {
    pub job_id: String,
    pub mode: FailureMode,
    pub explanation: String,
    pub suggestion: String,
    /// TERM_* reason, or the exit line when LSF gave none
    pub reason: String,
    pub max_mem_mb: Option<u64>,
    pub mem_limit_mb: Option<u64>,
    pub run_secs: Option<u64>,
    pub run_limit_secs: Option<u64>,
}

pub async fn analyze_failure(job_id: &str) -> Result<FailureAnalysis, FailureError> {
    let mut cmd = Command::new("bhist");
    cmd.args(["-l", job_id]);

    let stdout = run_command_allow_failure(&mut cmd, "bhist")
        .await
        .map_err(|e| FailureError::Bhist(e.to_string()))?;
    if stdout.trim().is_empty() || stdout.contains("No matching job found") {
        return Err(FailureError::NotFound(job_id.to_string()));
    }
    parse_bhist_output(job_id, &stdout)
}

/// Limits and usage read from the raw (unjoined) bhist lines.
#[derive(Debug, Default)]
struct Usage {
    run_secs: Option<u64>,
    run_limit_secs: Option<u64>,
    mem_limit_mb: Option<u64>,
}

impl Usage {
    fn from_lines(lines: &[&str]) -> Self {
        Self {
            run_secs: run_column(lines),
            run_limit_secs: table_value(lines, "RUNLIMIT").and_then(parse_runlimit),
            mem_limit_mb: table_value(lines, "MEMLIMIT")
                .and_then(|v| parse_memory_mb(v, MemoryFormat::Lsf)),
        }
    }
}

/// First non-blank line below a one-word table header.
fn table_value<'a>(lines: &[&'a str], header: &str) -> Option<&'a str> {
    let at = lines.iter().position(|l| l.split_whitespace().next() == Some(header))?;
    lines[at + 1..].iter().map(|l| l.trim()).find(|l| !l.is_empty())
}

/// "720.0 min of hostA" in seconds.
fn parse_runlimit(value: &str) -> Option<u64> {
    let mut words = value.split_whitespace();
    let amount: f64 = words.next()?.parse().ok()?;
    let scale = match words.next() {
        None | Some("min") => 60.0,
        Some("sec" | "seconds") => 1.0,
        Some("hour" | "hours") => 3600.0,
        Some(_) => return None,
    };
    Some((amount * scale) as u64)
}

/// RUN column of "Summary of time in seconds spent in various states".
fn run_column(lines: &[&str]) -> Option<u64> {
    lines.windows(2).find_map(|pair| {
        let header: Vec<&str> = pair[0].split_whitespace().collect();
        if header.first() != Some(&"PEND") {
            return None;
        }
        let col = header.iter().position(|&h| h == "RUN")?;
        pair[1].split_whitespace().nth(col)?.parse().ok()
    })
}

fn classify(job: &LsfJob, usage: &Usage) -> (FailureMode, String) {
    let LsfJobState::Exit { code, term } = &job.state else {
        return match &job.state {
            LsfJobState::Other(state) => (
                FailureMode::Unknown {
                    reason: state.clone(),
                },
                state.clone(),
            ),
            _ => (FailureMode::NotFailed, String::new()),
        };
    };

    let oom = || {
        let peak = job.max_mem_mb.unwrap_or(0);
        let limit = usage.mem_limit_mb.unwrap_or(0);
        FailureMode::OutOfMemory {
            peak_mb: peak,
            limit_mb: limit,
            suggested_mb: suggest_memory_mb(peak, limit),
        }
    };

    let Some(term) = term else {
        let mode = if *code == 137 {
            oom()
        } else {
            FailureMode::ExitCode { code: *code }
        };
        return (mode, format!("Exited with exit code {}", code));
    };

    // "TERM_MEMLIMIT: job killed after ..." -> "TERM_MEMLIMIT"
    let tag = term.split(':').next().unwrap_or_default().trim();
    let mode = match tag {
        "TERM_MEMLIMIT" => oom(),
        "TERM_RUNLIMIT" => {
            let run = usage.run_secs.unwrap_or(0);
            let limit = usage.run_limit_secs.unwrap_or(0);
            FailureMode::Timeout {
                run_secs: run,
                limit_secs: limit,
                suggested_secs: suggest_runtime_secs(run, limit),
            }
        }
        "TERM_OWNER" => FailureMode::Killed { by_admin: false },
        "TERM_ADMIN" => FailureMode::Killed { by_admin: true },
        "TERM_HOST" | "TERM_LOAD" => FailureMode::HostFailure {
            host: job.hosts.clone(),
        },
        _ if *code == 137 => oom(),
        _ if *code != 0 => FailureMode::ExitCode { code: *code },
        _ => FailureMode::Unknown {
            reason: term.clone(),
        },
    };
    (mode, term.clone())
}

fn explain(mode: &FailureMode) -> String {
    match mode {
        FailureMode::OutOfMemory {
            peak_mb, limit_mb, ..
        } => format!(
            "Job reached its memory limit: peaked at {:.1} GB, limit {:.1} GB",
            *peak_mb as f64 / 1024.0,
            *limit_mb as f64 / 1024.0
        ),
        FailureMode::Timeout {
            run_secs,
            limit_secs,
            ..
        } => format!(
            "Job reached its run limit after {} (limit {})",
            format_duration(*run_secs),
            format_duration(*limit_secs)
        ),
        FailureMode::ExitCode { code: 127 } => {
            "Job failed with exit code 127 (command not found)".to_string()
        }
        FailureMode::ExitCode { code } => format!("Job failed with exit code {}", code),
        FailureMode::Killed { by_admin: true } => "Job was killed by an administrator".to_string(),
        FailureMode::Killed { by_admin: false } => "Job was killed by its owner".to_string(),
        FailureMode::HostFailure { host } => match host {
            Some(host) => format!("Execution host {} failed", host),
            None => "The execution host failed".to_string(),
        },
        FailureMode::NotFailed => "Job has not failed".to_string(),
        FailureMode::Unknown { reason } => format!("Job failed: {}", reason),
    }
}

fn suggest(mode: &FailureMode) -> String {
    match mode {
        FailureMode::OutOfMemory { suggested_mb, .. } => format!(
            "Resubmit with more memory, e.g. csub --memory {}",
            format_memory(*suggested_mb)
        ),
        FailureMode::Timeout { suggested_secs, .. } => format!(
            "Resubmit to a longer queue or with csub --runtime {}",
            format_duration_lsf(*suggested_secs)
        ),
        FailureMode::ExitCode { .. } => {
            "Look for the error in the job's log (cfail -r <logdir>).".to_string()
        }
        FailureMode::Killed { .. } => {
            "Check whether the kill was intended or caused by a dependency.".to_string()
        }
        FailureMode::HostFailure { .. } => {
            "Resubmit; report the host to the administrators if it keeps happening.".to_string()
        }
        FailureMode::NotFailed => "Nothing to do.".to_string(),
        FailureMode::Unknown { .. } => "Inspect `bhist -l <id>` for details.".to_string(),
    }
}

fn parse_bhist_output(job_id: &str, output: &str) -> Result<FailureAnalysis, FailureError> {
    let job = parse_bhist_long_output(output)
        .into_iter()
        .find(|j| j.id == job_id)
        .ok_or_else(|| FailureError::NotFound(job_id.to_string()))?;

    let lines: Vec<&str> = output.lines().collect();
    let usage = Usage::from_lines(&lines);
    let (mode, reason) = classify(&job, &usage);

    Ok(FailureAnalysis {
        job_id: job.id,
        explanation: explain(&mode),
        suggestion: suggest(&mode),
        mode,
        reason,
        max_mem_mb: job.max_mem_mb,
        mem_limit_mb: usage.mem_limit_mb,
        run_secs: usage.run_secs,
        run_limit_secs: usage.run_limit_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMLIMIT: &str = "\
Job <2001>, Job Name <sim>, User <alice>, Project <default>, Command <./sim>
Mon Dec 18 10:30:15: Submitted from host <login01>, to Queue <long>;

 MEMLIMIT
      4 G
Mon Dec 18 10:31:00: Dispatched to <node17>;
Mon Dec 18 11:02:45: Exited with exit code 130. The CPU time used is 10.0 seconds;
Mon Dec 18 11:02:45: Completed <exit>; TERM_MEMLIMIT: job killed after reaching LSF memory usage limit;

MAX MEM: 4.5 Gbytes;  AVG MEM: 3 Gbytes

Summary of time in seconds spent in various states by  Mon Dec 18 11:02:45
  PEND     PSUSP    RUN      USUSP    SSUSP    UNKWN    TOTAL
  45       0        1905     0        0        0        1950
";

    const RUNLIMIT: &str = "\
Job <2002>, Job Name <sim>, User <alice>, Project <default>, Command <./sim>
Mon Dec 18 10:30:15: Submitted from host <login01>, to Queue <short>;

 RUNLIMIT
 60.0 min of login01
Mon Dec 18 10:31:00: Dispatched to <node17>;
Mon Dec 18 11:31:05: Exited with exit code 140. The CPU time used is 3600.0 seconds;
Mon Dec 18 11:31:05: Completed <exit>; TERM_RUNLIMIT: job killed after reaching LSF run time limit;

Summary of time in seconds spent in various states by  Mon Dec 18 11:31:05
  PEND     PSUSP    RUN      USUSP    SSUSP    UNKWN    TOTAL
  45       0        3605     0        0        0        3650
";

    fn history(id: &str, last_event: &str) -> String {
        format!(
            "Job <{id}>, Job Name <x>\n\
             Mon Dec 18 10:30:16: Submitted from host <h>, to Queue <q>;\n\
             Mon Dec 18 10:50:00: {last_event}\n"
        )
    }

    #[test]
    fn test_memlimit() {
        let a = parse_bhist_output("2001", MEMLIMIT).unwrap();
        assert_eq!((a.max_mem_mb, a.mem_limit_mb), (Some(4608), Some(4096)));
        assert_eq!(a.run_secs, Some(1905));
        assert_eq!(
            a.mode,
            FailureMode::OutOfMemory {
                peak_mb: 4608,
                limit_mb: 4096,
                suggested_mb: 7168,
            }
        );
        assert!(a.reason.starts_with("TERM_MEMLIMIT"));
        assert!(a.suggestion.ends_with("csub --memory 7G"));
    }

    #[test]
    fn test_runlimit() {
        let a = parse_bhist_output("2002", RUNLIMIT).unwrap();
        assert_eq!(a.run_limit_secs, Some(3600));
        assert_eq!(
            a.mode,
            FailureMode::Timeout {
                run_secs: 3605,
                limit_secs: 3600,
                suggested_secs: 7200,
            }
        );
        assert!(a.suggestion.ends_with("csub --runtime 2:00"));
    }

    #[test]
    fn test_exit_without_reason() {
        let out = history("3", "Exited with exit code 2. The CPU time used is 1 seconds;");
        let a = parse_bhist_output("3", &out).unwrap();
        assert_eq!(a.mode, FailureMode::ExitCode { code: 2 });
        assert_eq!(a.reason, "Exited with exit code 2");

        let out = history("6", "Exited by signal 9. The CPU time used is 1 seconds;");
        let a = parse_bhist_output("6", &out).unwrap();
        assert!(matches!(a.mode, FailureMode::OutOfMemory { .. }));
    }

    #[test]
    fn test_done_is_not_failed() {
        let out = history("4", "Done successfully. The CPU time used is 1 seconds;");
        let a = parse_bhist_output("4", &out).unwrap();
        assert_eq!(a.mode, FailureMode::NotFailed);
        assert_eq!(a.explanation, "Job has not failed");
    }

    #[test]
    fn test_killed_by_owner() {
        let out = format!(
            "{}Mon Dec 18 10:50:00: Completed <exit>; TERM_OWNER: job killed by owner;\n",
            history("5", "Exited with exit code 130.")
        );
        let a = parse_bhist_output("5", &out).unwrap();
        assert_eq!(a.mode, FailureMode::Killed { by_admin: false });
        assert_eq!(a.explanation, "Job was killed by its owner");
    }

    #[test]
    fn test_unknown_job() {
        assert!(matches!(
            parse_bhist_output("99", "Job <4>, Job Name <x>\n"),
            Err(FailureError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_runlimit() {
        assert_eq!(parse_runlimit("720.0 min of hostA"), Some(43_200));
        assert_eq!(parse_runlimit("30"), Some(1800));
        assert_eq!(parse_runlimit("2 hours"), Some(7200));
        assert_eq!(parse_runlimit("n/a"), None);
    }
}
