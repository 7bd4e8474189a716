//! Classify job log files as succeeded, failed or unfinished.
//!
//! LSF appends a job report to the output file ending in "Successfully
//! completed." or "Exited with exit code N.", preceded by a `TERM_*`
//! reason when LSF itself killed the job. The local backend writes the
//! same completion lines. SLURM writes `slurmstepd` error lines for
//! cancellations, time limits and OOM kills.

use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io;

use crate::failure::FailureKind;

/// Result of scanning one log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Success,
    Failed { kind: FailureKind, detail: String },
    /// No completion marker yet (still running, or killed without a trace)
    Incomplete,
}

impl LogOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

static EXIT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Exited with exit code (\d+)\.").expect("valid regex"));
static EXIT_SIGNAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Exited by signal (\d+)\.").expect("valid regex"));
static TERM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bTERM_[A-Z_]+").expect("valid regex"));

/// Kind implied by an LSF termination reason. Other reasons leave the
/// exit code as the explanation.
fn term_kind(reason: &str) -> Option<FailureKind> {
    match reason {
        "TERM_MEMLIMIT" => Some(FailureKind::OutOfMemory),
        "TERM_RUNLIMIT" => Some(FailureKind::Timeout),
        "TERM_OWNER" | "TERM_ADMIN" | "TERM_FORCE_OWNER" | "TERM_FORCE_ADMIN" => {
            Some(FailureKind::Killed)
        }
        "TERM_HOST" | "TERM_LOAD" => Some(FailureKind::HostFailure),
        _ => None,
    }
}

/// Outcome of an exit line, refined by the `TERM_*` line before it.
fn exited(code: i32, line: &str, term: Option<(Option<FailureKind>, String)>) -> LogOutcome {
    match term {
        Some((kind, reason)) => failed(
            kind.unwrap_or(FailureKind::ExitCode(code)),
            &format!("{}; {}", reason, line.trim()),
        ),
        None => failed(FailureKind::ExitCode(code), line),
    }
}

fn failed(kind: FailureKind, detail: &str) -> LogOutcome {
    LogOutcome::Failed {
        kind,
        detail: detail.trim().to_string(),
    }
}

/// Classify the text of a job log.
///
/// The last completion marker wins, so logs appended to by resubmitted
/// jobs report the latest attempt.
pub fn scan_log_content(content: &str) -> LogOutcome {
    let mut outcome: Option<LogOutcome> = None;
    let mut term_reason: Option<(Option<FailureKind>, String)> = None;
    let mut crash: Option<String> = None;

    for line in content.lines() {
        if line.contains("Successfully completed.") {
            outcome = Some(LogOutcome::Success);
            term_reason = None;
            crash = None;
        } else if let Some(caps) = EXIT_CODE_RE.captures(line) {
            let code: i32 = caps[1].parse().unwrap_or(1);
            outcome = Some(exited(code, line, term_reason.take()));
        } else if let Some(caps) = EXIT_SIGNAL_RE.captures(line) {
            let signal: i32 = caps[1].parse().unwrap_or(0);
            outcome = Some(exited(128 + signal, line, term_reason.take()));
        } else if let Some(m) = TERM_RE.find(line) {
            term_reason = Some((term_kind(m.as_str()), line.trim().to_string()));
        } else if line.contains("***") && line.contains("CANCELLED AT") {
            let kind = if line.contains("DUE TO TIME LIMIT") {
                FailureKind::Timeout
            } else {
                FailureKind::Killed
            };
            outcome = Some(failed(kind, line));
        } else if line.contains("oom-kill")
            || line.contains("Exceeded job memory limit")
            || line.contains("OUT_OF_MEMORY")
        {
            outcome = Some(failed(FailureKind::OutOfMemory, line));
        } else if line.starts_with("Traceback (most recent call last)")
            || line.contains("Segmentation fault")
        {
            crash = Some(line.trim().to_string());
        }
    }

    match (outcome, crash) {
        (Some(outcome), _) => outcome,
        (None, Some(detail)) => failed(FailureKind::Unknown, &detail),
        (None, None) => LogOutcome::Incomplete,
    }
}

/// Read and classify a log file. Invalid UTF-8 is replaced, not rejected.
pub fn scan_log_file(path: &Utf8Path) -> io::Result<LogOutcome> {
    let bytes = fs::read(path)?;
    Ok(scan_log_content(&String::from_utf8_lossy(&bytes)))
}

fn walk(dir: &Utf8Path, extension: &str, found: &mut BTreeSet<Utf8PathBuf>) -> io::Result<()> {
    for entry in dir.read_dir_utf8()? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(path, extension, found)?;
        } else if path.extension() == Some(extension) {
            found.insert(path.to_path_buf());
        }
    }
    Ok(())
}

/// Expand paths into log files.
///
/// Files are taken as given; directories are searched recursively for
/// files with `extension`. The result is sorted and free of duplicates.
pub fn collect_logs(paths: &[Utf8PathBuf], extension: &str) -> io::Result<Vec<Utf8PathBuf>> {
    let extension = extension.trim_start_matches('.');
    let mut found = BTreeSet::new();
    for path in paths {
        if path.is_dir() {
            walk(path, extension, &mut found)?;
        } else if path.exists() {
            found.insert(path.clone());
        } else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: no such file or directory", path),
            ));
        }
    }
    Ok(found.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LSF_MEMLIMIT: &str = "\
Sender: LSF System <lsfadmin@node17>
Subject: Job 1001: <fit_tile_0001> in cluster <cl> Exited

TERM_MEMLIMIT: job killed after reaching LSF memory usage limit.
Exited with exit code 130.

Resource usage summary:
    CPU time :   1800.00 sec.
";

    #[test]
    fn test_lsf_success() {
        let log = "loading data\nSuccessfully completed.\n\nResource usage summary:\n";
        assert_eq!(scan_log_content(log), LogOutcome::Success);
    }

    #[test]
    fn test_lsf_memlimit() {
        match scan_log_content(LSF_MEMLIMIT) {
            LogOutcome::Failed { kind, detail } => {
                assert_eq!(kind, FailureKind::OutOfMemory);
                assert!(detail.starts_with("TERM_MEMLIMIT"));
                assert!(detail.ends_with("Exited with exit code 130."));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_other_term_reason_keeps_exit_code() {
        let log = "TERM_CPULIMIT: job killed after reaching LSF CPU usage limit.\nExited with exit code 5.\n";
        assert_eq!(
            scan_log_content(log),
            LogOutcome::Failed {
                kind: FailureKind::ExitCode(5),
                detail: "TERM_CPULIMIT: job killed after reaching LSF CPU usage limit.; Exited with exit code 5."
                    .to_string()
            }
        );

        let log = "TERM_SWAP: job killed after reaching LSF swap usage limit.\nExited by signal 9.\n";
        assert!(matches!(
            scan_log_content(log),
            LogOutcome::Failed {
                kind: FailureKind::ExitCode(137),
                ..
            }
        ));

        let log = "TERM_OWNER: job killed by owner.\nExited by signal 15.\n";
        assert!(matches!(
            scan_log_content(log),
            LogOutcome::Failed {
                kind: FailureKind::Killed,
                ..
            }
        ));
    }

    #[test]
    fn test_plain_exit_code() {
        assert_eq!(
            scan_log_content("oops\nExited with exit code 2.\n"),
            LogOutcome::Failed {
                kind: FailureKind::ExitCode(2),
                detail: "Exited with exit code 2.".to_string()
            }
        );
    }

    #[test]
    fn test_last_marker_wins() {
        let log = "Exited with exit code 1.\n--- resubmitted ---\nSuccessfully completed.\n";
        assert_eq!(scan_log_content(log), LogOutcome::Success);

        let log = "Successfully completed.\nTERM_RUNLIMIT: job killed after reaching LSF run time limit.\nExited with exit code 140.\n";
        assert!(matches!(
            scan_log_content(log),
            LogOutcome::Failed {
                kind: FailureKind::Timeout,
                ..
            }
        ));
    }

    #[test]
    fn test_slurm_markers() {
        let log = "slurmstepd: error: *** JOB 123 ON node01 CANCELLED AT 2024-01-15T12:00:00 DUE TO TIME LIMIT ***\n";
        assert!(matches!(
            scan_log_content(log),
            LogOutcome::Failed {
                kind: FailureKind::Timeout,
                ..
            }
        ));

        let log = "slurmstepd: error: *** JOB 124 ON node01 CANCELLED AT 2024-01-15T12:00:00 ***\n";
        assert!(matches!(
            scan_log_content(log),
            LogOutcome::Failed {
                kind: FailureKind::Killed,
                ..
            }
        ));

        let log = "slurmstepd: error: Detected 1 oom-kill event(s) in StepId=125.batch.\n";
        assert!(matches!(
            scan_log_content(log),
            LogOutcome::Failed {
                kind: FailureKind::OutOfMemory,
                ..
            }
        ));
    }

    #[test]
    fn test_crash_without_marker() {
        let log = "Traceback (most recent call last):\n  File \"fit.py\", line 3\nValueError: bad\n";
        assert!(matches!(
            scan_log_content(log),
            LogOutcome::Failed {
                kind: FailureKind::Unknown,
                ..
            }
        ));
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(scan_log_content("step 1\nstep 2\n"), LogOutcome::Incomplete);
        assert_eq!(scan_log_content(""), LogOutcome::Incomplete);
    }

    #[test]
    fn test_scan_log_file_lossy() {
        let temp = TempDir::new().unwrap();
        let path = Utf8Path::from_path(temp.path()).unwrap().join("a.log");
        fs::write(&path, b"\xff\xfe binary\nExited with exit code 3.\n").unwrap();
        assert!(matches!(
            scan_log_file(&path).unwrap(),
            LogOutcome::Failed {
                kind: FailureKind::ExitCode(3),
                ..
            }
        ));
    }

    #[test]
    fn test_collect_logs() {
        let temp = TempDir::new().unwrap();
        let root = Utf8Path::from_path(temp.path()).unwrap();
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::write(root.join("b.log"), "").unwrap();
        fs::write(root.join("sub/a.log"), "").unwrap();
        fs::write(root.join("sub/deeper/c.log"), "").unwrap();
        fs::write(root.join("sub/notes.txt"), "").unwrap();

        let logs = collect_logs(&[root.to_path_buf(), root.join("b.log")], "log").unwrap();
        assert_eq!(
            logs,
            vec![
                root.join("b.log"),
                root.join("sub/a.log"),
                root.join("sub/deeper/c.log"),
            ]
        );

        let txt = collect_logs(&[root.join("sub/notes.txt")], ".txt").unwrap();
        assert_eq!(txt, vec![root.join("sub/notes.txt")]);

        assert!(collect_logs(&[root.join("missing")], "log").is_err());
    }
}
