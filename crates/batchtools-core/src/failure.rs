//! Scheduler-neutral failure reports.

use serde::Serialize;
use std::fmt;

use batchtools_lsf::FailureMode as LsfMode;
use batchtools_slurm::FailureMode as SlurmMode;

use crate::logscan::LogOutcome;

/// Why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    OutOfMemory,
    Timeout,
    ExitCode(i32),
    /// Cancelled or killed by a user or admin
    Killed,
    HostFailure,
    Unknown,
}

impl FailureKind {
    /// Generic advice for a failure of this kind.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::OutOfMemory => "Resubmit with more memory (csub --memory).",
            Self::Timeout => "Resubmit with a longer run limit (csub --runtime) or to a longer queue.",
            Self::ExitCode(137) => {
                "This is likely an out-of-memory error. Try increasing memory allocation."
            }
            Self::ExitCode(_) | Self::Unknown => "Check the job's log file for error details.",
            Self::Killed => "Consider if this was intentional or due to dependency failure.",
            Self::HostFailure => "Re-run the job. If persistent, contact cluster admin.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::Timeout => f.write_str("run limit exceeded"),
            Self::ExitCode(code) => write!(f, "exit code {}", code),
            Self::Killed => f.write_str("killed"),
            Self::HostFailure => f.write_str("host failure"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Failure analysis of one job, from any batch system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub job_id: String,
    /// `None` when the job has not failed
    pub kind: Option<FailureKind>,
    pub explanation: String,
    pub suggestion: String,
}

impl From<batchtools_slurm::FailureAnalysis> for FailureReport {
    fn from(analysis: batchtools_slurm::FailureAnalysis) -> Self {
        let kind = match analysis.mode {
            SlurmMode::OutOfMemory { .. } => Some(FailureKind::OutOfMemory),
            SlurmMode::Timeout { .. } => Some(FailureKind::Timeout),
            SlurmMode::ExitCode { code, .. } => Some(FailureKind::ExitCode(code)),
            SlurmMode::Cancelled { .. } => Some(FailureKind::Killed),
            SlurmMode::NodeFailure { .. } => Some(FailureKind::HostFailure),
            SlurmMode::NotFailed { .. } => None,
            SlurmMode::Unknown { .. } => Some(FailureKind::Unknown),
        };
        Self {
            job_id: analysis.job_id,
            kind,
            explanation: analysis.explanation,
            suggestion: analysis.suggestion,
        }
    }
}

impl From<batchtools_lsf::FailureAnalysis> for FailureReport {
    fn from(analysis: batchtools_lsf::FailureAnalysis) -> Self {
        let kind = match analysis.mode {
            LsfMode::OutOfMemory { .. } => Some(FailureKind::OutOfMemory),
            LsfMode::Timeout { .. } => Some(FailureKind::Timeout),
            LsfMode::ExitCode { code } => Some(FailureKind::ExitCode(code)),
            LsfMode::Killed { .. } => Some(FailureKind::Killed),
            LsfMode::HostFailure { .. } => Some(FailureKind::HostFailure),
            LsfMode::NotFailed => None,
            LsfMode::Unknown { .. } => Some(FailureKind::Unknown),
        };
        Self {
            job_id: analysis.job_id,
            kind,
            explanation: analysis.explanation,
            suggestion: analysis.suggestion,
        }
    }
}

impl FailureReport {
    /// Report for a job whose only evidence is its log file.
    pub fn from_log(job_id: &str, outcome: &LogOutcome) -> Self {
        let (kind, explanation, suggestion) = match outcome {
            LogOutcome::Failed { kind, detail } => (
                Some(*kind),
                format!("Job failed ({}): {}", kind, detail),
                kind.suggestion().to_string(),
            ),
            LogOutcome::Success => (
                None,
                "Job completed successfully".to_string(),
                "Nothing to do.".to_string(),
            ),
            LogOutcome::Incomplete => (
                None,
                "Job has not finished".to_string(),
                "Nothing to do.".to_string(),
            ),
        };
        Self {
            job_id: job_id.to_string(),
            kind,
            explanation,
            suggestion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(FailureKind::ExitCode(2).to_string(), "exit code 2");
        assert_eq!(FailureKind::OutOfMemory.to_string(), "out of memory");
    }

    #[test]
    fn test_from_lsf_analysis() {
        let analysis = batchtools_lsf::FailureAnalysis {
            job_id: "7".to_string(),
            mode: LsfMode::Killed { by_admin: false },
            explanation: "Job was killed by its owner".to_string(),
            suggestion: "s".to_string(),
            reason: "TERM_OWNER".to_string(),
            max_mem_mb: None,
            mem_limit_mb: None,
            run_secs: None,
            run_limit_secs: None,
        };
        let report = FailureReport::from(analysis);
        assert_eq!(report.kind, Some(FailureKind::Killed));
        assert_eq!(report.explanation, "Job was killed by its owner");
    }

    #[test]
    fn test_from_slurm_analysis_not_failed() {
        let analysis = batchtools_slurm::FailureAnalysis {
            job_id: "8".to_string(),
            mode: SlurmMode::NotFailed {
                state: "RUNNING".to_string(),
            },
            explanation: String::new(),
            suggestion: String::new(),
            state: "RUNNING".to_string(),
            peak_rss_mb: None,
            requested_mem_mb: None,
            elapsed_secs: None,
            limit_secs: None,
        };
        assert_eq!(FailureReport::from(analysis).kind, None);
    }

    #[test]
    fn test_from_log() {
        let outcome = LogOutcome::Failed {
            kind: FailureKind::Timeout,
            detail: "TERM_RUNLIMIT".to_string(),
        };
        let report = FailureReport::from_log("12", &outcome);
        assert_eq!(report.kind, Some(FailureKind::Timeout));
        assert!(report.explanation.contains("run limit exceeded"));
        assert!(report.suggestion.contains("--runtime"));

        assert_eq!(FailureReport::from_log("12", &LogOutcome::Success).kind, None);
    }
}
