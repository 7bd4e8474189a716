//! Records built from squeue and sacct output.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlurmJobState {
    Pending,
    Running,
    Suspended,
    Completed,
    Failed { exit_code: i32 },
    NodeFail,
    Cancelled,
    Timeout,
    OutOfMemory,
    Other(String),
}

/// Long name of a compact state code as printed by `squeue -t`/`%t`.
fn long_state(code: &str) -> &str {
    match code {
        "PD" => "PENDING",
        "R" => "RUNNING",
        "CG" => "COMPLETING",
        "CF" => "CONFIGURING",
        "RQ" => "REQUEUED",
        "S" => "SUSPENDED",
        "ST" => "STOPPED",
        "CD" => "COMPLETED",
        "F" => "FAILED",
        "NF" => "NODE_FAIL",
        "CA" => "CANCELLED",
        "TO" => "TIMEOUT",
        "DL" => "DEADLINE",
        "OOM" => "OUT_OF_MEMORY",
        other => other,
    }
}

impl SlurmJobState {
    /// A squeue or sacct state. sacct may append detail ("CANCELLED by
    /// 1001") or a `+` marking a truncated name; both are ignored.
    pub fn parse(state: &str, exit_code: i32) -> Self {
        let word = state
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_end_matches('+')
            .to_ascii_uppercase();
        match long_state(&word) {
            "PENDING" | "REQUEUED" => Self::Pending,
            "RUNNING" | "COMPLETING" | "CONFIGURING" => Self::Running,
            "SUSPENDED" | "STOPPED" => Self::Suspended,
            "COMPLETED" => Self::Completed,
            // A FAILED job with exit code 0 was killed by a signal
            "FAILED" => Self::Failed {
                exit_code: exit_code.max(1),
            },
            "NODE_FAIL" => Self::NodeFail,
            "CANCELLED" => Self::Cancelled,
            "TIMEOUT" | "DEADLINE" => Self::Timeout,
            "OUT_OF_MEMORY" => Self::OutOfMemory,
            _ => Self::Other(word),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlurmJob {
    pub id: String,
    pub name: String,
    pub state: SlurmJobState,
    pub partition: Option<String>,
    pub submitted: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    /// Compressed node list, e.g. "node[01-04]"
    pub nodes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_and_compact_states() {
        for (long, short) in [("RUNNING", "R"), ("PENDING", "PD"), ("TIMEOUT", "TO")] {
            assert_eq!(SlurmJobState::parse(long, 0), SlurmJobState::parse(short, 0));
        }
        assert_eq!(SlurmJobState::parse("completing", 0), SlurmJobState::Running);
        assert_eq!(SlurmJobState::parse("NF", 0), SlurmJobState::NodeFail);
    }

    #[test]
    fn test_sacct_decorations() {
        assert_eq!(
            SlurmJobState::parse("CANCELLED by 12345", 0),
            SlurmJobState::Cancelled
        );
        assert_eq!(SlurmJobState::parse("CANCELLED+", 0), SlurmJobState::Cancelled);
    }

    #[test]
    fn test_failed_exit_code() {
        assert_eq!(
            SlurmJobState::parse("FAILED", 2),
            SlurmJobState::Failed { exit_code: 2 }
        );
        assert_eq!(
            SlurmJobState::parse("FAILED", 0),
            SlurmJobState::Failed { exit_code: 1 }
        );
        assert_eq!(
            SlurmJobState::parse("BOOT_FAIL", 0),
            SlurmJobState::Other("BOOT_FAIL".to_string())
        );
    }
}
