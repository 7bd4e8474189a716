//! Records built from bjobs and bhist output.

use chrono::{DateTime, Utc};

/// Where an LSF job is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LsfJobState {
    Pend,
    Run,
    /// PSUSP, USUSP or SSUSP
    Suspended,
    Done,
    /// `term` is the TERM_* reason when bhist recorded one
    Exit { code: i32, term: Option<String> },
    Zombie,
    Other(String),
}

impl From<&str> for LsfJobState {
    /// STAT column of bjobs. The exit code of an EXIT job is only known
    /// from bhist, so 1 stands in for it.
    fn from(stat: &str) -> Self {
        let stat = stat.trim().to_ascii_uppercase();
        match stat.as_str() {
            "PEND" => Self::Pend,
            "RUN" => Self::Run,
            "PSUSP" | "USUSP" | "SSUSP" => Self::Suspended,
            "DONE" => Self::Done,
            "EXIT" => Self::Exit { code: 1, term: None },
            "ZOMBI" => Self::Zombie,
            _ => Self::Other(stat),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LsfJob {
    pub id: String,
    pub name: String,
    pub state: LsfJobState,
    pub queue: Option<String>,
    pub submitted: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    /// EXEC_HOST, e.g. "4*node01:2*node02"
    pub hosts: Option<String>,
    /// MAX MEM reported by bhist
    pub max_mem_mb: Option<u64>,
}

impl LsfJob {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            state: LsfJobState::Other(String::new()),
            queue: None,
            submitted: None,
            started: None,
            finished: None,
            hosts: None,
            max_mem_mb: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_column() {
        assert_eq!(LsfJobState::from("PEND"), LsfJobState::Pend);
        assert_eq!(LsfJobState::from(" run "), LsfJobState::Run);
        assert_eq!(LsfJobState::from("USUSP"), LsfJobState::Suspended);
        assert_eq!(
            LsfJobState::from("EXIT"),
            LsfJobState::Exit { code: 1, term: None }
        );
        assert_eq!(LsfJobState::from("wait"), LsfJobState::Other("WAIT".to_string()));
    }
}
