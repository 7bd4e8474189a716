//! Batch system selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use std::str::FromStr;
use tokio::process::Command;

use crate::error::BatchError;

/// Where jobs run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchSystem {
    /// Background processes on this host
    Local,
    Lsf,
    Slurm,
}

impl BatchSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Lsf => "lsf",
            Self::Slurm => "slurm",
        }
    }

    /// Detect which scheduler is available, falling back to local execution.
    pub async fn detect() -> Self {
        if probe("squeue", "--version").await {
            return Self::Slurm;
        }
        if probe("bjobs", "-V").await {
            return Self::Lsf;
        }
        Self::Local
    }
}

async fn probe(program: &str, arg: &str) -> bool {
    let found = Command::new(program)
        .arg(arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);
    tracing::debug!(program, found, "probed for scheduler");
    found
}

impl fmt::Display for BatchSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchSystem {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "lsf" => Ok(Self::Lsf),
            "slurm" => Ok(Self::Slurm),
            _ => Err(BatchError::UnknownSystem(s.to_string())),
        }
    }
}
