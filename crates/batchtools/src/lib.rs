//! The csub, cjobs, ckill and cfail commands.

pub mod cfail;
pub mod cjobs;
pub mod ckill;
pub mod csub;
mod logging;

use batchtools_cli::CommonArgs;
use batchtools_core::{Batch, BatchSystem, Config, JobFilter, JobStatus};
use miette::{IntoDiagnostic, Result};
use regex::Regex;

/// Install logging and load the configuration.
pub(crate) fn init(common: &CommonArgs) -> Result<Config> {
    logging::init(common.verbose, common.quiet);
    Config::load(common.config.as_deref()).into_diagnostic()
}

/// Pick the batch system: command line, then config, then detection.
pub(crate) async fn open_batch(common: &CommonArgs, config: Config) -> Batch {
    let system = match common.batch.or(config.batch) {
        Some(system) => system,
        None => BatchSystem::detect().await,
    };
    tracing::debug!(%system, "using batch system");
    Batch::new(system, config)
}

/// Build a job filter from `-J` and `-S` arguments.
pub(crate) fn job_filter(name: Option<&str>, statuses: &[JobStatus]) -> Result<JobFilter> {
    let name = match name {
        Some(pattern) => Some(
            Regex::new(pattern)
                .map_err(|e| miette::miette!("invalid name pattern '{}': {}", pattern, e))?,
        ),
        None => None,
    };
    Ok(JobFilter {
        name,
        statuses: statuses.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_filter() {
        let filter = job_filter(Some("^fit_"), &[JobStatus::Running]).unwrap();
        assert!(filter.name.unwrap().is_match("fit_01"));
        assert_eq!(filter.statuses, vec![JobStatus::Running]);

        assert!(job_filter(None, &[]).unwrap().is_empty());
        assert!(job_filter(Some("(unclosed"), &[]).is_err());
    }
}
