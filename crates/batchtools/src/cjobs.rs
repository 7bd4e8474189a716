use batchtools_cli::CjobsArgs;
use batchtools_core::{Job, JobStatus};
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Table with the columns JOBID STATUS QUEUE NAME.
fn format_table(jobs: &[Job]) -> String {
    let id_width = jobs.iter().map(|j| j.id.len()).max().unwrap_or(0).max(5);
    let queue_width = jobs
        .iter()
        .map(|j| j.queue.as_deref().map_or(1, str::len))
        .max()
        .unwrap_or(0)
        .max(5);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<9}  {:<queue_width$}  NAME",
        "JOBID", "STATUS", "QUEUE"
    );
    for job in jobs {
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<9}  {:<queue_width$}  {}",
            job.id,
            job.status.as_str(),
            job.queue.as_deref().unwrap_or("-"),
            job.name
        );
    }
    out
}

/// Number of jobs per status, then the total.
fn format_summary(jobs: &[Job]) -> String {
    let mut counts: BTreeMap<JobStatus, usize> = BTreeMap::new();
    for job in jobs {
        *counts.entry(job.status).or_default() += 1;
    }

    let mut out = String::new();
    for (status, count) in &counts {
        let _ = writeln!(out, "{:<10} {}", status.as_str(), count);
    }
    let _ = writeln!(out, "{:<10} {}", "total", jobs.len());
    out
}

/// List the user's jobs.
pub async fn run(args: CjobsArgs) -> Result<()> {
    let config = crate::init(&args.common)?;
    let mut batch = crate::open_batch(&args.common, config).await;
    if let Some(user) = &args.user {
        batch = batch.with_user(user.clone());
    }

    let filter = crate::job_filter(args.name.as_deref(), &args.status)?;
    let jobs = batch.jobs(&filter).await.into_diagnostic()?;

    if args.count {
        println!("{}", jobs.len());
    } else if args.summary {
        print!("{}", format_summary(&jobs));
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&jobs).into_diagnostic()?);
    } else {
        print!("{}", format_table(&jobs));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchtools_core::BatchSystem;

    fn job(id: &str, name: &str, status: JobStatus, queue: Option<&str>) -> Job {
        Job {
            id: id.to_string(),
            name: name.to_string(),
            status,
            queue: queue.map(str::to_string),
            submit_time: None,
            start_time: None,
            host: None,
            system: BatchSystem::Lsf,
        }
    }

    #[test]
    fn test_format_table() {
        let jobs = vec![
            job("1234567", "fit_1", JobStatus::Running, Some("long")),
            job("12", "fit_2", JobStatus::Pending, None),
        ];
        let table = format_table(&jobs);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "JOBID    STATUS     QUEUE  NAME");
        assert_eq!(lines[1], "1234567  running    long   fit_1");
        assert_eq!(lines[2], "12       pending    -      fit_2");
    }

    #[test]
    fn test_format_table_empty() {
        assert_eq!(format_table(&[]), "JOBID  STATUS     QUEUE  NAME\n");
    }

    #[test]
    fn test_format_summary() {
        let jobs = vec![
            job("1", "a", JobStatus::Running, None),
            job("2", "b", JobStatus::Pending, None),
            job("3", "c", JobStatus::Running, None),
        ];
        assert_eq!(
            format_summary(&jobs),
            "pending    1\nrunning    2\ntotal      3\n"
        );
    }
}
