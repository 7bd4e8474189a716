use batchtools_cli::CfailArgs;
use batchtools_core::{
    Batch, FailureKind, FailureReport, LogOutcome, collect_logs, parse_job_ids, scan_log_file,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Duration, Utc};
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Output line for one scanned log, if it is reported at all.
fn log_line(path: &Utf8Path, outcome: &LogOutcome, reason: bool, incomplete: bool) -> Option<String> {
    match outcome {
        LogOutcome::Failed { kind, detail } if reason => {
            Some(format!("{}: {}: {}", path, kind, detail))
        }
        LogOutcome::Failed { .. } => Some(path.to_string()),
        LogOutcome::Incomplete if incomplete => Some(format!("{} (incomplete)", path)),
        _ => None,
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct LogSummary {
    succeeded: usize,
    incomplete: usize,
    failed: BTreeMap<String, usize>,
}

impl LogSummary {
    fn add(&mut self, outcome: &LogOutcome) {
        match outcome {
            LogOutcome::Success => self.succeeded += 1,
            LogOutcome::Incomplete => self.incomplete += 1,
            LogOutcome::Failed { kind, .. } => {
                *self.failed.entry(kind.to_string()).or_default() += 1;
            }
        }
    }

    fn render(&self) -> String {
        let failed: usize = self.failed.values().sum();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} logs: {} succeeded, {} failed, {} incomplete",
            self.succeeded + failed + self.incomplete,
            self.succeeded,
            failed,
            self.incomplete
        );
        for (kind, count) in &self.failed {
            let _ = writeln!(out, "  {:<20} {}", kind, count);
        }
        out
    }
}

fn report_line(report: &FailureReport) -> String {
    match report.kind {
        Some(kind) => format!(
            "{}: {} ({})\n  {}",
            report.job_id, report.explanation, kind, report.suggestion
        ),
        None => format!("{}: {}", report.job_id, report.explanation),
    }
}

/// Scan log files and print the failed ones.
fn scan_logs(args: &CfailArgs) -> Result<()> {
    let paths = if args.paths.is_empty() {
        vec![Utf8PathBuf::from(".")]
    } else {
        args.paths.clone()
    };
    let logs = collect_logs(&paths, &args.ext).into_diagnostic()?;
    tracing::info!(count = logs.len(), "scanning logs");

    let mut summary = LogSummary::default();
    for path in &logs {
        let outcome = match scan_log_file(path) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(%path, "cannot read log: {}", e);
                continue;
            }
        };
        summary.add(&outcome);
        if !args.summary {
            if let Some(line) = log_line(path, &outcome, args.reason, args.incomplete) {
                println!("{}", line);
            }
        }
    }

    if args.summary {
        print!("{}", summary.render());
    }
    Ok(())
}

/// Ask the scheduler why each job failed.
async fn analyze_jobs(batch: &Batch, ids: &[String]) -> Result<()> {
    for id in parse_job_ids(ids).into_diagnostic()? {
        match batch.analyze_failure(&id).await {
            Ok(report) => println!("{}", report_line(&report)),
            Err(e) => tracing::warn!("{}: {}", id, e),
        }
    }
    Ok(())
}

/// Start of a window reaching `hours` back from `now`.
fn window_start(now: DateTime<Utc>, hours: u64) -> Result<DateTime<Utc>> {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| miette::miette!("--since {} hours is out of range", hours))
}

/// List the user's jobs that failed in the last `hours`.
async fn recent_failures(batch: &Batch, hours: u64, reason: bool, summary: bool) -> Result<()> {
    let since = window_start(Utc::now(), hours)?;
    let jobs = batch.recent_failures(since).await.into_diagnostic()?;

    if summary {
        println!("{} failed job(s) in the last {} hour(s)", jobs.len(), hours);
        return Ok(());
    }

    for job in &jobs {
        if reason {
            match batch.analyze_failure(&job.id).await {
                Ok(report) => {
                    let kind = report.kind.unwrap_or(FailureKind::Unknown);
                    println!("{}\t{}\t{}: {}", job.id, job.name, kind, report.explanation);
                }
                Err(e) => {
                    tracing::warn!("{}: {}", job.id, e);
                    println!("{}\t{}", job.id, job.name);
                }
            }
        } else {
            println!("{}\t{}", job.id, job.name);
        }
    }
    Ok(())
}

/// Report failed jobs. Finding failures is not itself an error.
pub async fn run(args: CfailArgs) -> Result<()> {
    let config = crate::init(&args.common)?;

    if !args.jobs.is_empty() {
        let batch = crate::open_batch(&args.common, config).await;
        analyze_jobs(&batch, &args.jobs).await
    } else if let Some(hours) = args.since {
        let batch = crate::open_batch(&args.common, config).await;
        recent_failures(&batch, hours, args.reason, args.summary).await
    } else {
        scan_logs(&args)
    }
}
