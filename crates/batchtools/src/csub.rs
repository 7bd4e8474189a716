use batchtools_cli::CsubArgs;
use batchtools_core::SubmitRequest;
use batchtools_parsers::shell_join;
use miette::{IntoDiagnostic, Result};
use std::time::Duration;

fn request(args: &CsubArgs) -> SubmitRequest {
    SubmitRequest {
        command: args.command.clone(),
        jobname: args.jobname.clone(),
        logfile: args.logfile.clone(),
        queue: args.queue.clone(),
        ncpus: args.ncpus,
        memory_mb: args.memory,
        runtime_secs: args.runtime,
        options: args.options.clone(),
    }
}

/// Submit the command and print the job id.
pub async fn run(args: CsubArgs) -> Result<()> {
    let config = crate::init(&args.common)?;
    let batch = crate::open_batch(&args.common, config).await;
    let req = request(&args);

    if args.dry_run {
        let argv = batch.submission(&req).into_diagnostic()?;
        println!("{}", shell_join(&argv));
        return Ok(());
    }

    let throttle = &batch.config().throttle;
    let max_jobs = args.max_jobs.or(throttle.max_jobs);
    let sleep = Duration::from_secs(args.sleep.unwrap_or(throttle.sleep_secs));
    batch.throttle(max_jobs, sleep).await.into_diagnostic()?;

    let job = batch.submit(&req).await.into_diagnostic()?;
    tracing::debug!(argv = %shell_join(&job.argv), "executed");
    println!("{}", job.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_request_from_args() {
        let args = CsubArgs::try_parse_from([
            "csub", "-J", "fit", "-Q", "long", "-m", "2G", "-O", "R=rhel60", "echo", "hi",
        ])
        .unwrap();
        let req = request(&args);
        assert_eq!(req.command, vec!["echo", "hi"]);
        assert_eq!(req.jobname.as_deref(), Some("fit"));
        assert_eq!(req.queue.as_deref(), Some("long"));
        assert_eq!(req.memory_mb, Some(2048));
        assert_eq!(
            req.options,
            vec![("R".to_string(), Some("rhel60".to_string()))]
        );
        assert!(req.logfile.is_none());
    }
}
