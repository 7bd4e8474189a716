use batchtools_cli::CkillArgs;
use batchtools_core::parse_job_ids;
use miette::{IntoDiagnostic, Result};

/// Kill jobs given by id, or the user's jobs selected by filter.
pub async fn run(args: CkillArgs) -> Result<()> {
    let config = crate::init(&args.common)?;
    let batch = crate::open_batch(&args.common, config).await;

    let ids: Vec<String> = if !args.jobids.is_empty() {
        parse_job_ids(args.jobids.as_slice()).into_diagnostic()?
    } else {
        let filter = crate::job_filter(args.name.as_deref(), &args.status)?;
        if filter.is_empty() && !args.all {
            miette::bail!("Give job ids, select jobs with -J/-S, or use --all to kill all of your jobs");
        }
        batch
            .jobs(&filter)
            .await
            .into_diagnostic()?
            .into_iter()
            .map(|job| job.id)
            .collect()
    };

    if ids.is_empty() {
        eprintln!("No jobs to kill");
        return Ok(());
    }

    for id in &ids {
        println!("{}", id);
    }

    if args.dry_run {
        eprintln!("Would kill {} job(s)", ids.len());
        return Ok(());
    }

    let killed = batch.kill(&ids).await.into_diagnostic()?;
    eprintln!("Killed {} job(s)", killed);
    Ok(())
}
