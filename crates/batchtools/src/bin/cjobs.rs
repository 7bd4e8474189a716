//! cjobs - list batch jobs.

use batchtools_cli::CjobsArgs;
use clap::Parser;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = CjobsArgs::parse();
    batchtools::cjobs::run(args).await
}
