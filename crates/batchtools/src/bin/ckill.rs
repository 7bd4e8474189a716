//! ckill - kill batch jobs.

use batchtools_cli::CkillArgs;
use clap::Parser;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = CkillArgs::parse();
    batchtools::ckill::run(args).await
}
