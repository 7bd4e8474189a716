//! csub - submit a command to the batch system.

use batchtools_cli::CsubArgs;
use clap::Parser;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = CsubArgs::parse();
    batchtools::csub::run(args).await
}
