//! cfail - find failed batch jobs.

use batchtools_cli::CfailArgs;
use clap::Parser;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = CfailArgs::parse();
    batchtools::cfail::run(args).await
}
