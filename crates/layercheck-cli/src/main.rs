//! layercheck CLI
//!
//! Runs on-cluster OS image build scenarios against a cluster and reports
//! which passed.

use clap::Parser;

use layercheck_cli::{Cli, Result};
use layercheck_common::telemetry::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format.into())?;
    cli.run().await
}
