//! List command

use std::path::PathBuf;

use clap::Args;

use crate::config;
use crate::Result;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Suite file to list instead of the built-in scenarios
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

pub async fn run(args: ListArgs) -> Result<()> {
    for scenario in config::available(args.config.as_deref())? {
        let rollout = if scenario.rollout.is_some() {
            "build + rollout"
        } else {
            "build"
        };
        println!(
            "  {:28} {:24} pool={} ({})",
            scenario.name, scenario.builder_type, scenario.pool_name, rollout
        );
    }
    Ok(())
}
