//! layercheck CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand, ValueEnum};
use layercheck_common::telemetry::LogFormat;

/// layercheck - end-to-end checks for on-cluster OS image builds
#[derive(Parser, Debug)]
#[command(name = "layercheck")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run build scenarios against a cluster
    Run(commands::run::RunArgs),
    /// List available scenarios
    List(commands::list::ListArgs),
}

/// `--log-format` values
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[default]
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => commands::run::run(args).await,
            Commands::List(args) => commands::list::run(args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use layercheck_common::resources::BuilderType;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "layercheck",
            "--log-format",
            "json",
            "run",
            "custom-pod-builder",
            "rolls-out-image",
            "--pool",
            "infra",
            "--builder",
            "openshift-image-builder",
            "--skip-cleanup",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormatArg::Json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.scenarios, vec!["custom-pod-builder", "rolls-out-image"]);
                assert_eq!(args.pool.as_deref(), Some("infra"));
                assert_eq!(args.builder, Some(BuilderType::OpenshiftImageBuilder));
                assert!(args.skip_cleanup);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_builder() {
        assert!(Cli::try_parse_from(["layercheck", "run", "--builder", "kaniko"]).is_err());
    }

    #[test]
    fn log_format_defaults_to_text() {
        let cli = Cli::try_parse_from(["layercheck", "list"]).unwrap();
        assert_eq!(cli.log_format, LogFormatArg::Text);
        assert_eq!(LogFormat::from(cli.log_format), LogFormat::Text);
    }
}
