//! Error types for the CLI

use std::path::PathBuf;

use layercheck_common::telemetry::TelemetryError;
use layercheck_scenario::SuiteFailed;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Layercheck(#[from] layercheck_common::Error),

    #[error(transparent)]
    Suite(#[from] SuiteFailed),

    #[error("logging setup failed: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("yaml error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("unknown scenario {name} (available: {available})")]
    UnknownScenario { name: String, available: String },

    #[error("no scenarios to run")]
    NothingToRun,
}

impl Error {
    pub fn unknown_scenario(name: impl Into<String>, available: &[String]) -> Self {
        Error::UnknownScenario {
            name: name.into(),
            available: available.join(", "),
        }
    }
}
