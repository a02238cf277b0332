//! Results of a scenario run

use std::fmt;
use std::sync::Mutex;

use tracing::info;

use layercheck_common::cleanup::CleanupReport;
use layercheck_common::{Error, ErrorKind};

/// Stages of a scenario, in the order they run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Options are checked before anything is created
    Validate,
    /// Fixtures: image repository, secrets, build configuration, pool
    Provision,
    /// Pool gets the layering label
    OptIn,
    /// Controller starts a build
    BuildStart,
    /// Build finishes and publishes an image
    BuildCompletion,
    /// Image is rolled out to a node and verified there
    Rollout,
    /// Teardown of everything registered
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Validate => "Validate",
            Phase::Provision => "Provision",
            Phase::OptIn => "OptIn",
            Phase::BuildStart => "BuildStart",
            Phase::BuildCompletion => "BuildCompletion",
            Phase::Rollout => "Rollout",
            Phase::Cleanup => "Cleanup",
        };
        write!(f, "{}", s)
    }
}

/// Remembers the phase a scenario is in, so a failure or panic can be
/// attributed to it afterwards
#[derive(Debug)]
pub(crate) struct PhaseTracker {
    scenario: String,
    current: Mutex<Phase>,
}

impl PhaseTracker {
    pub(crate) fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            current: Mutex::new(Phase::Validate),
        }
    }

    pub(crate) fn enter(&self, phase: Phase) {
        info!(scenario = %self.scenario, phase = %phase, "Entering phase");
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    pub(crate) fn current(&self) -> Phase {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What the rollout phase observed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RolloutOutcome {
    /// Node the image was rolled out to
    pub node: String,
    /// Standard output of the verification command
    pub output: String,
}

/// A scenario that passed
#[derive(Debug)]
pub struct ScenarioOutcome {
    /// Scenario name
    pub scenario: String,
    /// Image reference the pool published
    pub image_pullspec: String,
    /// Rollout result, when the scenario rolls out
    pub rollout: Option<RolloutOutcome>,
    /// Teardown summary
    pub cleanup: CleanupReport,
}

/// A scenario that failed, with the phase it failed in
#[derive(Debug, thiserror::Error)]
#[error("scenario {scenario} failed during {phase} ({}): {source}", .source.kind())]
pub struct ScenarioError {
    /// Scenario name
    pub scenario: String,
    /// Phase the first error happened in
    pub phase: Phase,
    /// The first error; teardown failures after it are only in `cleanup`
    #[source]
    pub source: Error,
    /// Teardown summary
    pub cleanup: CleanupReport,
}

impl ScenarioError {
    /// Category of the underlying error
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}
