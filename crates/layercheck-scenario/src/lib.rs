//! On-cluster build scenarios
//!
//! A scenario provisions the fixtures an image build needs, opts a pool into
//! layering, waits for the controller to build and publish an image, and
//! optionally rolls it out to a node and verifies it there. Whatever happens,
//! everything it created is torn down afterwards.
//!
//! ```ignore
//! let orchestrator = ScenarioOrchestrator::new(control_plane, catalog::by_name("custom-pod-builder")?);
//! let outcome = orchestrator.run().await?;
//! println!("built {}", outcome.image_pullspec);
//! ```

#![deny(missing_docs)]

pub mod catalog;
mod fixtures;
pub mod options;
pub mod orchestrator;
pub mod outcome;
pub mod predicates;
pub mod report;
mod rollout;

pub use fixtures::{
    BUILDER_PUSH_SECRET_PREFIX, GLOBAL_PULL_SECRET_CLONE_NAME, IMAGE_REPOSITORY_NAME,
};
pub use options::{RolloutOptions, ScenarioOptions, SuiteConfig, Timeouts};
pub use orchestrator::ScenarioOrchestrator;
pub use outcome::{Phase, RolloutOutcome, ScenarioError, ScenarioOutcome};
pub use report::{ScenarioRecord, SuiteFailed, SuiteReport};
