//! Sequencing a scenario's phases with guaranteed teardown
//!
//! A run either finishes every phase or stops at the first error. Either way
//! (and also when a phase panics) every registered teardown runs afterwards,
//! newest first.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{error, info};

use layercheck_common::cleanup::{panic_message, CleanupRegistry};
use layercheck_common::mutate::mutate_with_retry;
use layercheck_common::resources::Pool;
use layercheck_common::retry::RetryConfig;
use layercheck_common::store::ControlPlane;
use layercheck_common::wait::wait_for_condition;
use layercheck_common::{Error, Result, LAYERING_ENABLED_POOL_LABEL};

use crate::fixtures::{self, ScenarioContext};
use crate::options::ScenarioOptions;
use crate::outcome::{Phase, PhaseTracker, RolloutOutcome, ScenarioError, ScenarioOutcome};
use crate::predicates;
use crate::rollout;

/// Runs one scenario against a control plane
pub struct ScenarioOrchestrator {
    control_plane: Arc<dyn ControlPlane>,
    options: ScenarioOptions,
    conflict_retry: RetryConfig,
}

impl ScenarioOrchestrator {
    /// Orchestrator with the default conflict budget
    pub fn new(control_plane: Arc<dyn ControlPlane>, options: ScenarioOptions) -> Self {
        Self {
            control_plane,
            options,
            conflict_retry: RetryConfig::conflict_default(),
        }
    }

    /// Options this orchestrator runs with
    pub fn options(&self) -> &ScenarioOptions {
        &self.options
    }

    /// Run every phase, then tear down.
    ///
    /// The first phase error (or panic) is returned with the phase it
    /// happened in. A run whose phases all pass but whose teardown fails is
    /// reported as failing in [`Phase::Cleanup`].
    pub async fn run(&self) -> std::result::Result<ScenarioOutcome, ScenarioError> {
        let scenario = self.options.name.clone();
        let tracker = PhaseTracker::new(&scenario);
        let registry = CleanupRegistry::new(self.options.skip_cleanup);

        info!(
            scenario = %scenario,
            builder = %self.options.builder_type,
            pool = %self.options.pool_name,
            "Starting scenario"
        );

        let result = AssertUnwindSafe(self.run_phases(&registry, &tracker))
            .catch_unwind()
            .await;
        let result = match result {
            Ok(result) => result,
            Err(panic) => Err(Error::internal_with_context(
                tracker.current().to_string(),
                format!("PANIC: {}", panic_message(panic.as_ref())),
            )),
        };
        let failed_phase = tracker.current();

        if let Err(e) = &result {
            error!(
                scenario = %scenario,
                phase = %failed_phase,
                error = %e,
                "Scenario failed, tearing down"
            );
        }
        tracker.enter(Phase::Cleanup);
        let cleanup = registry.run_all().await;

        match result {
            Err(source) => Err(ScenarioError {
                scenario,
                phase: failed_phase,
                source,
                cleanup,
            }),
            Ok((image_pullspec, rollout)) => match cleanup.to_error() {
                Some(source) => Err(ScenarioError {
                    scenario,
                    phase: Phase::Cleanup,
                    source,
                    cleanup,
                }),
                None => {
                    info!(scenario = %scenario, image = %image_pullspec, "Scenario passed");
                    Ok(ScenarioOutcome {
                        scenario,
                        image_pullspec,
                        rollout,
                        cleanup,
                    })
                }
            },
        }
    }

    async fn run_phases(
        &self,
        registry: &CleanupRegistry,
        tracker: &PhaseTracker,
    ) -> Result<(String, Option<RolloutOutcome>)> {
        self.options.validate()?;

        let timeouts = &self.options.timeouts;
        let deadline = Instant::now().checked_add(timeouts.scenario()).ok_or_else(|| {
            Error::validation_for_field("timeouts.scenarioSecs", "scenario budget is too large")
        })?;
        let ctx = ScenarioContext {
            control_plane: &self.control_plane,
            options: &self.options,
            registry,
            conflict_retry: &self.conflict_retry,
            deadline,
        };
        let pool_name = self.options.pool_name.as_str();

        tracker.enter(Phase::Provision);
        fixtures::provision(&ctx).await?;

        tracker.enter(Phase::OptIn);
        mutate_with_retry(ctx.cp().pools(), pool_name, &self.conflict_retry, |p: &mut Pool| {
            p.labels
                .insert(LAYERING_ENABLED_POOL_LABEL.to_string(), String::new());
        })
        .await?;
        ctx.register_unlabel::<Pool>(pool_name, LAYERING_ENABLED_POOL_LABEL);
        info!(pool = %pool_name, "Opted pool into layering");

        tracker.enter(Phase::BuildStart);
        let started = wait_for_condition(
            ctx.cp().pools(),
            pool_name,
            &ctx.wait_config("build start", timeouts.build_start()),
            predicates::build_started,
        )
        .await?;
        info!(pool = %pool_name, state = %started.object.status.build_state, "Build started");

        tracker.enter(Phase::BuildCompletion);
        let built = wait_for_condition(
            ctx.cp().pools(),
            pool_name,
            &ctx.wait_config("build completion", timeouts.build_completion()),
            predicates::build_completed,
        )
        .await?;
        let image = built.object.status.image.ok_or_else(|| {
            Error::internal_with_context(pool_name, "build succeeded without an image")
        })?;
        info!(pool = %pool_name, image = %image, "Build succeeded");

        let rollout = match &self.options.rollout {
            Some(options) => {
                tracker.enter(Phase::Rollout);
                Some(rollout::rollout(&ctx, &image, options).await?)
            }
            None => None,
        };

        Ok((image, rollout))
    }
}
