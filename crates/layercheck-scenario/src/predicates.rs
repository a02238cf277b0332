//! Wait predicates for each phase
//!
//! Pure functions of one snapshot. The orchestrator hands them to
//! [`wait_for_condition`](layercheck_common::wait::wait_for_condition).

use layercheck_common::resources::{BuildState, ImageRepository, Node, Pool};
use layercheck_common::wait::WaitOutcome;

/// Source config every rendered worker-derived config must include
pub const BASE_WORKER_CONFIG: &str = "00-worker";

/// Pool has a rendered config for itself that includes the worker base config
pub fn rendered_config(pool_name: &str) -> impl Fn(&Pool) -> WaitOutcome {
    let prefix = format!("rendered-{}-", pool_name);
    move |pool| match &pool.status.rendered_config {
        Some(rendered)
            if rendered.name.starts_with(&prefix)
                && rendered.sources.iter().any(|s| s == BASE_WORKER_CONFIG) =>
        {
            WaitOutcome::Satisfied
        }
        _ => WaitOutcome::Continue,
    }
}

/// Build has left Idle.
///
/// A build that finished (either way) between polls also counts as started;
/// the completion wait decides what that outcome means.
pub fn build_started(pool: &Pool) -> WaitOutcome {
    match pool.status.build_state {
        BuildState::Idle => WaitOutcome::Continue,
        BuildState::Building | BuildState::Succeeded | BuildState::Failed => WaitOutcome::Satisfied,
    }
}

/// Build has succeeded and published an image.
///
/// Only called after the build was seen to start, so dropping back to Idle
/// is a regression rather than "not started yet".
pub fn build_completed(pool: &Pool) -> WaitOutcome {
    match pool.status.build_state {
        BuildState::Succeeded if pool.status.image.is_some() => WaitOutcome::Satisfied,
        BuildState::Succeeded | BuildState::Building => WaitOutcome::Continue,
        BuildState::Failed => {
            WaitOutcome::unrecoverable(format!("build for pool {} failed", pool.name))
        }
        BuildState::Idle => WaitOutcome::unrecoverable(format!(
            "build state for pool {} regressed from Building to Idle",
            pool.name
        )),
    }
}

/// Image repository has been assigned a registry reference
pub fn image_repository_resolved(repo: &ImageRepository) -> WaitOutcome {
    if repo.pullspec().is_some() {
        WaitOutcome::Satisfied
    } else {
        WaitOutcome::Continue
    }
}

/// Node reports booting `image`; a degraded node will not get there
pub fn node_image(image: &str) -> impl Fn(&Node) -> WaitOutcome + '_ {
    move |node| {
        if node.current_image.as_deref() == Some(image) {
            WaitOutcome::Satisfied
        } else if node.is_degraded() {
            WaitOutcome::unrecoverable(format!(
                "node {} is degraded while rolling out {}",
                node.name, image
            ))
        } else {
            WaitOutcome::Continue
        }
    }
}
