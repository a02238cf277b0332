//! Provisioning the resources a build needs
//!
//! Each fixture registers its own teardown right after it is created, so a
//! failure part-way through still unwinds whatever already exists.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use layercheck_common::cleanup::{CleanupHandle, CleanupRegistry};
use layercheck_common::mutate::mutate_with_retry;
use layercheck_common::resources::{
    BuildConfiguration, ConfigMap, DockerfileOverrides, ImageRepository, Named, Node, Pool, Secret,
};
use layercheck_common::retry::RetryConfig;
use layercheck_common::store::{ControlPlane, ControlPlaneResource};
use layercheck_common::wait::{wait_for_condition, WaitConfig};
use layercheck_common::{Error, Result};

use crate::options::ScenarioOptions;
use crate::predicates;

/// Image repository the final image is pushed to
pub const IMAGE_REPOSITORY_NAME: &str = "os-image";
/// Copy of the global pull secret inside the operator namespace
pub const GLOBAL_PULL_SECRET_CLONE_NAME: &str = "global-pull-secret-copy";
/// Prefix of the builder service account's registry push secret
pub const BUILDER_PUSH_SECRET_PREFIX: &str = "builder-dockercfg";

/// Everything a phase needs: the control plane, options, teardown registry,
/// and the scenario-wide deadline
pub(crate) struct ScenarioContext<'a> {
    pub control_plane: &'a Arc<dyn ControlPlane>,
    pub options: &'a ScenarioOptions,
    pub registry: &'a CleanupRegistry,
    pub conflict_retry: &'a RetryConfig,
    pub deadline: Instant,
}

impl ScenarioContext<'_> {
    pub fn cp(&self) -> &dyn ControlPlane {
        self.control_plane.as_ref()
    }

    /// Wait settings for one phase, clamped to the scenario deadline
    pub fn wait_config(&self, description: &str, timeout: Duration) -> WaitConfig {
        WaitConfig::new(description, timeout)
            .with_poll_interval(self.options.timeouts.poll_interval())
            .bounded_by(self.deadline)
    }

    /// Register deletion of a resource this scenario created
    pub fn register_delete<T: ControlPlaneResource>(&self, name: &str) -> CleanupHandle {
        let control_plane = self.control_plane.clone();
        let name = name.to_string();
        self.registry
            .register(format!("delete {} {}", T::KIND, name), move || async move {
                T::store(control_plane.as_ref()).delete(&name).await
            })
    }

    /// Register removal of a label this scenario added to an existing resource
    pub fn register_unlabel<T: ControlPlaneResource + Labelled>(
        &self,
        name: &str,
        label: &str,
    ) -> CleanupHandle {
        let control_plane = self.control_plane.clone();
        let retry = self.conflict_retry.clone();
        let name = name.to_string();
        let label = label.to_string();
        self.registry.register(
            format!("remove label {} from {} {}", label, T::KIND, name),
            move || async move {
                mutate_with_retry(T::store(control_plane.as_ref()), &name, &retry, |obj: &mut T| {
                    obj.labels_mut().remove(&label);
                })
                .await
                .map(|_| ())
            },
        )
    }

    async fn create<T: ControlPlaneResource>(&self, object: T) -> Result<()> {
        let name = object.name().to_string();
        T::store(self.cp()).create(object).await?;
        self.register_delete::<T>(&name);
        debug!(kind = T::KIND, name = %name, "Created fixture");
        Ok(())
    }
}

/// Resource kinds the harness labels
pub(crate) trait Labelled {
    fn labels_mut(&mut self) -> &mut BTreeMap<String, String>;
}

impl Labelled for Pool {
    fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.labels
    }
}

impl Labelled for Node {
    fn labels_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.labels
    }
}

/// Name of the builder's registry push secret in the operator namespace
async fn find_builder_push_secret(cp: &dyn ControlPlane) -> Result<String> {
    let prefix = format!("{}-", BUILDER_PUSH_SECRET_PREFIX);
    cp.secrets()
        .list()
        .await?
        .into_iter()
        .map(|s| s.object.name)
        .find(|name| name.starts_with(&prefix))
        .ok_or_else(|| Error::not_found(Secret::KIND, format!("{}*", prefix)))
}

/// Create every fixture the build depends on.
///
/// Order: image repository (and its pullspec), pull secret clone, build
/// configuration, pool (and its first rendered config), Dockerfile overrides.
pub(crate) async fn provision(ctx: &ScenarioContext<'_>) -> Result<()> {
    let options = ctx.options;
    let cp = ctx.cp();

    let push_secret = find_builder_push_secret(cp).await?;
    debug!(secret = %push_secret, "Found builder push secret");

    ctx.create(ImageRepository::new(IMAGE_REPOSITORY_NAME)).await?;
    let repo = wait_for_condition(
        cp.image_repositories(),
        IMAGE_REPOSITORY_NAME,
        &ctx.wait_config(
            "image repository pullspec",
            options.timeouts.image_repository(),
        ),
        predicates::image_repository_resolved,
    )
    .await?;
    let final_pullspec = repo.object.pullspec().ok_or_else(|| {
        Error::internal_with_context(IMAGE_REPOSITORY_NAME, "resolved repository has no pullspec")
    })?;

    let global = cp.global_pull_secret().await?;
    ctx.create(global.clone_as(GLOBAL_PULL_SECRET_CLONE_NAME)).await?;

    let build_config = BuildConfiguration {
        builder_type: options.builder_type,
        base_pull_secret_name: GLOBAL_PULL_SECRET_CLONE_NAME.to_string(),
        final_push_secret_name: push_secret,
        final_pullspec,
    };
    ctx.create(build_config.to_config_map()).await?;
    info!(
        builder = %options.builder_type,
        pullspec = %build_config.final_pullspec,
        "Configured on-cluster build"
    );

    ctx.create(Pool::new(&options.pool_name)).await?;
    wait_for_condition(
        cp.pools(),
        &options.pool_name,
        &ctx.wait_config("pool rendered config", options.timeouts.rendered_config()),
        predicates::rendered_config(&options.pool_name),
    )
    .await?;

    let overrides = DockerfileOverrides {
        entries: options.dockerfile_overrides.clone(),
    };
    ctx.create::<ConfigMap>(overrides.to_config_map()).await?;

    info!(pool = %options.pool_name, "Provisioned build fixtures");
    Ok(())
}
