//! Resource model for the objects a scenario reads and writes
//!
//! These are deliberately narrow: each type holds only the fields the harness
//! inspects or mutates. Control-plane adapters translate them to and from the
//! full wire objects and preserve everything else on update.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{node_role_label, Error, Result};

/// Name of the ConfigMap holding the build configuration
pub const BUILD_CONFIG_MAP_NAME: &str = "on-cluster-build-config";
/// Name of the ConfigMap holding per-pool Dockerfile overrides
pub const DOCKERFILE_CONFIG_MAP_NAME: &str = "on-cluster-build-custom-dockerfile";

/// Config key: builder backend
pub const IMAGE_BUILDER_TYPE_KEY: &str = "image-builder-type";
/// Config key: secret used to pull the base image
pub const BASE_IMAGE_PULL_SECRET_NAME_KEY: &str = "base-image-pull-secret-name";
/// Config key: secret used to push the final image
pub const FINAL_IMAGE_PUSH_SECRET_NAME_KEY: &str = "final-image-push-secret-name";
/// Config key: where the final image is pushed
pub const FINAL_IMAGE_PULLSPEC_KEY: &str = "final-image-pullspec";

/// Anything addressable by name within its store
pub trait Named {
    /// Resource kind used in errors and logs
    const KIND: &'static str;

    /// Resource name
    fn name(&self) -> &str;
}

// =============================================================================
// Pool
// =============================================================================

/// Build progress reported by the controller for a pool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildState {
    /// No build has been requested or started
    #[default]
    Idle,
    /// A build is in progress
    Building,
    /// The last build produced an image
    Succeeded,
    /// The last build failed
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildState::Idle => "Idle",
            BuildState::Building => "Building",
            BuildState::Succeeded => "Succeeded",
            BuildState::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Rendered machine configuration a pool currently targets
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedConfig {
    /// Rendered config name (`rendered-<pool>-<hash>`)
    pub name: String,
    /// Names of the configs merged into it
    pub sources: Vec<String>,
}

/// Observed status of a pool
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStatus {
    /// Build progress
    pub build_state: BuildState,
    /// Image reference produced by the last successful build
    pub image: Option<String>,
    /// Rendered config, once the controller has produced one
    pub rendered_config: Option<RenderedConfig>,
}

/// A named group of managed nodes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pool {
    /// Pool name; also the node role it selects
    pub name: String,
    /// Mutable label set
    pub labels: BTreeMap<String, String>,
    /// Controller-reported status
    pub status: PoolStatus,
}

impl Pool {
    /// New pool with no labels and an empty status
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Node label that places a node in this pool
    pub fn node_role_label(&self) -> String {
        node_role_label(&self.name)
    }

    /// Whether the given label key is present
    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }
}

impl Named for Pool {
    const KIND: &'static str = "Pool";

    fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// Configuration objects
// =============================================================================

/// Plain key/value configuration object
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigMap {
    /// Name
    pub name: String,
    /// String data
    pub data: BTreeMap<String, String>,
}

impl Named for ConfigMap {
    const KIND: &'static str = "ConfigMap";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build backend the controller should use
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuilderType {
    /// Cluster-native image build objects
    OpenshiftImageBuilder,
    /// A plain pod running a builder image
    CustomPodBuilder,
}

impl BuilderType {
    /// Value stored under [`IMAGE_BUILDER_TYPE_KEY`]
    pub fn as_str(self) -> &'static str {
        match self {
            BuilderType::OpenshiftImageBuilder => "openshift-image-builder",
            BuilderType::CustomPodBuilder => "custom-pod-builder",
        }
    }
}

impl fmt::Display for BuilderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuilderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openshift-image-builder" => Ok(BuilderType::OpenshiftImageBuilder),
            "custom-pod-builder" => Ok(BuilderType::CustomPodBuilder),
            other => Err(Error::validation_for_field(
                IMAGE_BUILDER_TYPE_KEY,
                format!("unknown builder type {:?}", other),
            )),
        }
    }
}

/// Options the controller reads to run a build
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfiguration {
    /// Builder backend
    pub builder_type: BuilderType,
    /// Secret for pulling the base image
    pub base_pull_secret_name: String,
    /// Secret for pushing the final image
    pub final_push_secret_name: String,
    /// Destination of the final image
    pub final_pullspec: String,
}

impl BuildConfiguration {
    /// Render as the ConfigMap the controller consumes
    pub fn to_config_map(&self) -> ConfigMap {
        let data = BTreeMap::from([
            (
                IMAGE_BUILDER_TYPE_KEY.to_string(),
                self.builder_type.to_string(),
            ),
            (
                BASE_IMAGE_PULL_SECRET_NAME_KEY.to_string(),
                self.base_pull_secret_name.clone(),
            ),
            (
                FINAL_IMAGE_PUSH_SECRET_NAME_KEY.to_string(),
                self.final_push_secret_name.clone(),
            ),
            (
                FINAL_IMAGE_PULLSPEC_KEY.to_string(),
                self.final_pullspec.clone(),
            ),
        ]);

        ConfigMap {
            name: BUILD_CONFIG_MAP_NAME.to_string(),
            data,
        }
    }

    /// Parse from the controller's ConfigMap
    pub fn from_config_map(cm: &ConfigMap) -> Result<Self> {
        let get = |key: &str| {
            cm.data
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| {
                    Error::validation_for_field(
                        key,
                        format!("ConfigMap {} is missing required key {}", cm.name, key),
                    )
                })
        };

        Ok(Self {
            builder_type: get(IMAGE_BUILDER_TYPE_KEY)?.parse()?,
            base_pull_secret_name: get(BASE_IMAGE_PULL_SECRET_NAME_KEY)?,
            final_push_secret_name: get(FINAL_IMAGE_PUSH_SECRET_NAME_KEY)?,
            final_pullspec: get(FINAL_IMAGE_PULLSPEC_KEY)?,
        })
    }
}

/// Per-pool Dockerfile content fed to the custom build step
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DockerfileOverrides {
    /// Pool name to Dockerfile content
    pub entries: BTreeMap<String, String>,
}

impl DockerfileOverrides {
    /// Render as the ConfigMap the controller consumes
    pub fn to_config_map(&self) -> ConfigMap {
        ConfigMap {
            name: DOCKERFILE_CONFIG_MAP_NAME.to_string(),
            data: self.entries.clone(),
        }
    }
}

// =============================================================================
// Supporting resources
// =============================================================================

/// Image repository the final image is pushed to
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageRepository {
    /// Name
    pub name: String,
    /// Registry-assigned repository reference, once known
    pub repository: Option<String>,
}

impl ImageRepository {
    /// New repository with no resolved reference yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: None,
        }
    }

    /// Pullspec for the `latest` tag, once the repository is resolved
    pub fn pullspec(&self) -> Option<String> {
        self.repository
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(|r| format!("{}:latest", r))
    }
}

impl Named for ImageRepository {
    const KIND: &'static str = "ImageRepository";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Opaque credential object
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Secret {
    /// Name
    pub name: String,
    /// Secret type (e.g. `kubernetes.io/dockerconfigjson`)
    pub type_: String,
    /// Raw data
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    /// Copy of this secret under a new name
    pub fn clone_as(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_: self.type_.clone(),
            data: self.data.clone(),
        }
    }
}

impl Named for Secret {
    const KIND: &'static str = "Secret";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Node daemon state reported when an update cannot be applied
pub const NODE_STATE_DEGRADED: &str = "Degraded";

/// Compute node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    /// Name
    pub name: String,
    /// Labels, including role labels
    pub labels: BTreeMap<String, String>,
    /// Image the node is currently booted into
    pub current_image: Option<String>,
    /// Node daemon state (`Done`, `Working`, `Degraded`)
    pub state: Option<String>,
    /// Backing machine, if the node is machine-managed
    pub machine: Option<String>,
}

impl Node {
    /// Whether the node carries the given role label
    pub fn has_role(&self, role: &str) -> bool {
        self.labels.contains_key(&node_role_label(role))
    }

    /// Whether the node daemon reports it cannot converge
    pub fn is_degraded(&self) -> bool {
        self.state.as_deref() == Some(NODE_STATE_DEGRADED)
    }
}

impl Named for Node {
    const KIND: &'static str = "Node";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Machine backing a node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Machine {
    /// Name
    pub name: String,
}

impl Named for Machine {
    const KIND: &'static str = "Machine";

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_config() -> BuildConfiguration {
        BuildConfiguration {
            builder_type: BuilderType::CustomPodBuilder,
            base_pull_secret_name: "global-pull-secret-copy".into(),
            final_push_secret_name: "builder-dockercfg-abc12".into(),
            final_pullspec: "image-registry.svc:5000/mco/os-image:latest".into(),
        }
    }

    #[test]
    fn build_configuration_uses_recognized_keys() {
        let cm = build_config().to_config_map();
        assert_eq!(cm.name, BUILD_CONFIG_MAP_NAME);
        assert_eq!(cm.data.len(), 4);
        assert_eq!(cm.data[IMAGE_BUILDER_TYPE_KEY], "custom-pod-builder");
        assert_eq!(
            cm.data[BASE_IMAGE_PULL_SECRET_NAME_KEY],
            "global-pull-secret-copy"
        );
        assert_eq!(
            cm.data[FINAL_IMAGE_PUSH_SECRET_NAME_KEY],
            "builder-dockercfg-abc12"
        );

        let parsed = BuildConfiguration::from_config_map(&cm).unwrap();
        assert_eq!(parsed, build_config());
    }

    #[test]
    fn build_configuration_reports_missing_key() {
        let mut cm = build_config().to_config_map();
        cm.data.remove(FINAL_IMAGE_PULLSPEC_KEY);

        match BuildConfiguration::from_config_map(&cm) {
            Err(Error::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some(FINAL_IMAGE_PULLSPEC_KEY))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_builder_type_is_rejected() {
        assert!("kaniko".parse::<BuilderType>().is_err());
        assert_eq!(
            "openshift-image-builder".parse::<BuilderType>().unwrap(),
            BuilderType::OpenshiftImageBuilder
        );
    }

    #[test]
    fn image_repository_pullspec_waits_for_resolution() {
        let mut repo = ImageRepository::new("os-image");
        assert_eq!(repo.pullspec(), None);

        repo.repository = Some(String::new());
        assert_eq!(repo.pullspec(), None);

        repo.repository = Some("registry.svc:5000/mco/os-image".into());
        assert_eq!(
            repo.pullspec().as_deref(),
            Some("registry.svc:5000/mco/os-image:latest")
        );
    }

    #[test]
    fn node_roles_and_degradation() {
        let mut node = Node {
            name: "worker-0".into(),
            ..Default::default()
        };
        node.labels
            .insert("node-role.kubernetes.io/worker".into(), String::new());
        assert!(node.has_role("worker"));
        assert!(!node.has_role("layered"));
        assert!(!node.is_degraded());

        node.state = Some(NODE_STATE_DEGRADED.into());
        assert!(node.is_degraded());
    }

    #[test]
    fn secret_clone_keeps_type_and_data() {
        let mut src = Secret {
            name: "pull-secret".into(),
            type_: "kubernetes.io/dockerconfigjson".into(),
            ..Default::default()
        };
        src.data.insert(".dockerconfigjson".into(), b"{}".to_vec());

        let copy = src.clone_as("global-pull-secret-copy");
        assert_eq!(copy.name, "global-pull-secret-copy");
        assert_eq!(copy.type_, src.type_);
        assert_eq!(copy.data, src.data);
    }
}
