//! Scenario configuration
//!
//! A [`ScenarioOptions`] is immutable once a run starts. Options can be built
//! in code (see [`crate::catalog`]) or loaded from YAML:
//!
//! ```yaml
//! scenarios:
//!   - name: custom-pod-builder
//!     builderType: custom-pod-builder
//!     poolName: layered
//!     dockerfileOverrides:
//!       layered: |
//!         FROM configs AS final
//!         RUN rpm-ostree install cowsay
//!     timeouts:
//!       buildCompletionSecs: 1800
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use layercheck_common::resources::BuilderType;
use layercheck_common::{Error, Result};

/// Pool name used when none is given
pub const DEFAULT_POOL_NAME: &str = "layered";

fn default_pool_name() -> String {
    DEFAULT_POOL_NAME.to_string()
}

fn default_true() -> bool {
    true
}

fn default_node_role() -> String {
    "worker".to_string()
}

/// Largest budget any single timeout may ask for (one week)
pub const MAX_BUDGET_SECS: u64 = 7 * 24 * 60 * 60;

/// Wait budgets for one scenario, in seconds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Timeouts {
    /// Image repository gets a registry reference
    pub image_repository_secs: u64,
    /// Pool gets its first rendered config
    pub rendered_config_secs: u64,
    /// Build starts after opt-in
    pub build_start_secs: u64,
    /// Build finishes after starting
    pub build_completion_secs: u64,
    /// Node boots into the built image
    pub node_image_secs: u64,
    /// Whole scenario; every wait is clamped to what remains of it
    pub scenario_secs: u64,
    /// Time between polls
    pub poll_interval_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            image_repository_secs: 120,
            rendered_config_secs: 300,
            build_start_secs: 300,
            build_completion_secs: 1200,
            node_image_secs: 1200,
            scenario_secs: 3600,
            poll_interval_secs: 2,
        }
    }
}

impl Timeouts {
    /// Image repository budget
    pub fn image_repository(&self) -> Duration {
        Duration::from_secs(self.image_repository_secs)
    }

    /// Rendered config budget
    pub fn rendered_config(&self) -> Duration {
        Duration::from_secs(self.rendered_config_secs)
    }

    /// Build start budget
    pub fn build_start(&self) -> Duration {
        Duration::from_secs(self.build_start_secs)
    }

    /// Build completion budget
    pub fn build_completion(&self) -> Duration {
        Duration::from_secs(self.build_completion_secs)
    }

    /// Node image budget
    pub fn node_image(&self) -> Duration {
        Duration::from_secs(self.node_image_secs)
    }

    /// Scenario-wide deadline
    pub fn scenario(&self) -> Duration {
        Duration::from_secs(self.scenario_secs)
    }

    /// Poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    fn budgets(&self) -> [(&'static str, u64); 7] {
        [
            ("timeouts.imageRepositorySecs", self.image_repository_secs),
            ("timeouts.renderedConfigSecs", self.rendered_config_secs),
            ("timeouts.buildStartSecs", self.build_start_secs),
            ("timeouts.buildCompletionSecs", self.build_completion_secs),
            ("timeouts.nodeImageSecs", self.node_image_secs),
            ("timeouts.scenarioSecs", self.scenario_secs),
            ("timeouts.pollIntervalSecs", self.poll_interval_secs),
        ]
    }
}

/// Rolling the built image out to nodes and checking it there
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RolloutOptions {
    /// Command run on each node once it boots the new image
    pub verify_command: Vec<String>,
    /// Role to pick a random node from when no target nodes are given
    #[serde(default = "default_node_role")]
    pub node_role: String,
    /// Delete the node (and its machine) at teardown; it now runs a test image
    #[serde(default = "default_true")]
    pub delete_node_on_cleanup: bool,
}

/// Configuration for one test run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScenarioOptions {
    /// Name shown in logs and reports
    pub name: String,
    /// Builder backend to configure
    pub builder_type: BuilderType,
    /// Pool to create and opt in
    #[serde(default = "default_pool_name")]
    pub pool_name: String,
    /// Pool name to Dockerfile content
    #[serde(default)]
    pub dockerfile_overrides: BTreeMap<String, String>,
    /// Nodes to roll out to; a random node of the rollout role when empty
    #[serde(default)]
    pub target_nodes: Vec<String>,
    /// Leave every created resource in place for debugging
    #[serde(default)]
    pub skip_cleanup: bool,
    /// Roll the image out after it is built
    #[serde(default)]
    pub rollout: Option<RolloutOptions>,
    /// Wait budgets
    #[serde(default)]
    pub timeouts: Timeouts,
}

impl ScenarioOptions {
    /// Build-only scenario with default pool and timeouts
    pub fn new(name: impl Into<String>, builder_type: BuilderType) -> Self {
        Self {
            name: name.into(),
            builder_type,
            pool_name: default_pool_name(),
            dockerfile_overrides: BTreeMap::new(),
            target_nodes: Vec::new(),
            skip_cleanup: false,
            rollout: None,
            timeouts: Timeouts::default(),
        }
    }

    /// Use a different pool
    pub fn with_pool(mut self, pool_name: impl Into<String>) -> Self {
        self.pool_name = pool_name.into();
        self
    }

    /// Add a Dockerfile override for a pool
    pub fn with_dockerfile(mut self, pool: impl Into<String>, content: impl Into<String>) -> Self {
        self.dockerfile_overrides.insert(pool.into(), content.into());
        self
    }

    /// Roll out and verify with the given options
    pub fn with_rollout(mut self, rollout: RolloutOptions) -> Self {
        self.rollout = Some(rollout);
        self
    }

    /// Roll out to these nodes instead of a random one
    pub fn with_target_nodes(mut self, nodes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.target_nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Disable automatic teardown
    pub fn with_skip_cleanup(mut self, skip: bool) -> Self {
        self.skip_cleanup = skip;
        self
    }

    /// Override the wait budgets
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Reject options that cannot produce a meaningful run
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation_for_field("name", "scenario name is empty"));
        }
        if self.pool_name.trim().is_empty() {
            return Err(Error::validation_for_field("poolName", "pool name is empty"));
        }
        if self.timeouts.poll_interval_secs == 0 {
            return Err(Error::validation_for_field(
                "timeouts.pollIntervalSecs",
                "poll interval must be at least one second",
            ));
        }
        for (field, secs) in self.timeouts.budgets() {
            if secs > MAX_BUDGET_SECS {
                return Err(Error::validation_for_field(
                    field,
                    format!("{}s exceeds the {}s limit", secs, MAX_BUDGET_SECS),
                ));
            }
        }
        if let Some(rollout) = &self.rollout {
            if rollout.verify_command.is_empty() {
                return Err(Error::validation_for_field(
                    "rollout.verifyCommand",
                    "rollout needs a verification command",
                ));
            }
        }
        Ok(())
    }
}

/// A set of scenarios loaded from a file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// Scenarios, run in order
    pub scenarios: Vec<ScenarioOptions>,
}

impl SuiteConfig {
    /// Parse and validate a YAML suite
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let suite: SuiteConfig = serde_yaml::from_str(yaml)
            .map_err(|e| Error::serialization_for_kind("SuiteConfig", e.to_string()))?;
        suite.validate()?;
        Ok(suite)
    }

    /// Validate every scenario and reject duplicate names
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !seen.insert(scenario.name.as_str()) {
                return Err(Error::validation_for_field(
                    "scenarios",
                    format!("duplicate scenario name {}", scenario.name),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_fills_defaults() {
        let suite = SuiteConfig::from_yaml(
            r#"
scenarios:
  - name: pod-builder
    builderType: custom-pod-builder
    dockerfileOverrides:
      layered: "FROM configs AS final"
    timeouts:
      buildCompletionSecs: 60
"#,
        )
        .unwrap();

        let s = &suite.scenarios[0];
        assert_eq!(s.builder_type, BuilderType::CustomPodBuilder);
        assert_eq!(s.pool_name, DEFAULT_POOL_NAME);
        assert_eq!(s.dockerfile_overrides["layered"], "FROM configs AS final");
        assert_eq!(s.timeouts.build_completion(), Duration::from_secs(60));
        assert_eq!(s.timeouts.build_start_secs, Timeouts::default().build_start_secs);
        assert!(!s.skip_cleanup);
        assert!(s.rollout.is_none());
    }

    #[test]
    fn yaml_rollout_defaults_to_deleting_node() {
        let suite = SuiteConfig::from_yaml(
            r#"
scenarios:
  - name: rollout
    builderType: openshift-image-builder
    rollout:
      verifyCommand: ["chroot", "/rootfs", "cowsay", "Moo!"]
"#,
        )
        .unwrap();

        let rollout = suite.scenarios[0].rollout.as_ref().unwrap();
        assert!(rollout.delete_node_on_cleanup);
        assert_eq!(rollout.node_role, "worker");
        assert_eq!(rollout.verify_command.len(), 4);
    }

    #[test]
    fn unknown_fields_and_builders_are_rejected() {
        let typo = "scenarios:\n  - name: x\n    builderType: custom-pod-builder\n    poolNmae: p\n";
        assert!(SuiteConfig::from_yaml(typo).is_err());

        let bad_builder = "scenarios:\n  - name: x\n    builderType: kaniko\n";
        assert!(SuiteConfig::from_yaml(bad_builder).is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let yaml = "scenarios:\n  - name: x\n    builderType: custom-pod-builder\n  - name: x\n    builderType: openshift-image-builder\n";
        assert!(SuiteConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn rollout_without_command_is_invalid() {
        let options = ScenarioOptions::new("r", BuilderType::OpenshiftImageBuilder).with_rollout(
            RolloutOptions {
                verify_command: vec![],
                node_role: "worker".into(),
                delete_node_on_cleanup: true,
            },
        );
        match options.validate() {
            Err(Error::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("rollout.verifyCommand"))
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn zero_poll_interval_is_invalid() {
        let options = ScenarioOptions::new("p", BuilderType::CustomPodBuilder).with_timeouts(
            Timeouts {
                poll_interval_secs: 0,
                ..Default::default()
            },
        );
        assert!(options.validate().is_err());
    }

    #[test]
    fn oversized_budgets_are_rejected() {
        let yaml = "scenarios:\n  - name: x\n    builderType: custom-pod-builder\n    timeouts:\n      scenarioSecs: 18446744073709551615\n";
        match SuiteConfig::from_yaml(yaml) {
            Err(Error::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("timeouts.scenarioSecs"))
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let at_limit = ScenarioOptions::new("p", BuilderType::CustomPodBuilder).with_timeouts(
            Timeouts {
                build_completion_secs: MAX_BUDGET_SECS,
                ..Default::default()
            },
        );
        assert!(at_limit.validate().is_ok());
    }
}
