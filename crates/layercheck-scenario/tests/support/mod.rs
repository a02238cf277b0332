//! In-memory cluster that plays the controller's part for scenario tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use layercheck_common::memory::MemoryStore;
use layercheck_common::resources::{
    BuildState, ConfigMap, ImageRepository, Machine, Node, Pool, RenderedConfig, Secret,
    NODE_STATE_DEGRADED,
};
use layercheck_common::store::{ControlPlane, MockNodeExecutor, NodeExecutor, ResourceStore};
use layercheck_common::{node_role_label, Result, LAYERING_ENABLED_POOL_LABEL};
use layercheck_scenario::options::Timeouts;

pub const BUILT_IMAGE: &str = "registry.example/os-image@sha256:deadbeef";
pub const REGISTRY_REPOSITORY: &str =
    "image-registry.openshift-image-registry.svc:5000/openshift-machine-config-operator/os-image";
pub const PUSH_SECRET: &str = "builder-dockercfg-x7k2p";

pub struct FakeCluster {
    pub pools: MemoryStore<Pool>,
    pub config_maps: MemoryStore<ConfigMap>,
    pub secrets: MemoryStore<Secret>,
    pub image_repositories: MemoryStore<ImageRepository>,
    pub nodes: MemoryStore<Node>,
    pub machines: MemoryStore<Machine>,
    pub executor: Box<dyn NodeExecutor>,
    pub pull_secret: Secret,
}

fn global_pull_secret() -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        ".dockerconfigjson".to_string(),
        br#"{"auths":{"registry.example":{"auth":"Zm9vOmJhcg=="}}}"#.to_vec(),
    );
    Secret {
        name: "pull-secret".to_string(),
        type_: "kubernetes.io/dockerconfigjson".to_string(),
        data,
    }
}

fn named_secret(name: &str) -> Secret {
    Secret {
        name: name.to_string(),
        ..Default::default()
    }
}

impl FakeCluster {
    /// Cluster with the builder push secret present and a registry that
    /// resolves image repositories at once. No build controller yet.
    pub fn new() -> Self {
        let image_repositories = MemoryStore::new();
        image_repositories.set_reconciler(|repo: &mut ImageRepository| {
            if repo.repository.is_some() {
                return false;
            }
            repo.repository = Some(REGISTRY_REPOSITORY.to_string());
            true
        });

        Self {
            pools: MemoryStore::new(),
            config_maps: MemoryStore::new(),
            secrets: MemoryStore::with_objects([
                named_secret("default-token-abcde"),
                named_secret(PUSH_SECRET),
            ]),
            image_repositories,
            nodes: MemoryStore::new(),
            machines: MemoryStore::new(),
            executor: Box::new(MockNodeExecutor::new()),
            pull_secret: global_pull_secret(),
        }
    }

    /// Render configs for new pools, and once a pool is opted in report
    /// `Building` for `building_polls` reads, then `last` with `image`
    pub fn with_build_controller(
        self,
        building_polls: u32,
        last: BuildState,
        image: Option<&str>,
    ) -> Self {
        let reads_since_opt_in = AtomicU32::new(0);
        let image = image.map(String::from);
        self.pools.set_reconciler(move |pool: &mut Pool| {
            let mut changed = false;
            if pool.status.rendered_config.is_none() {
                pool.status.rendered_config = Some(RenderedConfig {
                    name: format!("rendered-{}-5f3c9a", pool.name),
                    sources: vec!["00-worker".to_string(), "01-worker-kubelet".to_string()],
                });
                changed = true;
            }
            if !pool.has_label(LAYERING_ENABLED_POOL_LABEL) {
                return changed;
            }

            let n = reads_since_opt_in.fetch_add(1, Ordering::SeqCst);
            let (state, published) = if n < building_polls {
                (BuildState::Building, None)
            } else {
                (last, image.clone())
            };
            if pool.status.build_state != state || pool.status.image != published {
                pool.status.build_state = state;
                pool.status.image = published;
                changed = true;
            }
            changed
        });
        self
    }

    /// Nodes joining the pool boot `image` after one read
    pub fn with_node_updater(self, pool: &str, image: &str) -> Self {
        let role = node_role_label(pool);
        let image = image.to_string();
        self.nodes.set_reconciler(move |node: &mut Node| {
            if !node.labels.contains_key(&role) || node.current_image.as_deref() == Some(&image) {
                return false;
            }
            if node.state.as_deref() == Some("Working") {
                node.current_image = Some(image.clone());
                node.state = Some("Done".to_string());
            } else {
                node.state = Some("Working".to_string());
            }
            true
        });
        self
    }

    /// Nodes joining the pool go degraded instead of updating
    pub fn with_degrading_nodes(self, pool: &str) -> Self {
        let role = node_role_label(pool);
        self.nodes.set_reconciler(move |node: &mut Node| {
            if !node.labels.contains_key(&role) || node.is_degraded() {
                return false;
            }
            node.state = Some(NODE_STATE_DEGRADED.to_string());
            true
        });
        self
    }

    /// One worker backed by a machine and one control-plane node
    pub fn with_nodes(self) -> Self {
        self.nodes.put(node("worker-a", "worker", Some("machine-a")));
        self.nodes.put(node("master-0", "master", None));
        self.machines.put(Machine {
            name: "machine-a".to_string(),
        });
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

pub fn node(name: &str, role: &str, machine: Option<&str>) -> Node {
    let mut labels = BTreeMap::new();
    labels.insert(node_role_label(role), String::new());
    Node {
        name: name.to_string(),
        labels,
        current_image: Some("quay.io/openshift/os@sha256:base".to_string()),
        state: Some("Done".to_string()),
        machine: machine.map(String::from),
    }
}

/// Short budgets with a 1s poll so paused-clock tests stay readable
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        image_repository_secs: 30,
        rendered_config_secs: 30,
        build_start_secs: 60,
        build_completion_secs: 600,
        node_image_secs: 600,
        scenario_secs: 3600,
        poll_interval_secs: 1,
    }
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[async_trait]
impl ControlPlane for FakeCluster {
    fn pools(&self) -> &dyn ResourceStore<Pool> {
        &self.pools
    }

    fn config_maps(&self) -> &dyn ResourceStore<ConfigMap> {
        &self.config_maps
    }

    fn secrets(&self) -> &dyn ResourceStore<Secret> {
        &self.secrets
    }

    fn image_repositories(&self) -> &dyn ResourceStore<ImageRepository> {
        &self.image_repositories
    }

    fn nodes(&self) -> &dyn ResourceStore<Node> {
        &self.nodes
    }

    fn machines(&self) -> &dyn ResourceStore<Machine> {
        &self.machines
    }

    fn executor(&self) -> &dyn NodeExecutor {
        self.executor.as_ref()
    }

    async fn global_pull_secret(&self) -> Result<Secret> {
        Ok(self.pull_secret.clone())
    }
}

/// Executor whose transport panics mid-call
pub struct PanickingExecutor(pub &'static str);

#[async_trait]
impl NodeExecutor for PanickingExecutor {
    async fn exec(&self, _node: &str, _command: &[String]) -> Result<String> {
        panic!("{}", self.0)
    }
}
