//! Live-cluster [`ControlPlane`]

use async_trait::async_trait;
use kube::Client;

use layercheck_common::resources::{ConfigMap, ImageRepository, Machine, Node, Pool, Secret};
use layercheck_common::store::{ControlPlane, NodeExecutor, ResourceStore};
use layercheck_common::{
    Result, GLOBAL_PULL_SECRET_NAME, MACHINE_API_NAMESPACE, MCO_NAMESPACE,
    OPENSHIFT_CONFIG_NAMESPACE,
};

use crate::exec::DaemonPodExecutor;
use crate::store::KubeStore;

/// Control plane backed by a Kubernetes client
pub struct KubeControlPlane {
    pools: KubeStore<Pool>,
    config_maps: KubeStore<ConfigMap>,
    secrets: KubeStore<Secret>,
    config_secrets: KubeStore<Secret>,
    image_repositories: KubeStore<ImageRepository>,
    nodes: KubeStore<Node>,
    machines: KubeStore<Machine>,
    executor: DaemonPodExecutor,
}

impl KubeControlPlane {
    /// Wire every store to `client`
    pub fn new(client: Client) -> Self {
        Self {
            pools: KubeStore::cluster_scoped(client.clone()),
            config_maps: KubeStore::namespaced(client.clone(), MCO_NAMESPACE),
            secrets: KubeStore::namespaced(client.clone(), MCO_NAMESPACE),
            config_secrets: KubeStore::namespaced(client.clone(), OPENSHIFT_CONFIG_NAMESPACE),
            image_repositories: KubeStore::namespaced(client.clone(), MCO_NAMESPACE),
            nodes: KubeStore::cluster_scoped(client.clone()),
            machines: KubeStore::namespaced(client.clone(), MACHINE_API_NAMESPACE),
            executor: DaemonPodExecutor::new(client),
        }
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
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
        &self.executor
    }

    async fn global_pull_secret(&self) -> Result<Secret> {
        Ok(self.config_secrets.get(GLOBAL_PULL_SECRET_NAME).await?.object)
    }
}
