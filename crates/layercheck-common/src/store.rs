//! Collaborator interfaces for the external control plane
//!
//! The harness is purely a client: it reads versioned snapshots, commits
//! updates against an expected version, creates and deletes fixtures, and
//! runs verification commands on nodes. These traits are the seam between
//! scenario logic and whichever control plane backs it (a live cluster or
//! the in-memory [`crate::memory::MemoryStore`]).

use async_trait::async_trait;

use crate::resources::{ConfigMap, ImageRepository, Machine, Named, Node, Pool, Secret};
use crate::Result;

/// A snapshot of a resource together with the version it was read at
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Resource snapshot
    pub object: T,
    /// Opaque version token; pass back to [`ResourceStore::update`]
    pub version: String,
}

impl<T> Versioned<T> {
    /// Wrap a snapshot with its version
    pub fn new(object: T, version: impl Into<String>) -> Self {
        Self {
            object,
            version: version.into(),
        }
    }
}

/// Versioned CRUD access to one kind of resource
#[async_trait]
pub trait ResourceStore<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Fetch the current snapshot. Fails with `NotFound` if absent.
    async fn get(&self, name: &str) -> Result<Versioned<T>>;

    /// List every resource of this kind in scope
    async fn list(&self) -> Result<Vec<Versioned<T>>>;

    /// Commit `desired` if the stored version still equals `expected_version`.
    ///
    /// Fails with `Conflict` if the version is stale; otherwise the store
    /// assigns a new version and returns the committed snapshot.
    async fn update(&self, name: &str, desired: T, expected_version: &str)
        -> Result<Versioned<T>>;

    /// Create a new resource. Fails with `AlreadyExists` on a name clash.
    async fn create(&self, object: T) -> Result<Versioned<T>>;

    /// Delete a resource. Fails with `NotFound` if absent.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Runs commands on a node, used only for post-rollout verification
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Execute `command` on `node` and return its standard output
    async fn exec(&self, node: &str, command: &[String]) -> Result<String>;
}

/// Every resource kind and capability a scenario needs
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Pools managed by the controller under test
    fn pools(&self) -> &dyn ResourceStore<Pool>;

    /// ConfigMaps in the controller's namespace
    fn config_maps(&self) -> &dyn ResourceStore<ConfigMap>;

    /// Secrets in the controller's namespace
    fn secrets(&self) -> &dyn ResourceStore<Secret>;

    /// Image repositories in the controller's namespace
    fn image_repositories(&self) -> &dyn ResourceStore<ImageRepository>;

    /// Cluster nodes
    fn nodes(&self) -> &dyn ResourceStore<Node>;

    /// Machines backing nodes
    fn machines(&self) -> &dyn ResourceStore<Machine>;

    /// Remote command execution on nodes
    fn executor(&self) -> &dyn NodeExecutor;

    /// The cluster-wide pull secret, read from outside the controller's namespace
    async fn global_pull_secret(&self) -> Result<Secret>;
}

/// A resource kind with a store on every [`ControlPlane`]
///
/// Lets generic code (teardown registration, for one) reach the right store
/// from the type alone.
pub trait ControlPlaneResource: Named + Clone + Send + Sync + 'static {
    /// This kind's store on `control_plane`
    fn store(control_plane: &dyn ControlPlane) -> &dyn ResourceStore<Self>;
}

macro_rules! control_plane_resource {
    ($ty:ty, $accessor:ident) => {
        impl ControlPlaneResource for $ty {
            fn store(control_plane: &dyn ControlPlane) -> &dyn ResourceStore<Self> {
                control_plane.$accessor()
            }
        }
    };
}

control_plane_resource!(Pool, pools);
control_plane_resource!(ConfigMap, config_maps);
control_plane_resource!(Secret, secrets);
control_plane_resource!(ImageRepository, image_repositories);
control_plane_resource!(Node, nodes);
control_plane_resource!(Machine, machines);
