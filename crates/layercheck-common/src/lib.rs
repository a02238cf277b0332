//! Common types for layercheck: resource model, errors, and the retry,
//! polling, and cleanup primitives scenarios are built from.

#![deny(missing_docs)]

pub mod cleanup;
pub mod error;
pub mod memory;
pub mod mutate;
pub mod resources;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod wait;

pub use error::{Error, ErrorKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace the machine-config operator and its build fixtures live in
pub const MCO_NAMESPACE: &str = "openshift-machine-config-operator";

/// Namespace holding the cluster-wide pull secret
pub const OPENSHIFT_CONFIG_NAMESPACE: &str = "openshift-config";

/// Name of the cluster-wide pull secret
pub const GLOBAL_PULL_SECRET_NAME: &str = "pull-secret";

/// Namespace holding Machine objects
pub const MACHINE_API_NAMESPACE: &str = "openshift-machine-api";

/// Label that opts a pool into controller-managed image builds
pub const LAYERING_ENABLED_POOL_LABEL: &str = "machineconfiguration.openshift.io/layering-enabled";

/// Prefix of node role labels (`node-role.kubernetes.io/<role>`)
pub const NODE_ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

/// Label key for a pool role
pub fn node_role_label(role: &str) -> String {
    format!("{}{}", NODE_ROLE_LABEL_PREFIX, role)
}
