//! kube-rs backed control plane for layercheck
//!
//! Maps the harness resource model onto a live cluster: pools are
//! MachineConfigPools, build fixtures are ConfigMaps, Secrets and
//! ImageStreams in the operator namespace, and node verification runs inside
//! the machine-config daemon pod on the target node.

#![deny(missing_docs)]

pub mod client;
pub mod control_plane;
pub mod exec;
pub mod mapping;
pub mod store;

pub use control_plane::KubeControlPlane;
