//! Translation between the harness resource model and Kubernetes objects
//!
//! Every kind is handled as a [`DynamicObject`] so that fields the harness
//! does not model survive a read-modify-write untouched: updates start from
//! the live object and only overwrite what [`KubeObject::apply_to`] owns.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use k8s_openapi::api::core::v1::{
    ConfigMap as KubeConfigMap, Node as KubeNode, Secret as KubeSecret,
};
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde_json::{json, Value};

use layercheck_common::resources::{
    BuildState, ConfigMap, ImageRepository, Machine, Named, Node, Pool, PoolStatus,
    RenderedConfig, Secret,
};
use layercheck_common::{Error, Result};

/// Annotation carrying the image the last successful build produced
pub const POOL_IMAGE_ANNOTATION: &str =
    "machineconfiguration.openshift.io/newestImageEquivalentConfig";
/// Annotation carrying the image a node is booted into
pub const NODE_CURRENT_IMAGE_ANNOTATION: &str = "machineconfiguration.openshift.io/currentImage";
/// Annotation carrying the node daemon state
pub const NODE_STATE_ANNOTATION: &str = "machineconfiguration.openshift.io/state";
/// Annotation linking a node to its Machine (`<namespace>/<name>`)
pub const NODE_MACHINE_ANNOTATION: &str = "machine.openshift.io/machine";
/// Label selecting which MachineConfigs a pool renders
pub const MACHINE_CONFIG_ROLE_LABEL: &str = "machineconfiguration.openshift.io/role";
/// Base role every custom pool inherits configs from
pub const BASE_POOL_ROLE: &str = "worker";

const CONDITION_BUILD_FAILED: &str = "BuildFailed";
const CONDITION_BUILD_SUCCESS: &str = "BuildSuccess";
const CONDITION_BUILDING: &str = "Building";
const STATUS_TRUE: &str = "True";

/// A model type that can be stored as a Kubernetes object
pub trait KubeObject: Named + Sized {
    /// API group/version/kind/plural to address the object with
    fn api_resource() -> ApiResource;

    /// Read the model from a live object
    fn from_dynamic(obj: &DynamicObject) -> Result<Self>;

    /// Build a new object for creation
    fn to_dynamic(&self, ar: &ApiResource) -> Result<DynamicObject>;

    /// Overwrite the fields the model owns on a live object
    fn apply_to(&self, obj: &mut DynamicObject) -> Result<()>;
}

// Kinds the harness only creates, reads or deletes.
fn read_only<T: Named>(name: &str) -> Error {
    Error::control_plane_permanent(
        format!("update {} {}", T::KIND, name),
        "updates are not supported for this kind",
    )
}

/// Build an ApiResource from a known apiVersion and kind.
///
/// The plural is the lowercased kind plus `s`, which holds for every kind
/// this crate addresses.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    ApiResource {
        group,
        version,
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        plural: format!("{}s", kind.to_lowercase()),
    }
}

fn name_of<T: Named>(obj: &DynamicObject) -> Result<String> {
    obj.metadata
        .name
        .clone()
        .ok_or_else(|| Error::serialization_for_kind(T::KIND, "object has no metadata.name"))
}

fn annotation(obj: &DynamicObject, key: &str) -> Option<String> {
    obj.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .filter(|v| !v.is_empty())
        .cloned()
}

/// Round-trip a dynamic object into a typed k8s-openapi object
fn typed<K: serde::de::DeserializeOwned, T: Named>(obj: &DynamicObject) -> Result<K> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|e| Error::serialization_for_kind(T::KIND, e.to_string()))
}

fn data_field(obj: &mut DynamicObject) -> &mut serde_json::Map<String, Value> {
    if !obj.data.is_object() {
        obj.data = json!({});
    }
    match obj.data {
        Value::Object(ref mut map) => map,
        _ => unreachable!("data was just set to an object"),
    }
}

// =============================================================================
// Pool <-> MachineConfigPool
// =============================================================================

fn condition_true(conditions: &[Value], type_: &str) -> bool {
    conditions.iter().any(|c| {
        c.get("type").and_then(Value::as_str) == Some(type_)
            && c.get("status").and_then(Value::as_str) == Some(STATUS_TRUE)
    })
}

/// Derive the build state from pool conditions; failure outranks success
pub fn build_state_from_conditions(conditions: &[Value]) -> BuildState {
    if condition_true(conditions, CONDITION_BUILD_FAILED) {
        BuildState::Failed
    } else if condition_true(conditions, CONDITION_BUILD_SUCCESS) {
        BuildState::Succeeded
    } else if condition_true(conditions, CONDITION_BUILDING) {
        BuildState::Building
    } else {
        BuildState::Idle
    }
}

fn rendered_config(status: &Value) -> Option<RenderedConfig> {
    let configuration = status.get("configuration")?;
    let name = configuration.get("name").and_then(Value::as_str)?;
    if name.is_empty() {
        return None;
    }
    let sources = configuration
        .get("source")
        .and_then(Value::as_array)
        .map(|s| {
            s.iter()
                .filter_map(|r| r.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(RenderedConfig {
        name: name.to_string(),
        sources,
    })
}

impl KubeObject for Pool {
    fn api_resource() -> ApiResource {
        build_api_resource("machineconfiguration.openshift.io/v1", "MachineConfigPool")
    }

    fn from_dynamic(obj: &DynamicObject) -> Result<Self> {
        let status = obj.data.get("status").cloned().unwrap_or(Value::Null);
        let conditions = status
            .get("conditions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(Pool {
            name: name_of::<Pool>(obj)?,
            labels: obj.metadata.labels.clone().unwrap_or_default(),
            status: PoolStatus {
                build_state: build_state_from_conditions(&conditions),
                image: annotation(obj, POOL_IMAGE_ANNOTATION),
                rendered_config: rendered_config(&status),
            },
        })
    }

    fn to_dynamic(&self, ar: &ApiResource) -> Result<DynamicObject> {
        let mut obj = DynamicObject::new(&self.name, ar).data(json!({
            "spec": {
                "machineConfigSelector": {
                    "matchExpressions": [{
                        "key": MACHINE_CONFIG_ROLE_LABEL,
                        "operator": "In",
                        "values": [BASE_POOL_ROLE, self.name],
                    }],
                },
                "nodeSelector": {
                    "matchLabels": { self.node_role_label(): "" },
                },
            },
        }));
        obj.metadata.labels = Some(self.labels.clone());
        Ok(obj)
    }

    fn apply_to(&self, obj: &mut DynamicObject) -> Result<()> {
        obj.metadata.labels = Some(self.labels.clone());
        Ok(())
    }
}

// =============================================================================
// ConfigMap
// =============================================================================

impl KubeObject for ConfigMap {
    fn api_resource() -> ApiResource {
        ApiResource::erase::<KubeConfigMap>(&())
    }

    fn from_dynamic(obj: &DynamicObject) -> Result<Self> {
        let cm: KubeConfigMap = typed::<_, ConfigMap>(obj)?;
        Ok(ConfigMap {
            name: name_of::<ConfigMap>(obj)?,
            data: cm.data.unwrap_or_default(),
        })
    }

    fn to_dynamic(&self, ar: &ApiResource) -> Result<DynamicObject> {
        Ok(DynamicObject::new(&self.name, ar).data(json!({ "data": self.data })))
    }

    fn apply_to(&self, obj: &mut DynamicObject) -> Result<()> {
        data_field(obj).insert("data".to_string(), json!(self.data));
        Ok(())
    }
}

// =============================================================================
// Secret
// =============================================================================

fn encode_secret_data(data: &BTreeMap<String, Vec<u8>>) -> Value {
    let encoded: BTreeMap<&String, String> =
        data.iter().map(|(k, v)| (k, BASE64.encode(v))).collect();
    json!(encoded)
}

impl KubeObject for Secret {
    fn api_resource() -> ApiResource {
        ApiResource::erase::<KubeSecret>(&())
    }

    fn from_dynamic(obj: &DynamicObject) -> Result<Self> {
        let secret: KubeSecret = typed::<_, Secret>(obj)?;
        Ok(Secret {
            name: name_of::<Secret>(obj)?,
            type_: secret.type_.unwrap_or_default(),
            data: secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.0))
                .collect(),
        })
    }

    fn to_dynamic(&self, ar: &ApiResource) -> Result<DynamicObject> {
        Ok(DynamicObject::new(&self.name, ar).data(json!({
            "type": self.type_,
            "data": encode_secret_data(&self.data),
        })))
    }

    fn apply_to(&self, obj: &mut DynamicObject) -> Result<()> {
        let data = data_field(obj);
        data.insert("type".to_string(), json!(self.type_));
        data.insert("data".to_string(), encode_secret_data(&self.data));
        Ok(())
    }
}

// =============================================================================
// ImageRepository <-> ImageStream
// =============================================================================

impl KubeObject for ImageRepository {
    fn api_resource() -> ApiResource {
        build_api_resource("image.openshift.io/v1", "ImageStream")
    }

    fn from_dynamic(obj: &DynamicObject) -> Result<Self> {
        Ok(ImageRepository {
            name: name_of::<ImageRepository>(obj)?,
            repository: obj
                .data
                .pointer("/status/dockerImageRepository")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    fn to_dynamic(&self, ar: &ApiResource) -> Result<DynamicObject> {
        Ok(DynamicObject::new(&self.name, ar).data(json!({ "spec": {} })))
    }

    fn apply_to(&self, _obj: &mut DynamicObject) -> Result<()> {
        Err(read_only::<ImageRepository>(&self.name))
    }
}

// =============================================================================
// Node
// =============================================================================

impl KubeObject for Node {
    fn api_resource() -> ApiResource {
        ApiResource::erase::<KubeNode>(&())
    }

    fn from_dynamic(obj: &DynamicObject) -> Result<Self> {
        let machine = annotation(obj, NODE_MACHINE_ANNOTATION).map(|m| match m.split_once('/') {
            Some((_, name)) => name.to_string(),
            None => m,
        });

        Ok(Node {
            name: name_of::<Node>(obj)?,
            labels: obj.metadata.labels.clone().unwrap_or_default(),
            current_image: annotation(obj, NODE_CURRENT_IMAGE_ANNOTATION),
            state: annotation(obj, NODE_STATE_ANNOTATION),
            machine,
        })
    }

    fn to_dynamic(&self, ar: &ApiResource) -> Result<DynamicObject> {
        let mut obj = DynamicObject::new(&self.name, ar);
        obj.metadata.labels = Some(self.labels.clone());
        Ok(obj)
    }

    fn apply_to(&self, obj: &mut DynamicObject) -> Result<()> {
        obj.metadata.labels = Some(self.labels.clone());
        Ok(())
    }
}

// =============================================================================
// Machine
// =============================================================================

impl KubeObject for Machine {
    fn api_resource() -> ApiResource {
        build_api_resource("machine.openshift.io/v1beta1", "Machine")
    }

    fn from_dynamic(obj: &DynamicObject) -> Result<Self> {
        Ok(Machine {
            name: name_of::<Machine>(obj)?,
        })
    }

    fn to_dynamic(&self, ar: &ApiResource) -> Result<DynamicObject> {
        Ok(DynamicObject::new(&self.name, ar))
    }

    fn apply_to(&self, _obj: &mut DynamicObject) -> Result<()> {
        Err(read_only::<Machine>(&self.name))
    }
}
