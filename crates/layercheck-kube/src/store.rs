//! [`ResourceStore`] over the Kubernetes API
//!
//! Versions are `metadata.resourceVersion`. Updates replace the live object
//! with the caller's expected version pinned, so the API server rejects the
//! write with 409 if anyone committed in between.

use std::marker::PhantomData;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::debug;

use layercheck_common::store::{ResourceStore, Versioned};
use layercheck_common::{Error, Result};

use crate::mapping::KubeObject;

/// Translate a kube error into the harness error taxonomy
pub fn map_kube_error(kind: &str, name: &str, op: &str, err: kube::Error) -> Error {
    match &err {
        kube::Error::Api(resp) if resp.code == 404 => Error::not_found(kind, name),
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            Error::already_exists(kind, name)
        }
        kube::Error::Api(resp) if resp.code == 409 => {
            Error::conflict(kind, name, resp.message.clone())
        }
        // Other 4xx errors (validation, forbidden) won't fix themselves
        kube::Error::Api(resp) if (400..500).contains(&resp.code) => {
            Error::control_plane_permanent(format!("{} {} {}", op, kind, name), err.to_string())
        }
        _ => Error::control_plane(format!("{} {} {}", op, kind, name), err.to_string()),
    }
}

fn versioned<T: KubeObject>(obj: &DynamicObject) -> Result<Versioned<T>> {
    let version = obj.metadata.resource_version.clone().unwrap_or_default();
    Ok(Versioned::new(T::from_dynamic(obj)?, version))
}

/// Store for one resource kind, cluster-scoped or within one namespace
pub struct KubeStore<T> {
    api: Api<DynamicObject>,
    ar: ApiResource,
    _kind: PhantomData<fn() -> T>,
}

impl<T: KubeObject> KubeStore<T> {
    /// Store for a namespaced kind
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        let ar = T::api_resource();
        Self {
            api: Api::namespaced_with(client, namespace, &ar),
            ar,
            _kind: PhantomData,
        }
    }

    /// Store for a cluster-scoped kind
    pub fn cluster_scoped(client: Client) -> Self {
        let ar = T::api_resource();
        Self {
            api: Api::all_with(client, &ar),
            ar,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<T> ResourceStore<T> for KubeStore<T>
where
    T: KubeObject + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Versioned<T>> {
        let obj = self
            .api
            .get(name)
            .await
            .map_err(|e| map_kube_error(T::KIND, name, "get", e))?;
        versioned(&obj)
    }

    async fn list(&self) -> Result<Vec<Versioned<T>>> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(T::KIND, "*", "list", e))?;
        list.items.iter().map(versioned::<T>).collect()
    }

    async fn update(
        &self,
        name: &str,
        desired: T,
        expected_version: &str,
    ) -> Result<Versioned<T>> {
        let mut live = self
            .api
            .get(name)
            .await
            .map_err(|e| map_kube_error(T::KIND, name, "get", e))?;

        let live_version = live.metadata.resource_version.clone().unwrap_or_default();
        if live_version != expected_version {
            return Err(Error::conflict(
                T::KIND,
                name,
                format!(
                    "resourceVersion is {} but update was based on {}",
                    live_version, expected_version
                ),
            ));
        }

        desired.apply_to(&mut live)?;
        live.metadata.resource_version = Some(expected_version.to_string());

        let replaced = self
            .api
            .replace(name, &PostParams::default(), &live)
            .await
            .map_err(|e| map_kube_error(T::KIND, name, "replace", e))?;
        debug!(
            kind = T::KIND,
            name = %name,
            version = ?replaced.metadata.resource_version,
            "Replaced object"
        );
        versioned(&replaced)
    }

    async fn create(&self, object: T) -> Result<Versioned<T>> {
        let obj = object.to_dynamic(&self.ar)?;
        let created = self
            .api
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| map_kube_error(T::KIND, object.name(), "create", e))?;
        versioned(&created)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_kube_error(T::KIND, name, "delete", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: format!("{} happened", reason),
            reason: reason.into(),
            code,
        })
    }

    #[test]
    fn maps_status_codes_to_error_kinds() {
        assert!(map_kube_error("Pool", "layered", "get", api_error(404, "NotFound")).is_not_found());
        assert!(
            map_kube_error("Pool", "layered", "replace", api_error(409, "Conflict")).is_conflict()
        );
        assert!(matches!(
            map_kube_error("Pool", "layered", "create", api_error(409, "AlreadyExists")),
            Error::AlreadyExists { .. }
        ));

        let forbidden = map_kube_error("Pool", "layered", "get", api_error(403, "Forbidden"));
        assert!(!forbidden.is_retryable());

        let unavailable =
            map_kube_error("Pool", "layered", "get", api_error(503, "ServiceUnavailable"));
        assert!(unavailable.is_retryable());
    }
}
