//! Running verification commands on nodes
//!
//! Commands run inside the machine-config daemon container on the target
//! node. That container mounts the host root at `/rootfs`, so callers wrap
//! host commands in `chroot /rootfs ...`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, ListParams};
use kube::Client;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use layercheck_common::store::NodeExecutor;
use layercheck_common::{Error, Result, MCO_NAMESPACE};

/// Label selector for machine-config daemon pods
pub const DAEMON_POD_SELECTOR: &str = "k8s-app=machine-config-daemon";
/// Container to exec into
pub const DAEMON_CONTAINER: &str = "machine-config-daemon";

const EXEC_SUCCESS: &str = "Success";

async fn read_all(node: &str, stream: Option<impl AsyncRead + Unpin>) -> Result<String> {
    let mut out = String::new();
    if let Some(mut stream) = stream {
        stream
            .read_to_string(&mut out)
            .await
            .map_err(|e| Error::exec(node, format!("failed to read output: {}", e)))?;
    }
    Ok(out)
}

/// [`NodeExecutor`] that execs into the daemon pod on each node
pub struct DaemonPodExecutor {
    pods: Api<Pod>,
}

impl DaemonPodExecutor {
    /// Executor using the operator namespace's daemon pods
    pub fn new(client: Client) -> Self {
        Self {
            pods: Api::namespaced(client, MCO_NAMESPACE),
        }
    }

    async fn daemon_pod_for(&self, node: &str) -> Result<String> {
        let params = ListParams::default()
            .labels(DAEMON_POD_SELECTOR)
            .fields(&format!("spec.nodeName={}", node));
        let pods = self
            .pods
            .list(&params)
            .await
            .map_err(|e| Error::exec(node, format!("failed to list daemon pods: {}", e)))?;

        pods.items
            .into_iter()
            .find_map(|p| p.metadata.name)
            .ok_or_else(|| Error::exec(node, "no machine-config-daemon pod scheduled on node"))
    }
}

#[async_trait]
impl NodeExecutor for DaemonPodExecutor {
    async fn exec(&self, node: &str, command: &[String]) -> Result<String> {
        let pod = self.daemon_pod_for(node).await?;
        debug!(node = %node, pod = %pod, command = ?command, "Executing on node");

        let params = AttachParams::default()
            .container(DAEMON_CONTAINER)
            .stdin(false)
            .stdout(true)
            .stderr(true);
        let mut attached = self
            .pods
            .exec(&pod, command.to_vec(), &params)
            .await
            .map_err(|e| Error::exec(node, format!("exec in pod {} failed: {}", pod, e)))?;

        let (stdout, stderr) = tokio::join!(
            read_all(node, attached.stdout()),
            read_all(node, attached.stderr())
        );
        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        attached
            .join()
            .await
            .map_err(|e| Error::exec(node, format!("exec session failed: {}", e)))?;

        let stdout = stdout?;
        if let Some(status) = status {
            if status.status.as_deref() != Some(EXEC_SUCCESS) {
                return Err(Error::exec(
                    node,
                    format!(
                        "command {:?} failed: {} (stderr: {})",
                        command,
                        status.message.unwrap_or_default(),
                        stderr.unwrap_or_default().trim()
                    ),
                ));
            }
        }

        info!(node = %node, bytes = stdout.len(), "Command completed on node");
        Ok(stdout)
    }
}
