//! Kubernetes client construction

use std::path::{Path, PathBuf};
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use layercheck_common::retry::{retry_with_backoff, RetryConfig};
use layercheck_common::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a client from an optional kubeconfig path.
///
/// Without a path the config is inferred (in-cluster, then `KUBECONFIG` /
/// `~/.kube/config`). Transient failures are retried up to 10 times.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let path: Option<PathBuf> = kubeconfig.map(Path::to_path_buf);
    retry_with_backoff(
        &RetryConfig::with_max_attempts(10),
        "create_kube_client",
        Error::is_retryable,
        || {
            let path = path.clone();
            async move {
                create_client_with_timeout(
                    path.as_deref(),
                    DEFAULT_CONNECT_TIMEOUT,
                    DEFAULT_READ_TIMEOUT,
                )
                .await
            }
        },
    )
    .await
}

/// Create a client from an optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::control_plane_permanent(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::control_plane_permanent(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::control_plane("create_client", format!("failed to infer config: {}", e))
        })?,
    };

    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);

    Client::try_from(config).map_err(|e| {
        Error::control_plane("create_client", format!("failed to create client: {}", e))
    })
}
