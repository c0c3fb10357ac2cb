use std::path::Path;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{event, Level};

use crate::error::{Error, Result};

/// Loads the client configuration from `kubeconfig` when given, otherwise
/// falls back to [`Config::infer`] (`KUBECONFIG`, `~/.kube/config`, then the
/// in-cluster service account).
pub async fn load_config(kubeconfig: Option<&Path>) -> Result<Config> {
    let config = match kubeconfig {
        Some(path) => {
            let failed = |message: String| Error::Kubeconfig {
                path: Some(path.to_path_buf()),
                message,
            };
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| failed(e.to_string()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| failed(e.to_string()))?
        }
        None => Config::infer().await.map_err(|e| Error::Kubeconfig {
            path: None,
            message: e.to_string(),
        })?,
    };
    event!(
        Level::DEBUG,
        cluster_url = %config.cluster_url,
        default_namespace = %config.default_namespace,
        "Loaded kubernetes client configuration."
    );
    Ok(config)
}

/// A plain client, without warning interception.
pub fn client(config: Config) -> Result<Client> {
    Client::try_from(config).map_err(Error::kube("building client"))
}
