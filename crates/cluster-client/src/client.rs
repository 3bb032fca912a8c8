//! Kubernetes-backed implementation of `ClusterClientTrait`.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::api::{Api, DeleteParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use tracing::{debug, info};

/// Service/Endpoints client backed by a shared `kube::Client`.
///
/// The underlying client is cheap to clone and is reused for every call, so a
/// single instance is built at startup and injected into the reconciler.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Wrap an existing kube client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from either a kubeconfig context or the in-cluster identity.
    ///
    /// When `context` is `Some`, the kubeconfig is loaded from the default
    /// locations (`KUBECONFIG`, `~/.kube/config`) and the named context is
    /// selected. Otherwise the service account of the running pod is used.
    pub async fn connect(context: Option<&str>) -> Result<Self, ClusterError> {
        let config = match context {
            Some(context) => {
                info!("Loading kubeconfig for context {}", context);
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..KubeConfigOptions::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| {
                        ClusterError::Config(format!("kubeconfig context {context}: {e}"))
                    })?
            }
            None => {
                info!("Loading in-cluster configuration");
                Config::incluster()
                    .map_err(|e| ClusterError::Config(format!("in-cluster config: {e}")))?
            }
        };

        let client = Client::try_from(config)?;
        Ok(Self::new(client))
    }

    /// The shared kube client, for building watch streams.
    #[must_use]
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn endpoints(&self, namespace: &str) -> Api<Endpoints> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClusterError> {
        Ok(self.services(namespace).get(name).await?)
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, ClusterError> {
        let created = self.services(namespace).create(&PostParams::default(), service).await?;
        debug!(
            "Created Service {}/{}",
            namespace,
            created.metadata.name.as_deref().unwrap_or("<unknown>")
        );
        Ok(created)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.services(namespace).delete(name, &DeleteParams::default()).await?;
        debug!("Deleted Service {}/{}", namespace, name);
        Ok(())
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints, ClusterError> {
        Ok(self.endpoints(namespace).get(name).await?)
    }

    async fn create_endpoints(
        &self,
        namespace: &str,
        endpoints: &Endpoints,
    ) -> Result<Endpoints, ClusterError> {
        let created = self.endpoints(namespace).create(&PostParams::default(), endpoints).await?;
        debug!(
            "Created Endpoints {}/{}",
            namespace,
            created.metadata.name.as_deref().unwrap_or("<unknown>")
        );
        Ok(created)
    }

    async fn replace_endpoints(
        &self,
        namespace: &str,
        name: &str,
        endpoints: &Endpoints,
    ) -> Result<Endpoints, ClusterError> {
        let replaced = self
            .endpoints(namespace)
            .replace(name, &PostParams::default(), endpoints)
            .await?;
        debug!("Replaced Endpoints {}/{}", namespace, name);
        Ok(replaced)
    }

    async fn delete_endpoints(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.endpoints(namespace).delete(name, &DeleteParams::default()).await?;
        debug!("Deleted Endpoints {}/{}", namespace, name);
        Ok(())
    }
}
