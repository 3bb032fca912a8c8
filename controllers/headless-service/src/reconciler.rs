//! Reconciliation logic for annotated Pods.
//!
//! Each Pod that carries the opt-in annotation with the value `"true"` and
//! has an IP is mirrored by a headless Service and an Endpoints object of the
//! same name. The three entry points map to Pod watch events:
//!
//! - `on_add`: create both objects, or sync the Endpoints if the Service exists
//! - `on_update`: keep the Endpoints address equal to the Pod IP, creating
//!   both objects if the Service is missing
//! - `on_delete`: remove the Service, then the Endpoints
//!
//! Every path re-derives the desired state from the Pod, so replaying an event
//! converges instead of duplicating objects.

use crate::error::ControllerError;
use crate::resources::{
    PodKey, annotation_enabled, endpoints_for, first_address_ip, headless_service, pod_ip,
};
use crate::watcher::PodEventHandler;
use cluster_client::{ClusterClientTrait, ClusterError};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconciles the headless Service and Endpoints of annotated Pods.
pub struct Reconciler {
    client: Arc<dyn ClusterClientTrait>,
    annotation: String,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("annotation", &self.annotation)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(client: Arc<dyn ClusterClientTrait>, annotation: String) -> Self {
        Self { client, annotation }
    }

    /// Handles a newly observed Pod.
    pub async fn on_add(&self, pod: &Pod) -> Result<(), ControllerError> {
        let key = PodKey::from_pod(pod)?;
        debug!("Setting up headless service for pod {}", key);

        let Some(ip) = self.qualifying_ip(pod, &key) else {
            return Ok(());
        };

        if self.service_exists(&key).await? {
            info!("Pod {} already has a service, syncing endpoints", key);
            return self.sync_endpoints(pod, &key, ip).await;
        }

        self.create_resources(pod, &key, ip).await
    }

    /// Handles a change to a known Pod.
    pub async fn on_update(&self, pod: &Pod) -> Result<(), ControllerError> {
        let key = PodKey::from_pod(pod)?;
        debug!("Updating headless service for pod {}", key);

        let Some(ip) = self.qualifying_ip(pod, &key) else {
            return Ok(());
        };

        if !self.service_exists(&key).await? {
            info!("Pod {} has no service, creating it", key);
            return self.create_resources(pod, &key, ip).await;
        }

        self.sync_endpoints(pod, &key, ip).await
    }

    /// Handles a deleted Pod.
    ///
    /// A missing Service is not an error. Endpoints left behind by an earlier
    /// partial failure are removed either way.
    pub async fn on_delete(&self, pod: &Pod) -> Result<(), ControllerError> {
        let key = PodKey::from_pod(pod)?;
        debug!("Deleting headless service for pod {}", key);

        if !annotation_enabled(pod, &self.annotation) {
            debug!("Pod {} doesn't have annotation {} set, skipping", key, self.annotation);
            return Ok(());
        }
        if !key.fits_service_name() {
            debug!("Pod {} name is too long to have a service, skipping", key);
            return Ok(());
        }

        if self.service_exists(&key).await? {
            ignore_not_found(self.client.delete_service(&key.namespace, &key.name).await)?;
            info!("Deleted service {}", key);
        } else {
            debug!("Pod {} has no service, cleaning up endpoints only", key);
        }

        match self.client.delete_endpoints(&key.namespace, &key.name).await {
            Ok(()) => {
                info!("Deleted endpoints {}", key);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the Pod IP when the Pod is opted in and has an IP.
    fn qualifying_ip<'a>(&self, pod: &'a Pod, key: &PodKey) -> Option<&'a str> {
        if !annotation_enabled(pod, &self.annotation) {
            debug!("Pod {} doesn't have annotation {} set, skipping", key, self.annotation);
            return None;
        }
        let Some(ip) = pod_ip(pod) else {
            debug!("Pod {} doesn't have an IP yet, skipping", key);
            return None;
        };
        if !key.fits_service_name() {
            warn!(
                "Pod {} name is longer than {} characters, cannot create a service for it",
                key,
                crate::resources::MAX_SERVICE_NAME_LEN
            );
            return None;
        }
        Some(ip)
    }

    /// Only `NotFound` means the Service is absent; other errors are propagated.
    async fn service_exists(&self, key: &PodKey) -> Result<bool, ControllerError> {
        match self.client.get_service(&key.namespace, &key.name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates the Service, then the Endpoints. A failed Endpoints create is
    /// not rolled back; the next update event recreates it.
    async fn create_resources(
        &self,
        pod: &Pod,
        key: &PodKey,
        ip: &str,
    ) -> Result<(), ControllerError> {
        self.client
            .create_service(&key.namespace, &headless_service(pod, key))
            .await?;
        info!("Created headless service {}", key);

        self.client
            .create_endpoints(&key.namespace, &endpoints_for(pod, key, ip))
            .await?;
        info!("Created endpoints {} -> {}", key, ip);

        Ok(())
    }

    /// Replaces the Endpoints when its first address is not the Pod IP.
    ///
    /// The replacement drops any other subsets or addresses. It carries the
    /// fetched resourceVersion, so a concurrent write fails with a conflict.
    async fn sync_endpoints(
        &self,
        pod: &Pod,
        key: &PodKey,
        ip: &str,
    ) -> Result<(), ControllerError> {
        let current = match self.client.get_endpoints(&key.namespace, &key.name).await {
            Ok(endpoints) => endpoints,
            Err(e) if e.is_not_found() => {
                info!("Service {} has no endpoints, creating them", key);
                self.client
                    .create_endpoints(&key.namespace, &endpoints_for(pod, key, ip))
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if first_address_ip(&current) == Some(ip) {
            debug!("Endpoints {} already point at {}", key, ip);
            return Ok(());
        }

        info!("Pod {} has a new IP {}, updating endpoints", key, ip);
        let mut desired = endpoints_for(pod, key, ip);
        desired.metadata.resource_version = current.metadata.resource_version;
        self.client
            .replace_endpoints(&key.namespace, &key.name, &desired)
            .await?;

        Ok(())
    }
}

fn ignore_not_found(result: Result<(), ClusterError>) -> Result<(), ClusterError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[async_trait::async_trait]
impl PodEventHandler for Reconciler {
    async fn on_add(&self, pod: &Pod) -> Result<(), ControllerError> {
        Reconciler::on_add(self, pod).await
    }

    async fn on_update(&self, pod: &Pod) -> Result<(), ControllerError> {
        Reconciler::on_update(self, pod).await
    }

    async fn on_delete(&self, pod: &Pod) -> Result<(), ControllerError> {
        Reconciler::on_delete(self, pod).await
    }
}
