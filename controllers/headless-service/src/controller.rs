//! Main controller implementation.
//!
//! This module contains the `Controller` struct that builds the Kubernetes
//! client, wires the Pod watcher to the reconciler and runs until a shutdown
//! signal arrives.

use crate::config::Config;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_client::KubeClusterClient;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for headless Service management.
#[derive(Debug)]
pub struct Controller {
    pod_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts watching Pods.
    pub async fn new(config: &Config) -> Result<Self, ControllerError> {
        info!("Initializing Headless Service Controller");

        // Single client shared by the watch and the reconciler
        let cluster_client = KubeClusterClient::connect(config.kube_context()).await?;

        let pod_api: Api<Pod> = match config.watch_namespace() {
            Some(ns) => Api::namespaced(cluster_client.kube_client(), ns),
            None => Api::all(cluster_client.kube_client()),
        };

        let reconciler = Reconciler::new(Arc::new(cluster_client), config.pod_annotation.clone());
        let watcher = Watcher::new(pod_api, Arc::new(reconciler), config.resync_period());

        let pod_watcher = tokio::spawn(async move { watcher.watch_pods().await });

        Ok(Self { pod_watcher })
    }

    /// Runs the controller until shutdown.
    ///
    /// Returns `Ok` on SIGINT/SIGTERM. A watcher that exits or panics is
    /// reported as a watch error.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Headless Service Controller running");

        tokio::select! {
            result = &mut self.pod_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Pod watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Pod watcher error: {}", e)))?;
            }
            signal = shutdown_signal() => {
                signal?;
                info!("Shutdown signal received, stopping pod watcher");
                self.pod_watcher.abort();
            }
        }

        Ok(())
    }
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<(), ControllerError> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
