//! Headless Service Controller
//!
//! Makes Pod hostnames resolvable in cluster DNS.
//!
//! This controller watches Pods annotated with
//! `srcd.host/create-headless-service: "true"` (configurable) and gives each
//! one a headless Service and an Endpoints object of the same name pointing at
//! the Pod IP. Both objects are removed when the Pod is deleted.

mod config;
mod controller;
mod error;
mod reconciler;
mod resources;
mod watcher;
#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod reconciler_test;

use crate::config::Config;
use crate::error::ControllerError;
use clap::Parser;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // kube's rustls stack needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    let config = Config::parse();
    config.validate()?;

    info!("Starting Headless Service Controller");
    info!("Configuration:");
    info!("  Kubernetes context: {}", config.kube_context().unwrap_or("in-cluster"));
    info!("  Namespace: {}", config.watch_namespace().unwrap_or("all namespaces"));
    info!("  Pod annotation: {}", config.pod_annotation);
    info!(
        "  Resync period: {}",
        config
            .resync_period()
            .map_or_else(|| "disabled".to_string(), |period| format!("{}s", period.as_secs()))
    );

    // Initialize and run controller
    let controller = Controller::new(&config).await?;
    controller.run().await?;

    info!("Headless Service Controller stopped");
    Ok(())
}
