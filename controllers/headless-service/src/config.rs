//! Controller configuration.
//!
//! Every setting is a command line flag with an environment variable fallback,
//! so the same binary runs in-cluster from a Deployment's env block or locally
//! against a kubeconfig context.

use crate::error::ControllerError;
use crate::resources::DEFAULT_POD_ANNOTATION;
use clap::Parser;
use std::time::Duration;

/// Default period between full redeliveries of the Pod cache.
pub const DEFAULT_RESYNC_SECONDS: u64 = 60;

/// Command line and environment configuration.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "headless-service-controller",
    version,
    about = "Creates headless services so annotated pod hostnames resolve"
)]
pub struct Config {
    /// Load the kubeconfig for this context instead of the in-cluster identity
    #[arg(long, env = "KUBERNETES_CONTEXT")]
    pub context: Option<String>,

    /// Namespace to watch, all namespaces when empty
    #[arg(long, env = "NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Annotation that needs to be set to "true" for the service to be created
    #[arg(long = "pod-annotation", env = "POD_ANNOTATION", default_value = DEFAULT_POD_ANNOTATION)]
    pub pod_annotation: String,

    /// Seconds between redeliveries of every known pod, 0 disables
    #[arg(
        long = "resync-seconds",
        env = "RESYNC_SECONDS",
        default_value_t = DEFAULT_RESYNC_SECONDS
    )]
    pub resync_seconds: u64,
}

impl Config {
    /// Rejects settings the controller cannot run with.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.pod_annotation.trim().is_empty() {
            return Err(ControllerError::InvalidConfig(
                "pod annotation must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The kubeconfig context to use, `None` for in-cluster.
    pub fn kube_context(&self) -> Option<&str> {
        self.context.as_deref().filter(|context| !context.is_empty())
    }

    /// The namespace to watch, `None` for all namespaces.
    pub fn watch_namespace(&self) -> Option<&str> {
        Some(self.namespace.as_str()).filter(|namespace| !namespace.is_empty())
    }

    /// The resync period, `None` when disabled.
    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_seconds > 0).then(|| Duration::from_secs(self.resync_seconds))
    }
}
