//! Controller-specific error types.
//!
//! This module defines error types specific to the Headless Service Controller
//! that are not covered by upstream library errors.

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the Headless Service Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Service/Endpoints API error
    #[error("Cluster API error: {0}")]
    Cluster(#[from] ClusterError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pod object is missing data the controller needs
    #[error("Invalid pod: {0}")]
    InvalidPod(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Installing the shutdown signal handlers failed
    #[error("Signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}
