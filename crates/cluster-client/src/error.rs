//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API server.
///
/// API failures are classified by status code so callers can tell a missing
/// object apart from a transient or permission failure.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The requested object does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// An object with the same name already exists (HTTP 409, reason AlreadyExists)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency check failed (HTTP 409, stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other error status returned by the API server
    #[error("Kubernetes API error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Message from the API server
        message: String,
    },

    /// Transport, serialization or client-side failure
    #[error("Kubernetes client error: {0}")]
    Kube(#[source] kube::Error),

    /// Client configuration could not be loaded
    #[error("Kubernetes configuration error: {0}")]
    Config(String),
}

impl ClusterError {
    /// Returns true if the API server reported the object as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(status) => match status.code {
                404 => ClusterError::NotFound(status.message.clone()),
                409 if status.reason == "AlreadyExists" => {
                    ClusterError::AlreadyExists(status.message.clone())
                }
                409 => ClusterError::Conflict(status.message.clone()),
                code => ClusterError::Api {
                    code,
                    message: status.message.clone(),
                },
            },
            other => ClusterError::Kube(other),
        }
    }
}
