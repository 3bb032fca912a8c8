//! ClusterClient trait for mocking
//!
//! This trait abstracts the Service and Endpoints calls the controller makes so
//! the reconciler can be unit tested without an API server. The concrete
//! `KubeClusterClient` implements it, and tests use `MockClusterClient`.

use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{Endpoints, Service};

/// Trait for the Service/Endpoints operations of the controller
///
/// All methods are namespaced. Missing objects are reported as
/// `ClusterError::NotFound` so callers can classify absence explicitly.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Services
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClusterError>;
    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, ClusterError>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    // Endpoints
    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints, ClusterError>;
    async fn create_endpoints(
        &self,
        namespace: &str,
        endpoints: &Endpoints,
    ) -> Result<Endpoints, ClusterError>;

    /// Replace the Endpoints object wholesale.
    ///
    /// If `endpoints.metadata.resource_version` is set the API server rejects
    /// the write with `ClusterError::Conflict` when the stored object has moved on.
    async fn replace_endpoints(
        &self,
        namespace: &str,
        name: &str,
        endpoints: &Endpoints,
    ) -> Result<Endpoints, ClusterError>;
    async fn delete_endpoints(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}
