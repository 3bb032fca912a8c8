//! Mock ClusterClient for unit testing
//!
//! Stores Services and Endpoints in memory keyed by `(namespace, name)`,
//! assigns resource versions the way the API server does, records every call
//! and can be told to fail a given operation.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

type ObjectKey = (String, String);

/// Operations exposed by `ClusterClientTrait`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetService,
    CreateService,
    DeleteService,
    GetEndpoints,
    CreateEndpoints,
    ReplaceEndpoints,
    DeleteEndpoints,
}

impl Operation {
    /// Returns true for operations that change cluster state.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        !matches!(self, Operation::GetService | Operation::GetEndpoints)
    }
}

/// A recorded call against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub namespace: String,
    pub name: String,
}

/// Mock ClusterClient for testing
#[derive(Debug, Clone, Default)]
pub struct MockClusterClient {
    pub(crate) services: Arc<Mutex<HashMap<ObjectKey, Service>>>,
    pub(crate) endpoints: Arc<Mutex<HashMap<ObjectKey, Endpoints>>>,
    pub(crate) calls: Arc<Mutex<Vec<Call>>>,
    pub(crate) failing: Arc<Mutex<HashSet<Operation>>>,
    pub(crate) next_resource_version: Arc<Mutex<u64>>,
    pub(crate) replace_versions: Arc<Mutex<Vec<Option<String>>>>,
    pub(crate) pending_endpoints_write: Arc<Mutex<Option<(String, Endpoints)>>>,
}

impl MockClusterClient {
    /// Create an empty mock client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Service to the mock store (for test setup)
    pub fn add_service(&self, namespace: &str, service: Service) {
        let name = service.metadata.name.clone().unwrap_or_default();
        let service = self.stamp_service(namespace, service);
        self.services.lock().unwrap().insert(key(namespace, &name), service);
    }

    /// Add an Endpoints object to the mock store (for test setup)
    pub fn add_endpoints(&self, namespace: &str, endpoints: Endpoints) {
        let name = endpoints.metadata.name.clone().unwrap_or_default();
        let endpoints = self.stamp_endpoints(namespace, endpoints);
        self.endpoints.lock().unwrap().insert(key(namespace, &name), endpoints);
    }

    /// Make every subsequent call of `operation` fail with an HTTP 500
    pub fn fail_on(&self, operation: Operation) {
        self.failing.lock().unwrap().insert(operation);
    }

    /// Stop failing `operation`
    pub fn clear_failure(&self, operation: Operation) {
        self.failing.lock().unwrap().remove(&operation);
    }

    /// Store `endpoints` right after the next `get_endpoints` returns,
    /// as if another client wrote it between a read and the following write
    pub fn write_endpoints_after_next_get(&self, namespace: &str, endpoints: Endpoints) {
        *self.pending_endpoints_write.lock().unwrap() = Some((namespace.to_string(), endpoints));
    }

    /// `metadata.resourceVersion` of every `replace_endpoints` payload, in order
    #[must_use]
    pub fn replace_versions(&self) -> Vec<Option<String>> {
        self.replace_versions.lock().unwrap().clone()
    }

    /// Look up a stored Service
    #[must_use]
    pub fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        self.services.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Look up a stored Endpoints object
    #[must_use]
    pub fn endpoints(&self, namespace: &str, name: &str) -> Option<Endpoints> {
        self.endpoints.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Number of stored Services
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.lock().unwrap().len()
    }

    /// Number of stored Endpoints objects
    #[must_use]
    pub fn endpoints_count(&self) -> usize {
        self.endpoints.lock().unwrap().len()
    }

    /// All calls made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Operations of the calls that changed state, in order
    #[must_use]
    pub fn mutations(&self) -> Vec<Operation> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| call.operation)
            .filter(|operation| operation.is_mutation())
            .collect()
    }

    /// Forget recorded calls (setup calls are not recorded, this is for multi-step tests)
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(
        &self,
        operation: Operation,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        self.calls.lock().unwrap().push(Call {
            operation,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        if self.failing.lock().unwrap().contains(&operation) {
            return Err(ClusterError::Api {
                code: 500,
                message: format!("injected failure for {operation:?} {namespace}/{name}"),
            });
        }
        Ok(())
    }

    fn next_resource_version(&self) -> String {
        let mut version = self.next_resource_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    fn stamp_service(&self, namespace: &str, mut service: Service) -> Service {
        service.metadata.namespace = Some(namespace.to_string());
        service.metadata.resource_version = Some(self.next_resource_version());
        service
    }

    fn stamp_endpoints(&self, namespace: &str, mut endpoints: Endpoints) -> Endpoints {
        endpoints.metadata.namespace = Some(namespace.to_string());
        endpoints.metadata.resource_version = Some(self.next_resource_version());
        endpoints
    }
}

fn key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

fn not_found(kind: &str, name: &str) -> ClusterError {
    ClusterError::NotFound(format!("{kind} \"{name}\" not found"))
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service, ClusterError> {
        self.record(Operation::GetService, namespace, name)?;
        self.service(namespace, name).ok_or_else(|| not_found("services", name))
    }

    async fn create_service(
        &self,
        namespace: &str,
        service: &Service,
    ) -> Result<Service, ClusterError> {
        let name = service.metadata.name.clone().unwrap_or_default();
        self.record(Operation::CreateService, namespace, &name)?;
        let stored = self.stamp_service(namespace, service.clone());
        let mut services = self.services.lock().unwrap();
        if services.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::AlreadyExists(format!("services \"{name}\" already exists")));
        }
        services.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.record(Operation::DeleteService, namespace, name)?;
        self.services
            .lock()
            .unwrap()
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found("services", name))
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints, ClusterError> {
        self.record(Operation::GetEndpoints, namespace, name)?;
        let found = self.endpoints(namespace, name).ok_or_else(|| not_found("endpoints", name));
        let pending = self.pending_endpoints_write.lock().unwrap().take();
        if let Some((namespace, endpoints)) = pending {
            self.add_endpoints(&namespace, endpoints);
        }
        found
    }

    async fn create_endpoints(
        &self,
        namespace: &str,
        endpoints: &Endpoints,
    ) -> Result<Endpoints, ClusterError> {
        let name = endpoints.metadata.name.clone().unwrap_or_default();
        self.record(Operation::CreateEndpoints, namespace, &name)?;
        let stored = self.stamp_endpoints(namespace, endpoints.clone());
        let mut store = self.endpoints.lock().unwrap();
        if store.contains_key(&key(namespace, &name)) {
            return Err(ClusterError::AlreadyExists(format!("endpoints \"{name}\" already exists")));
        }
        store.insert(key(namespace, &name), stored.clone());
        Ok(stored)
    }

    async fn replace_endpoints(
        &self,
        namespace: &str,
        name: &str,
        endpoints: &Endpoints,
    ) -> Result<Endpoints, ClusterError> {
        self.record(Operation::ReplaceEndpoints, namespace, name)?;
        self.replace_versions
            .lock()
            .unwrap()
            .push(endpoints.metadata.resource_version.clone());
        let current_version = self
            .endpoints(namespace, name)
            .ok_or_else(|| not_found("endpoints", name))?
            .metadata
            .resource_version;
        if let Some(expected) = endpoints.metadata.resource_version.as_ref() {
            if current_version.as_ref() != Some(expected) {
                return Err(ClusterError::Conflict(format!(
                    "Operation cannot be fulfilled on endpoints \"{name}\": the object has been modified"
                )));
            }
        }
        let stored = self.stamp_endpoints(namespace, endpoints.clone());
        self.endpoints
            .lock()
            .unwrap()
            .insert(key(namespace, name), stored.clone());
        Ok(stored)
    }

    async fn delete_endpoints(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.record(Operation::DeleteEndpoints, namespace, name)?;
        self.endpoints
            .lock()
            .unwrap()
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| not_found("endpoints", name))
    }
}
