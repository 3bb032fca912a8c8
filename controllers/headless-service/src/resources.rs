//! Builders for the objects derived from an annotated Pod.
//!
//! Every Pod that opts in gets a headless Service named after it and an
//! Endpoints object pointing at its IP. No selector is set on the Service, so
//! the Endpoints object is the only thing backing it.

use crate::error::ControllerError;
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointSubset, Endpoints, Pod, Service, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::fmt;

/// Default annotation that opts a Pod in.
pub const DEFAULT_POD_ANNOTATION: &str = "srcd.host/create-headless-service";

/// Value the annotation must carry, compared exactly.
pub const ANNOTATION_ENABLED: &str = "true";

/// `spec.clusterIP` sentinel for headless Services.
pub const HEADLESS_CLUSTER_IP: &str = "None";

/// Service names are DNS-1035 labels.
pub const MAX_SERVICE_NAME_LEN: usize = 63;

/// Namespace/name of a Pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    /// Build the key for a Pod. The namespace falls back to `default`.
    pub fn from_pod(pod: &Pod) -> Result<Self, ControllerError> {
        let name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| ControllerError::InvalidPod("Pod missing name".to_string()))?;
        let namespace = pod
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        Ok(Self { namespace, name })
    }

    /// Whether a Service may be named after this Pod.
    #[must_use]
    pub fn fits_service_name(&self) -> bool {
        self.name.len() <= MAX_SERVICE_NAME_LEN
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// True when `annotation` is present on the Pod with the exact value `"true"`.
#[must_use]
pub fn annotation_enabled(pod: &Pod, annotation: &str) -> bool {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(annotation))
        .is_some_and(|value| value == ANNOTATION_ENABLED)
}

/// The Pod's assigned IP, `None` until one is assigned.
#[must_use]
pub fn pod_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|status| status.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

/// IP of the first address of the first subset, if any.
#[must_use]
pub fn first_address_ip(endpoints: &Endpoints) -> Option<&str> {
    endpoints
        .subsets
        .as_ref()?
        .first()?
        .addresses
        .as_ref()?
        .first()
        .map(|address| address.ip.as_str())
}

fn managed_metadata(pod: &Pod, key: &PodKey) -> ObjectMeta {
    ObjectMeta {
        name: Some(key.name.clone()),
        namespace: Some(key.namespace.clone()),
        annotations: pod.metadata.annotations.clone(),
        ..Default::default()
    }
}

/// Headless Service named after the Pod, carrying the Pod's annotations.
#[must_use]
pub fn headless_service(pod: &Pod, key: &PodKey) -> Service {
    Service {
        metadata: managed_metadata(pod, key),
        spec: Some(ServiceSpec {
            cluster_ip: Some(HEADLESS_CLUSTER_IP.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Endpoints with a single subset holding a single address.
#[must_use]
pub fn endpoints_for(pod: &Pod, key: &PodKey, ip: &str) -> Endpoints {
    Endpoints {
        metadata: managed_metadata(pod, key),
        subsets: Some(vec![EndpointSubset {
            addresses: Some(vec![EndpointAddress {
                ip: ip.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
    }
}
