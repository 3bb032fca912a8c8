//! Test utilities for unit testing the reconciler and watcher
//!
//! This module provides helpers for creating test Pods and a reconciler wired
//! to the in-memory cluster client.

use crate::reconciler::Reconciler;
use crate::resources::DEFAULT_POD_ANNOTATION;
use cluster_client::MockClusterClient;
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Helper to create a test Pod
///
/// `annotation` is the value of `DEFAULT_POD_ANNOTATION` (absent when `None`),
/// `ip` is `status.podIP` (no status at all when `None`).
pub fn create_test_pod(
    name: &str,
    namespace: &str,
    annotation: Option<&str>,
    ip: Option<&str>,
) -> Pod {
    let mut annotations = BTreeMap::new();
    annotations.insert("team".to_string(), "storage".to_string());
    if let Some(value) = annotation {
        annotations.insert(DEFAULT_POD_ANNOTATION.to_string(), value.to_string());
    }

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: None,
        status: ip.map(|ip| PodStatus {
            pod_ip: Some(ip.to_string()),
            ..Default::default()
        }),
    }
}

/// Helper to create an opted-in Pod with an IP
pub fn create_annotated_pod(name: &str, ip: &str) -> Pod {
    create_test_pod(name, "default", Some("true"), Some(ip))
}

/// Helper to create a reconciler backed by `mock`
pub fn create_test_reconciler(mock: &MockClusterClient) -> Reconciler {
    Reconciler::new(Arc::new(mock.clone()), DEFAULT_POD_ANNOTATION.to_string())
}
