//! Unit tests for the Pod reconciler

use crate::error::ControllerError;
use crate::resources::{
    HEADLESS_CLUSTER_IP, PodKey, endpoints_for, first_address_ip, headless_service,
};
use crate::test_utils::*;
use cluster_client::{ClusterError, MockClusterClient, Operation};
use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset};

fn seed(mock: &MockClusterClient, pod: &k8s_openapi::api::core::v1::Pod, ip: &str) {
    let key = PodKey::from_pod(pod).unwrap();
    mock.add_service(&key.namespace, headless_service(pod, &key));
    mock.add_endpoints(&key.namespace, endpoints_for(pod, &key, ip));
}

#[tokio::test]
async fn test_unannotated_pods_are_ignored() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);

    for annotation in [None, Some("false"), Some("TRUE"), Some("")] {
        for ip in [None, Some(""), Some("10.0.0.5")] {
            let pod = create_test_pod("web-0", "default", annotation, ip);
            reconciler.on_add(&pod).await.unwrap();
            reconciler.on_update(&pod).await.unwrap();
            reconciler.on_delete(&pod).await.unwrap();
        }
    }

    assert!(mock.calls().is_empty(), "unexpected calls: {:?}", mock.calls());
}

#[tokio::test]
async fn test_unannotated_delete_leaves_existing_objects() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    seed(&mock, &create_annotated_pod("web-0", "10.0.0.5"), "10.0.0.5");

    // Annotation was removed before the Pod went away
    let pod = create_test_pod("web-0", "default", None, Some("10.0.0.5"));
    reconciler.on_delete(&pod).await.unwrap();

    assert_eq!(mock.service_count(), 1);
    assert_eq!(mock.endpoints_count(), 1);
}

#[tokio::test]
async fn test_annotated_pod_without_ip_is_ignored() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);

    for ip in [None, Some("")] {
        let pod = create_test_pod("web-0", "default", Some("true"), ip);
        reconciler.on_add(&pod).await.unwrap();
        reconciler.on_update(&pod).await.unwrap();
    }

    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_on_add_creates_headless_service_and_endpoints() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");

    reconciler.on_add(&pod).await.unwrap();

    let service = mock.service("default", "web-0").expect("service created");
    assert_eq!(
        service.spec.as_ref().and_then(|s| s.cluster_ip.as_deref()),
        Some(HEADLESS_CLUSTER_IP)
    );
    assert_eq!(service.metadata.annotations, pod.metadata.annotations);

    let endpoints = mock.endpoints("default", "web-0").expect("endpoints created");
    let subsets = endpoints.subsets.as_ref().unwrap();
    assert_eq!(subsets.len(), 1);
    assert_eq!(subsets[0].addresses.as_ref().unwrap().len(), 1);
    assert_eq!(first_address_ip(&endpoints), Some("10.0.0.5"));
    assert_eq!(endpoints.metadata.annotations, pod.metadata.annotations);

    assert_eq!(mock.mutations(), vec![Operation::CreateService, Operation::CreateEndpoints]);
}

#[tokio::test]
async fn test_on_add_uses_pod_namespace() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_test_pod("db-0", "storage", Some("true"), Some("10.1.0.3"));

    reconciler.on_add(&pod).await.unwrap();

    assert!(mock.service("storage", "db-0").is_some());
    assert!(mock.service("default", "db-0").is_none());
    assert!(mock.calls().iter().all(|call| call.namespace == "storage"));
}

#[tokio::test]
async fn test_on_update_replaces_endpoints_on_ip_change() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);

    reconciler.on_add(&create_annotated_pod("web-0", "10.0.0.5")).await.unwrap();
    let service_before = mock.service("default", "web-0").unwrap();
    mock.clear_calls();

    reconciler.on_update(&create_annotated_pod("web-0", "10.0.0.9")).await.unwrap();

    let endpoints = mock.endpoints("default", "web-0").unwrap();
    assert_eq!(first_address_ip(&endpoints), Some("10.0.0.9"));
    assert_eq!(mock.mutations(), vec![Operation::ReplaceEndpoints]);
    assert_eq!(mock.service("default", "web-0").unwrap(), service_before);
}

#[tokio::test]
async fn test_on_update_replace_carries_fetched_resource_version() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    seed(&mock, &create_annotated_pod("web-0", "10.0.0.5"), "10.0.0.5");
    let fetched = mock.endpoints("default", "web-0").unwrap().metadata.resource_version;
    assert!(fetched.is_some());

    reconciler.on_update(&create_annotated_pod("web-0", "10.0.0.9")).await.unwrap();

    assert_eq!(mock.replace_versions(), vec![fetched]);
}

#[tokio::test]
async fn test_on_update_concurrent_endpoints_write_conflicts() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");
    let key = PodKey::from_pod(&pod).unwrap();
    seed(&mock, &pod, "10.0.0.5");

    // Another writer lands between our read and our replace
    mock.write_endpoints_after_next_get("default", endpoints_for(&pod, &key, "10.0.0.7"));

    let err = reconciler
        .on_update(&create_annotated_pod("web-0", "10.0.0.9"))
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Cluster(ClusterError::Conflict(_))));
    let endpoints = mock.endpoints("default", "web-0").unwrap();
    assert_eq!(first_address_ip(&endpoints), Some("10.0.0.7"));
}

#[tokio::test]
async fn test_on_update_endpoints_lookup_error_is_propagated() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    seed(&mock, &create_annotated_pod("web-0", "10.0.0.5"), "10.0.0.5");
    mock.fail_on(Operation::GetEndpoints);

    let err = reconciler
        .on_update(&create_annotated_pod("web-0", "10.0.0.9"))
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Cluster(ClusterError::Api { code: 500, .. })));
    assert!(mock.mutations().is_empty());
    let endpoints = mock.endpoints("default", "web-0").unwrap();
    assert_eq!(first_address_ip(&endpoints), Some("10.0.0.5"));
}

#[tokio::test]
async fn test_on_update_without_ip_change_is_read_only() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    seed(&mock, &create_annotated_pod("web-0", "10.0.0.5"), "10.0.0.5");

    reconciler.on_update(&create_annotated_pod("web-0", "10.0.0.5")).await.unwrap();

    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_on_update_overwrites_foreign_addresses() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");
    let key = PodKey::from_pod(&pod).unwrap();
    mock.add_service("default", headless_service(&pod, &key));

    let mut endpoints = endpoints_for(&pod, &key, "10.0.0.1");
    endpoints.subsets.as_mut().unwrap().push(EndpointSubset {
        addresses: Some(vec![EndpointAddress {
            ip: "10.0.0.5".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    });
    mock.add_endpoints("default", endpoints);

    reconciler.on_update(&pod).await.unwrap();

    let endpoints = mock.endpoints("default", "web-0").unwrap();
    assert_eq!(endpoints.subsets.as_ref().unwrap().len(), 1);
    assert_eq!(first_address_ip(&endpoints), Some("10.0.0.5"));
}

#[tokio::test]
async fn test_on_update_replaces_empty_endpoints() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");
    let key = PodKey::from_pod(&pod).unwrap();
    mock.add_service("default", headless_service(&pod, &key));

    let mut empty = endpoints_for(&pod, &key, "10.0.0.5");
    empty.subsets = Some(vec![]);
    mock.add_endpoints("default", empty);

    reconciler.on_update(&pod).await.unwrap();

    assert_eq!(first_address_ip(&mock.endpoints("default", "web-0").unwrap()), Some("10.0.0.5"));
    assert_eq!(mock.mutations(), vec![Operation::ReplaceEndpoints]);
}

#[tokio::test]
async fn test_on_update_without_service_creates_both() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);

    // IP assigned after the annotation was already set
    reconciler.on_add(&create_test_pod("web-0", "default", Some("true"), None)).await.unwrap();
    reconciler.on_update(&create_annotated_pod("web-0", "10.0.0.5")).await.unwrap();

    assert!(mock.service("default", "web-0").is_some());
    assert_eq!(first_address_ip(&mock.endpoints("default", "web-0").unwrap()), Some("10.0.0.5"));
    assert_eq!(mock.mutations(), vec![Operation::CreateService, Operation::CreateEndpoints]);
}

#[tokio::test]
async fn test_on_update_recreates_missing_endpoints() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");
    let key = PodKey::from_pod(&pod).unwrap();
    mock.add_service("default", headless_service(&pod, &key));

    reconciler.on_update(&pod).await.unwrap();

    assert_eq!(first_address_ip(&mock.endpoints("default", "web-0").unwrap()), Some("10.0.0.5"));
    assert_eq!(mock.mutations(), vec![Operation::CreateEndpoints]);
}

#[tokio::test]
async fn test_on_add_twice_is_idempotent() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");

    reconciler.on_add(&pod).await.unwrap();
    mock.clear_calls();
    reconciler.on_add(&pod).await.unwrap();

    assert_eq!(mock.service_count(), 1);
    assert_eq!(mock.endpoints_count(), 1);
    assert_eq!(first_address_ip(&mock.endpoints("default", "web-0").unwrap()), Some("10.0.0.5"));
    // Routed through the update path: looked up, nothing written
    let operations: Vec<Operation> = mock.calls().iter().map(|call| call.operation).collect();
    assert_eq!(operations, vec![Operation::GetService, Operation::GetEndpoints]);
}

#[tokio::test]
async fn test_on_add_with_existing_service_syncs_new_ip() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    seed(&mock, &create_annotated_pod("web-0", "10.0.0.5"), "10.0.0.5");

    reconciler.on_add(&create_annotated_pod("web-0", "10.0.0.9")).await.unwrap();

    assert_eq!(first_address_ip(&mock.endpoints("default", "web-0").unwrap()), Some("10.0.0.9"));
    assert_eq!(mock.mutations(), vec![Operation::ReplaceEndpoints]);
}

#[tokio::test]
async fn test_on_delete_removes_service_and_endpoints() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");
    reconciler.on_add(&pod).await.unwrap();
    mock.clear_calls();

    reconciler.on_delete(&pod).await.unwrap();

    assert_eq!(mock.service_count(), 0);
    assert_eq!(mock.endpoints_count(), 0);
    assert_eq!(mock.mutations(), vec![Operation::DeleteService, Operation::DeleteEndpoints]);
}

#[tokio::test]
async fn test_on_delete_ignores_missing_ip() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    seed(&mock, &create_annotated_pod("web-0", "10.0.0.5"), "10.0.0.5");

    // Terminated Pods can lose their IP before the delete event
    reconciler.on_delete(&create_test_pod("web-0", "default", Some("true"), None)).await.unwrap();

    assert_eq!(mock.service_count(), 0);
    assert_eq!(mock.endpoints_count(), 0);
}

#[tokio::test]
async fn test_on_delete_without_service_is_noop() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);

    reconciler.on_delete(&create_annotated_pod("web-0", "10.0.0.5")).await.unwrap();

    // Never routes into create/update
    assert_eq!(mock.mutations(), vec![Operation::DeleteEndpoints]);
    assert_eq!(mock.service_count(), 0);
}

#[tokio::test]
async fn test_on_delete_cleans_up_orphaned_endpoints() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");
    let key = PodKey::from_pod(&pod).unwrap();
    mock.add_endpoints("default", endpoints_for(&pod, &key, "10.0.0.5"));

    reconciler.on_delete(&pod).await.unwrap();

    assert_eq!(mock.endpoints_count(), 0);
}

#[tokio::test]
async fn test_on_delete_stops_when_service_delete_fails() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");
    seed(&mock, &pod, "10.0.0.5");
    mock.fail_on(Operation::DeleteService);

    let err = reconciler.on_delete(&pod).await.unwrap_err();

    assert!(matches!(err, ControllerError::Cluster(ClusterError::Api { code: 500, .. })));
    assert!(!mock.mutations().contains(&Operation::DeleteEndpoints));
    assert_eq!(mock.endpoints_count(), 1);
}

#[tokio::test]
async fn test_partial_create_is_not_rolled_back_and_heals_on_update() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");
    mock.fail_on(Operation::CreateEndpoints);

    let err = reconciler.on_add(&pod).await.unwrap_err();
    assert!(matches!(err, ControllerError::Cluster(_)));
    assert_eq!(mock.service_count(), 1);
    assert_eq!(mock.endpoints_count(), 0);

    mock.clear_failure(Operation::CreateEndpoints);
    reconciler.on_update(&pod).await.unwrap();
    assert_eq!(first_address_ip(&mock.endpoints("default", "web-0").unwrap()), Some("10.0.0.5"));
}

#[tokio::test]
async fn test_existence_check_propagates_non_not_found_errors() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    mock.fail_on(Operation::GetService);
    let pod = create_annotated_pod("web-0", "10.0.0.5");

    assert!(reconciler.on_add(&pod).await.is_err());
    assert!(reconciler.on_update(&pod).await.is_err());
    assert!(reconciler.on_delete(&pod).await.is_err());

    // A transient lookup failure must not be read as "absent"
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_create_conflict_is_surfaced() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod("web-0", "10.0.0.5");
    let key = PodKey::from_pod(&pod).unwrap();
    // Endpoints left over without a Service
    mock.add_endpoints("default", endpoints_for(&pod, &key, "10.0.0.1"));

    let err = reconciler.on_add(&pod).await.unwrap_err();

    assert!(matches!(err, ControllerError::Cluster(ClusterError::AlreadyExists(_))));
    assert_eq!(mock.service_count(), 1);
    // The next event takes the update path and fixes the address
    reconciler.on_update(&pod).await.unwrap();
    assert_eq!(first_address_ip(&mock.endpoints("default", "web-0").unwrap()), Some("10.0.0.5"));
}

#[tokio::test]
async fn test_overlong_pod_name_is_skipped() {
    let mock = MockClusterClient::new();
    let reconciler = create_test_reconciler(&mock);
    let pod = create_annotated_pod(&"a".repeat(64), "10.0.0.5");

    reconciler.on_add(&pod).await.unwrap();
    reconciler.on_update(&pod).await.unwrap();
    reconciler.on_delete(&pod).await.unwrap();

    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_custom_annotation_key() {
    let mock = MockClusterClient::new();
    let reconciler = crate::reconciler::Reconciler::new(
        std::sync::Arc::new(mock.clone()),
        "example.com/dns".to_string(),
    );
    let mut pod = create_annotated_pod("web-0", "10.0.0.5");

    // Default key is not the configured one
    reconciler.on_add(&pod).await.unwrap();
    assert!(mock.calls().is_empty());

    pod.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert("example.com/dns".to_string(), "true".to_string());
    reconciler.on_add(&pod).await.unwrap();
    assert_eq!(mock.service_count(), 1);
}
