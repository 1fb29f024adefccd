#![forbid(unsafe_code)]

use serde_json::json;
use tron_core::GatewayReference;
use tron_kubehub::{find_gateway_reference, gateway_api_available, gateway_api_kinds, MockCluster};

fn gateway(api_version: &str, ns: &str, name: &str) -> serde_json::Value {
    json!({"apiVersion": api_version, "kind": "Gateway", "metadata": {"name": name, "namespace": ns}})
}

fn gw_ref(ns: &str, name: &str) -> GatewayReference {
    GatewayReference { namespace: ns.into(), name: name.into() }
}

#[tokio::test]
async fn availability_follows_group_discovery() {
    let served = MockCluster::new().with_api_resources("gateway.networking.k8s.io/v1", &["Gateway", "HTTPRoute"]);
    assert!(gateway_api_available(&served).await);
    assert!(!gateway_api_available(&MockCluster::new()).await);
    let down = MockCluster::new()
        .with_api_resources("gateway.networking.k8s.io/v1", &["Gateway"])
        .with_discovery_down();
    assert!(!gateway_api_available(&down).await);
}

#[tokio::test]
async fn kinds_are_merged_across_versions() {
    let mock = MockCluster::new()
        .with_api_resources("gateway.networking.k8s.io/v1", &["HTTPRoute", "Gateway", "GatewayClass"])
        .with_api_resources("gateway.networking.k8s.io/v1alpha2", &["TCPRoute", "UDPRoute", "HTTPRoute"]);
    assert_eq!(gateway_api_kinds(&mock).await, vec!["Gateway", "GatewayClass", "HTTPRoute", "TCPRoute", "UDPRoute"]);
    assert!(gateway_api_kinds(&MockCluster::new()).await.is_empty());
}

#[tokio::test]
async fn kinds_fall_back_to_probing_routes() {
    let mock = MockCluster::new()
        .with_api_resources("gateway.networking.k8s.io/v1", &["HTTPRoute"])
        .with_api_resources("gateway.networking.k8s.io/v1alpha2", &["TCPRoute"])
        .with_discovery_down();
    assert_eq!(gateway_api_kinds(&mock).await, vec!["HTTPRoute", "TCPRoute"]);
}

#[tokio::test]
async fn well_known_namespaces_win_in_order() {
    let mock = MockCluster::new()
        .with_api_resources("gateway.networking.k8s.io/v1", &["Gateway"])
        .with_object(gateway("gateway.networking.k8s.io/v1", "default", "shared"))
        .with_object(gateway("gateway.networking.k8s.io/v1", "kube-system", "system"))
        .with_object(gateway("gateway.networking.k8s.io/v1", "aaa", "elsewhere"));
    assert_eq!(find_gateway_reference(&mock).await, Some(gw_ref("kube-system", "system")));
}

#[tokio::test]
async fn falls_back_to_any_namespace() {
    let mock = MockCluster::new()
        .with_api_resources("gateway.networking.k8s.io/v1", &["Gateway"])
        .with_object(gateway("gateway.networking.k8s.io/v1", "infra", "edge"));
    assert_eq!(find_gateway_reference(&mock).await, Some(gw_ref("infra", "edge")));
}

#[tokio::test]
async fn older_version_is_tried_when_v1_is_not_served() {
    let mock = MockCluster::new()
        .with_api_resources("gateway.networking.k8s.io/v1beta1", &["Gateway"])
        .with_object(gateway("gateway.networking.k8s.io/v1beta1", "gateway-system", "legacy"));
    assert_eq!(find_gateway_reference(&mock).await, Some(gw_ref("gateway-system", "legacy")));
}

#[tokio::test]
async fn no_gateway_yields_none() {
    let mock = MockCluster::new().with_api_resources("gateway.networking.k8s.io/v1", &["Gateway"]);
    assert_eq!(find_gateway_reference(&mock).await, None);
    assert_eq!(find_gateway_reference(&MockCluster::new()).await, None);
}
