//! Gateway API discovery: is the group served, which route kinds exist, and which
//! Gateway should routes attach to.

use serde_json::Value as Json;
use tracing::{debug, warn};
use tron_core::GatewayReference;

use crate::cluster::{Cluster, ResourceType};

pub const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

/// Namespaces probed for a Gateway before falling back to a cluster-wide list.
pub const GATEWAY_NAMESPACES: [&str; 3] = ["kube-system", "default", "gateway-system"];

/// Route resources managed by Tron, at the versions it renders.
pub fn route_types() -> [ResourceType; 3] {
    [
        ResourceType::new(GATEWAY_GROUP, "v1", "HTTPRoute", "httproutes"),
        ResourceType::new(GATEWAY_GROUP, "v1alpha2", "TCPRoute", "tcproutes"),
        ResourceType::new(GATEWAY_GROUP, "v1alpha2", "UDPRoute", "udproutes"),
    ]
}

/// True for one of the three route kinds under the Gateway API group.
pub fn is_route(kind: &str, api_version: &str) -> bool {
    let group = api_version.split_once('/').map(|(g, _)| g).unwrap_or_default();
    group == GATEWAY_GROUP && route_types().iter().any(|rt| rt.kind == kind)
}

pub async fn gateway_api_available(cluster: &dyn Cluster) -> bool {
    match cluster.api_group_versions(GATEWAY_GROUP).await {
        Ok(Some(versions)) => !versions.is_empty(),
        Ok(None) => false,
        Err(e) => {
            debug!(error = %e, "gateway api group probe failed");
            false
        }
    }
}

/// Kinds served under the Gateway API group, sorted and deduplicated.
///
/// When discovery itself errors, each route type is probed with a list call instead.
pub async fn gateway_api_kinds(cluster: &dyn Cluster) -> Vec<String> {
    match discovered_kinds(cluster).await {
        Ok(kinds) => kinds,
        Err(e) => {
            warn!(error = %e, "gateway api discovery failed; probing route types");
            probe_route_kinds(cluster).await
        }
    }
}

async fn discovered_kinds(cluster: &dyn Cluster) -> Result<Vec<String>, crate::ClusterError> {
    let Some(versions) = cluster.api_group_versions(GATEWAY_GROUP).await? else {
        return Ok(Vec::new());
    };
    let mut kinds = Vec::new();
    for v in versions {
        kinds.extend(cluster.api_resource_kinds(&format!("{}/{}", GATEWAY_GROUP, v)).await?);
    }
    kinds.sort();
    kinds.dedup();
    Ok(kinds)
}

async fn probe_route_kinds(cluster: &dyn Cluster) -> Vec<String> {
    let mut kinds = Vec::new();
    for rt in route_types() {
        match cluster.list(&rt, None).await {
            Ok(_) => kinds.push(rt.kind.clone()),
            Err(e) => debug!(kind = %rt.kind, error = %e, "route type not listable"),
        }
    }
    kinds.sort();
    kinds
}

fn reference_from(items: &[Json], namespace: Option<&str>) -> Option<GatewayReference> {
    items.iter().find_map(|gw| {
        let meta = gw.get("metadata")?;
        let name = meta.get("name")?.as_str()?;
        let ns = match namespace {
            Some(ns) => ns,
            None => meta.get("namespace")?.as_str()?,
        };
        Some(GatewayReference { namespace: ns.to_string(), name: name.to_string() })
    })
}

/// First Gateway found: v1 before v1beta1; for each version the well-known namespaces
/// in order, then any namespace. Errors are logged and the search moves on.
pub async fn find_gateway_reference(cluster: &dyn Cluster) -> Option<GatewayReference> {
    for version in ["v1", "v1beta1"] {
        let rt = ResourceType::new(GATEWAY_GROUP, version, "Gateway", "gateways");
        for ns in GATEWAY_NAMESPACES {
            match cluster.list(&rt, Some(ns)).await {
                Ok(items) => {
                    if let Some(found) = reference_from(&items, Some(ns)) {
                        debug!(namespace = %found.namespace, name = %found.name, version, "gateway found");
                        return Some(found);
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(namespace = %ns, version, error = %e, "listing gateways failed"),
            }
        }
        match cluster.list(&rt, None).await {
            Ok(items) => {
                if let Some(found) = reference_from(&items, None) {
                    debug!(namespace = %found.namespace, name = %found.name, version, "gateway found cluster-wide");
                    return Some(found);
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(version, error = %e, "listing gateways cluster-wide failed"),
        }
    }
    None
}
