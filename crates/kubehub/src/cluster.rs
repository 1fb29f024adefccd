//! The cluster API seam: resource addressing, errors, and the `Cluster` trait.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tron_core::ObjectRef;

/// Group/version/kind plus the REST plural, resolved before any call is made.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl ResourceType {
    pub fn new(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self { group: group.to_string(), version: version.to_string(), kind: kind.to_string(), plural: plural.to_string() }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }

    /// `/api/{version}` for the core group, `/apis/{group}/{version}` otherwise.
    pub fn api_prefix(&self) -> String {
        if self.group.is_empty() { format!("/api/{}", self.version) } else { format!("/apis/{}/{}", self.group, self.version) }
    }

    pub fn collection_path(&self, namespace: &str) -> String {
        format!("{}/namespaces/{}/{}", self.api_prefix(), namespace, self.plural)
    }
}

/// One addressable object. `name` may be empty for a create that relies on `generateName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectTarget {
    pub resource: ResourceType,
    pub namespace: String,
    pub name: String,
}

impl ObjectTarget {
    pub fn new(resource: ResourceType, namespace: &str, name: &str) -> Self {
        Self { resource, namespace: namespace.to_string(), name: name.to_string() }
    }

    pub fn path(&self) -> String {
        let base = self.resource.collection_path(&self.namespace);
        if self.name.is_empty() { base } else { format!("{}/{}", base, self.name) }
    }

    pub fn object_ref(&self) -> ObjectRef { ObjectRef::new(&self.resource.kind, &self.namespace, &self.name) }
}

/// Failure of a single cluster call. `status` is `None` when no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", describe(.status, .message))]
pub struct ClusterError {
    pub status: Option<u16>,
    pub message: String,
}

fn describe(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => message.to_string(),
    }
}

impl ClusterError {
    pub fn api(status: u16, message: impl Into<String>) -> Self { Self { status: Some(status), message: message.into() } }
    pub fn transport(message: impl Into<String>) -> Self { Self { status: None, message: message.into() } }
    pub fn is_not_found(&self) -> bool { self.status == Some(404) }
    pub fn is_conflict(&self) -> bool { self.status == Some(409) }
}

impl From<kube::Error> for ClusterError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ae) => ClusterError::api(ae.code, ae.message),
            other => ClusterError::transport(other.to_string()),
        }
    }
}

/// Cluster API operations used by rendering-time discovery and the reconciliation engine.
///
/// Object bodies travel as JSON; `resourceVersion` is passed through untouched.
#[async_trait::async_trait]
pub trait Cluster: Send + Sync {
    async fn get(&self, target: &ObjectTarget) -> Result<Json, ClusterError>;
    async fn create(&self, target: &ObjectTarget, body: &Json) -> Result<Json, ClusterError>;
    async fn replace(&self, target: &ObjectTarget, body: &Json) -> Result<Json, ClusterError>;
    async fn delete(&self, target: &ObjectTarget) -> Result<(), ClusterError>;
    /// List one resource type in `namespace`, or across all namespaces when `None`.
    async fn list(&self, resource: &ResourceType, namespace: Option<&str>) -> Result<Vec<Json>, ClusterError>;

    async fn get_namespace(&self, name: &str) -> Result<(), ClusterError>;
    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError>;
    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError>;

    /// Served versions of an API group, `None` when the group is not served at all.
    async fn api_group_versions(&self, group: &str) -> Result<Option<Vec<String>>, ClusterError>;
    /// Kinds served under `group/version` (subresources excluded).
    async fn api_resource_kinds(&self, group_version: &str) -> Result<Vec<String>, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_for_core_and_grouped_resources() {
        let cm = ResourceType::new("", "v1", "ConfigMap", "configmaps");
        assert_eq!(cm.api_version(), "v1");
        assert_eq!(ObjectTarget::new(cm, "ns", "x").path(), "/api/v1/namespaces/ns/configmaps/x");

        let route = ResourceType::new("gateway.networking.k8s.io", "v1", "HTTPRoute", "httproutes");
        assert_eq!(route.api_version(), "gateway.networking.k8s.io/v1");
        assert_eq!(route.collection_path("tron-ns-a"), "/apis/gateway.networking.k8s.io/v1/namespaces/tron-ns-a/httproutes");
    }

    #[test]
    fn error_classification() {
        assert!(ClusterError::api(404, "gone").is_not_found());
        assert!(ClusterError::api(409, "stale").is_conflict());
        let t = ClusterError::transport("connection reset");
        assert!(!t.is_not_found() && !t.is_conflict());
        assert_eq!(ClusterError::api(500, "boom").to_string(), "HTTP 500: boom");
    }
}
