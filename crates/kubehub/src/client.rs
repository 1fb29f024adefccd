//! kube-rs backed `Cluster` and its connection settings.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    core::{ApiResource, DynamicObject},
    Client,
};
use secrecy::SecretString;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::cluster::{Cluster, ClusterError, ObjectTarget, ResourceType};

pub const CLUSTER_URL_ENV: &str = "TRON_CLUSTER_URL";
pub const CLUSTER_TOKEN_ENV: &str = "TRON_CLUSTER_TOKEN";
pub const INSECURE_TLS_ENV: &str = "TRON_INSECURE_SKIP_TLS_VERIFY";

/// Where and how to reach the cluster API.
///
/// Without `url` the ambient kubeconfig or in-cluster configuration is used.
/// TLS verification stays on unless `accept_invalid_certs` is set explicitly.
#[derive(Clone, Default)]
pub struct ClusterConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub accept_invalid_certs: bool,
}

impl std::fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|s| {
            let s = s.trim().to_ascii_lowercase();
            s == "1" || s == "true" || s == "yes"
        })
        .unwrap_or(false)
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl ClusterConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_nonempty(CLUSTER_URL_ENV),
            token: env_nonempty(CLUSTER_TOKEN_ENV),
            accept_invalid_certs: env_flag(INSECURE_TLS_ENV),
        }
    }

    pub async fn client(&self) -> Result<Client> {
        let Some(url) = self.url.as_deref() else {
            debug!("no cluster url configured; using kubeconfig or in-cluster config");
            return Client::try_default().await.context("loading default kube config");
        };
        let cluster_url = url.parse().with_context(|| format!("invalid cluster url '{}'", url))?;
        let mut config = kube::Config::new(cluster_url);
        config.accept_invalid_certs = self.accept_invalid_certs;
        if self.accept_invalid_certs {
            warn!(url = %url, "TLS certificate verification disabled");
        }
        if let Some(token) = &self.token {
            config.auth_info.token = Some(SecretString::new(token.clone()));
        }
        Client::try_from(config).context("building kube client")
    }
}

/// `Cluster` over a live API server.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

fn api_resource(rt: &ResourceType) -> ApiResource {
    ApiResource {
        group: rt.group.clone(),
        version: rt.version.clone(),
        api_version: rt.api_version(),
        kind: rt.kind.clone(),
        plural: rt.plural.clone(),
    }
}

fn to_dynamic(body: &Json) -> Result<DynamicObject, ClusterError> {
    serde_json::from_value(body.clone()).map_err(|e| ClusterError::transport(format!("invalid object body: {}", e)))
}

fn to_json(obj: &DynamicObject) -> Result<Json, ClusterError> {
    let mut raw = serde_json::to_value(obj).map_err(|e| ClusterError::transport(format!("serializing object: {}", e)))?;
    strip_managed_fields(&mut raw);
    Ok(raw)
}

fn strip_managed_fields(v: &mut Json) {
    if let Some(meta) = v.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        meta.remove("managedFields");
    }
}

impl KubeCluster {
    pub fn new(client: Client) -> Self { Self { client } }

    pub async fn connect(cfg: &ClusterConfig) -> Result<Self> {
        let client = cfg.client().await?;
        info!(url = ?cfg.url, "cluster client ready");
        Ok(Self::new(client))
    }

    fn dynamic(&self, rt: &ResourceType, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api_resource(rt);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn namespaces(&self) -> Api<Namespace> { Api::all(self.client.clone()) }
}

#[async_trait::async_trait]
impl Cluster for KubeCluster {
    async fn get(&self, target: &ObjectTarget) -> Result<Json, ClusterError> {
        let obj = self.dynamic(&target.resource, Some(&target.namespace)).get(&target.name).await?;
        to_json(&obj)
    }

    async fn create(&self, target: &ObjectTarget, body: &Json) -> Result<Json, ClusterError> {
        let obj = to_dynamic(body)?;
        let created = self.dynamic(&target.resource, Some(&target.namespace)).create(&PostParams::default(), &obj).await?;
        to_json(&created)
    }

    async fn replace(&self, target: &ObjectTarget, body: &Json) -> Result<Json, ClusterError> {
        let obj = to_dynamic(body)?;
        let replaced = self
            .dynamic(&target.resource, Some(&target.namespace))
            .replace(&target.name, &PostParams::default(), &obj)
            .await?;
        to_json(&replaced)
    }

    async fn delete(&self, target: &ObjectTarget) -> Result<(), ClusterError> {
        self.dynamic(&target.resource, Some(&target.namespace))
            .delete(&target.name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn list(&self, resource: &ResourceType, namespace: Option<&str>) -> Result<Vec<Json>, ClusterError> {
        let list = self.dynamic(resource, namespace).list(&ListParams::default()).await?;
        list.items.iter().map(to_json).collect()
    }

    async fn get_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.namespaces().get(name).await?;
        Ok(())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let ns = Namespace {
            metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
            ..Default::default()
        };
        self.namespaces().create(&PostParams::default(), &ns).await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        self.namespaces().delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn api_group_versions(&self, group: &str) -> Result<Option<Vec<String>>, ClusterError> {
        let groups = self.client.list_api_groups().await?;
        Ok(groups
            .groups
            .into_iter()
            .find(|g| g.name == group)
            .map(|g| g.versions.into_iter().map(|v| v.version).collect()))
    }

    async fn api_resource_kinds(&self, group_version: &str) -> Result<Vec<String>, ClusterError> {
        let list = self.client.list_api_group_resources(group_version).await?;
        let mut kinds: Vec<String> = list
            .resources
            .into_iter()
            .filter(|r| !r.name.contains('/'))
            .map(|r| r.kind)
            .collect();
        kinds.sort();
        kinds.dedup();
        Ok(kinds)
    }
}
