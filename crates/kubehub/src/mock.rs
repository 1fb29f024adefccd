//! In-memory `Cluster` for tests: optimistic concurrency, namespaces, discovery, and
//! scripted failures, with a log of every call made.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value as Json;

use crate::cluster::{Cluster, ClusterError, ObjectTarget, ResourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Replace,
    Delete,
    List,
    GetNamespace,
    CreateNamespace,
    DeleteNamespace,
    Discovery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: Verb,
    /// Object kind, `Namespace` for namespace calls, or the group / group-version for discovery.
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug)]
struct Scripted {
    verb: Verb,
    kind: Option<String>,
    status: u16,
    remaining: u32,
}

type Key = (String, String, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<Key, Json>,
    namespaces: BTreeSet<String>,
    groups: BTreeMap<String, Vec<String>>,
    kinds: BTreeMap<String, Vec<String>>,
    discovery_down: bool,
    scripted: Vec<Scripted>,
    calls: Vec<Call>,
    next_rv: u64,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }

    fn record(&mut self, verb: Verb, kind: &str, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.calls.push(Call { verb, kind: kind.to_string(), namespace: namespace.to_string(), name: name.to_string() });
        let hit = self
            .scripted
            .iter_mut()
            .find(|s| s.remaining > 0 && s.verb == verb && s.kind.as_deref().map_or(true, |k| k == kind));
        match hit {
            Some(s) => {
                s.remaining -= 1;
                Err(ClusterError::api(s.status, format!("scripted {:?} failure", verb)))
            }
            None => Ok(()),
        }
    }

    fn served(&self, rt: &ResourceType) -> bool {
        rt.group.is_empty() || self.kinds.get(&rt.api_version()).map_or(false, |ks| ks.iter().any(|k| k == &rt.kind))
    }

    fn store(&mut self, key: Key, mut body: Json, generation: i64) -> Json {
        let rv = self.bump();
        if let Some(meta) = body.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.insert("resourceVersion".into(), Json::String(rv));
            meta.insert("generation".into(), Json::from(generation));
        }
        self.objects.insert(key, body.clone());
        body
    }
}

fn meta_str<'a>(body: &'a Json, field: &str) -> Option<&'a str> {
    body.get("metadata").and_then(|m| m.get(field)).and_then(|v| v.as_str())
}

fn not_found(what: &str, name: &str) -> ClusterError {
    ClusterError::api(404, format!("{} \"{}\" not found", what, name))
}

/// Simple in-memory mock implementation of `Cluster`.
#[derive(Debug, Default)]
pub struct MockCluster {
    state: Mutex<State>,
}

impl MockCluster {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(|e| e.into_inner()) }

    pub fn with_namespace(self, name: &str) -> Self {
        self.state().namespaces.insert(name.to_string());
        self
    }

    /// Seed an object (its namespace is created too); resourceVersion is assigned.
    pub fn with_object(self, body: Json) -> Self {
        self.insert(body);
        self
    }

    /// Serve `kinds` under `group_version` for discovery and listing.
    pub fn with_api_resources(self, group_version: &str, kinds: &[&str]) -> Self {
        {
            let mut st = self.state();
            if let Some((group, version)) = group_version.split_once('/') {
                let versions = st.groups.entry(group.to_string()).or_default();
                if !versions.iter().any(|v| v == version) {
                    versions.push(version.to_string());
                }
            }
            st.kinds.entry(group_version.to_string()).or_default().extend(kinds.iter().map(|k| k.to_string()));
        }
        self
    }

    /// Make every discovery call fail with 503, as an aggregated API in trouble would.
    pub fn with_discovery_down(self) -> Self {
        self.state().discovery_down = true;
        self
    }

    pub fn insert(&self, body: Json) {
        let kind = body.get("kind").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let ns = meta_str(&body, "namespace").unwrap_or_default().to_string();
        let name = meta_str(&body, "name").unwrap_or_default().to_string();
        let generation = body.get("metadata").and_then(|m| m.get("generation")).and_then(|g| g.as_i64()).unwrap_or(1);
        let mut st = self.state();
        st.namespaces.insert(ns.clone());
        st.store((kind, ns, name), body, generation);
    }

    /// Fail the next `times` calls of `verb` (restricted to `kind` when given) with `status`.
    pub fn fail(&self, verb: Verb, kind: Option<&str>, status: u16, times: u32) {
        self.state().scripted.push(Scripted { verb, kind: kind.map(str::to_string), status, remaining: times });
    }

    pub fn object(&self, kind: &str, namespace: &str, name: &str) -> Option<Json> {
        self.state().objects.get(&(kind.to_string(), namespace.to_string(), name.to_string())).cloned()
    }

    pub fn has_namespace(&self, name: &str) -> bool { self.state().namespaces.contains(name) }

    pub fn calls(&self) -> Vec<Call> { self.state().calls.clone() }

    pub fn count(&self, verb: Verb, kind: &str) -> usize {
        self.state().calls.iter().filter(|c| c.verb == verb && c.kind == kind).count()
    }

    pub fn clear_calls(&self) { self.state().calls.clear(); }
}

#[async_trait::async_trait]
impl Cluster for MockCluster {
    async fn get(&self, target: &ObjectTarget) -> Result<Json, ClusterError> {
        let mut st = self.state();
        st.record(Verb::Get, &target.resource.kind, &target.namespace, &target.name)?;
        let key = (target.resource.kind.clone(), target.namespace.clone(), target.name.clone());
        st.objects.get(&key).cloned().ok_or_else(|| not_found(&target.resource.plural, &target.name))
    }

    async fn create(&self, target: &ObjectTarget, body: &Json) -> Result<Json, ClusterError> {
        let mut st = self.state();
        st.record(Verb::Create, &target.resource.kind, &target.namespace, &target.name)?;
        if !st.namespaces.contains(&target.namespace) {
            return Err(not_found("namespaces", &target.namespace));
        }
        let name = match meta_str(body, "name") {
            Some(n) => n.to_string(),
            None => {
                let prefix = meta_str(body, "generateName").unwrap_or_default().to_string();
                format!("{}{}", prefix, st.next_rv + 1)
            }
        };
        let key = (target.resource.kind.clone(), target.namespace.clone(), name.clone());
        if st.objects.contains_key(&key) {
            return Err(ClusterError::api(409, format!("{} \"{}\" already exists", target.resource.plural, name)));
        }
        let mut body = body.clone();
        if let Some(meta) = body.get_mut("metadata").and_then(|m| m.as_object_mut()) {
            meta.insert("name".into(), Json::String(name));
        }
        Ok(st.store(key, body, 1))
    }

    async fn replace(&self, target: &ObjectTarget, body: &Json) -> Result<Json, ClusterError> {
        let mut st = self.state();
        st.record(Verb::Replace, &target.resource.kind, &target.namespace, &target.name)?;
        let key = (target.resource.kind.clone(), target.namespace.clone(), target.name.clone());
        let Some(current) = st.objects.get(&key) else {
            return Err(not_found(&target.resource.plural, &target.name));
        };
        let current_rv = meta_str(current, "resourceVersion").map(str::to_string);
        let generation = current.get("metadata").and_then(|m| m.get("generation")).and_then(|g| g.as_i64()).unwrap_or(1);
        if let Some(sent) = meta_str(body, "resourceVersion") {
            if current_rv.as_deref() != Some(sent) {
                return Err(ClusterError::api(
                    409,
                    "Operation cannot be fulfilled: the object has been modified; please apply your changes to the latest version and try again",
                ));
            }
        }
        Ok(st.store(key, body.clone(), generation + 1))
    }

    async fn delete(&self, target: &ObjectTarget) -> Result<(), ClusterError> {
        let mut st = self.state();
        st.record(Verb::Delete, &target.resource.kind, &target.namespace, &target.name)?;
        let key = (target.resource.kind.clone(), target.namespace.clone(), target.name.clone());
        st.objects.remove(&key).map(|_| ()).ok_or_else(|| not_found(&target.resource.plural, &target.name))
    }

    async fn list(&self, resource: &ResourceType, namespace: Option<&str>) -> Result<Vec<Json>, ClusterError> {
        let mut st = self.state();
        st.record(Verb::List, &resource.kind, namespace.unwrap_or_default(), "")?;
        if !st.served(resource) {
            return Err(ClusterError::api(404, format!("the server could not find the requested resource ({})", resource.plural)));
        }
        Ok(st
            .objects
            .iter()
            .filter(|((kind, ns, _), body)| {
                kind == &resource.kind
                    && namespace.map_or(true, |want| ns == want)
                    && body.get("apiVersion").and_then(|v| v.as_str()).map_or(true, |av| av == resource.api_version())
            })
            .map(|(_, body)| body.clone())
            .collect())
    }

    async fn get_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let mut st = self.state();
        st.record(Verb::GetNamespace, "Namespace", "", name)?;
        if st.namespaces.contains(name) { Ok(()) } else { Err(not_found("namespaces", name)) }
    }

    async fn create_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let mut st = self.state();
        st.record(Verb::CreateNamespace, "Namespace", "", name)?;
        if !st.namespaces.insert(name.to_string()) {
            return Err(ClusterError::api(409, format!("namespaces \"{}\" already exists", name)));
        }
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), ClusterError> {
        let mut st = self.state();
        st.record(Verb::DeleteNamespace, "Namespace", "", name)?;
        if !st.namespaces.remove(name) {
            return Err(not_found("namespaces", name));
        }
        st.objects.retain(|(_, ns, _), _| ns != name);
        Ok(())
    }

    async fn api_group_versions(&self, group: &str) -> Result<Option<Vec<String>>, ClusterError> {
        let mut st = self.state();
        st.record(Verb::Discovery, group, "", "")?;
        if st.discovery_down {
            return Err(ClusterError::api(503, "service unavailable"));
        }
        Ok(st.groups.get(group).cloned())
    }

    async fn api_resource_kinds(&self, group_version: &str) -> Result<Vec<String>, ClusterError> {
        let mut st = self.state();
        st.record(Verb::Discovery, group_version, "", "")?;
        if st.discovery_down {
            return Err(ClusterError::api(503, "service unavailable"));
        }
        st.kinds.get(group_version).cloned().ok_or_else(|| not_found("group version", group_version))
    }
}
