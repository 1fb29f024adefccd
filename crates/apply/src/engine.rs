//! The reconciliation engine: one-shot, ordered, sequential application of manifest documents.

use std::collections::BTreeSet;
use std::sync::Arc;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, info, warn};
use tron_core::{ManifestDocument, ObjectRef, Operation, TronError, TronResult};
use tron_kubehub::{is_route, route_types, Cluster, ClusterError, ObjectTarget};
use tron_namespace::NamespaceGuard;

use crate::kinds::KindRegistry;
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};

/// What one successful `apply` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub operation: Operation,
    pub created: Vec<ObjectRef>,
    pub updated: Vec<ObjectRef>,
    pub deleted: Vec<ObjectRef>,
    pub already_absent: Vec<ObjectRef>,
    /// Documents that were not mappings (null, scalars, lists).
    pub skipped: usize,
    pub orphans_deleted: Vec<ObjectRef>,
}

impl ApplyReport {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            already_absent: Vec::new(),
            skipped: 0,
            orphans_deleted: Vec::new(),
        }
    }

    pub fn applied(&self) -> usize { self.created.len() + self.updated.len() + self.deleted.len() + self.already_absent.len() }
}

struct Planned<'a> {
    target: ObjectTarget,
    api_version: &'a str,
    body: &'a Json,
}

enum Written {
    Created(Json),
    Updated,
}

enum Attempt {
    Done(Written),
    Conflict,
}

fn transport(target: &ObjectTarget, operation: Operation, e: ClusterError) -> TronError {
    TronError::Transport { target: target.object_ref(), operation, status: e.status, body: e.message }
}

fn namespace_transport(name: &str, operation: Operation, e: ClusterError) -> TronError {
    TronError::Transport { target: ObjectRef::new("Namespace", "", name), operation, status: e.status, body: e.message }
}

fn meta_str<'a>(v: &'a Json, field: &str) -> Option<&'a str> {
    v.get("metadata").and_then(|m| m.get(field)).and_then(|f| f.as_str())
}

/// Copy the live object's conflict token into `desired`. For Deployments on upsert, also keep
/// the live replica count when `desired` leaves it to the cluster, plus the live generation.
fn carry_forward(desired: &mut Json, live: &Json, preserve_workload: bool) {
    let Some(meta) = desired.get_mut("metadata").and_then(|m| m.as_object_mut()) else { return };
    if let Some(rv) = meta_str(live, "resourceVersion") {
        meta.insert("resourceVersion".into(), Json::String(rv.to_string()));
    }
    if !preserve_workload {
        return;
    }
    if let Some(generation) = live.get("metadata").and_then(|m| m.get("generation")).filter(|g| !g.is_null()) {
        meta.insert("generation".into(), generation.clone());
    }
    let live_replicas = live.get("spec").and_then(|s| s.get("replicas")).filter(|r| !r.is_null()).cloned();
    if let (Some(replicas), Some(spec)) = (live_replicas, desired.get_mut("spec").and_then(|s| s.as_object_mut())) {
        if !spec.contains_key("replicas") {
            spec.insert("replicas".into(), replicas);
        }
    }
}

/// Applies document sequences to one cluster. Holds no state between calls.
pub struct Engine {
    cluster: Arc<dyn Cluster>,
    guard: NamespaceGuard,
    kinds: KindRegistry,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
}

impl Engine {
    pub fn new(cluster: Arc<dyn Cluster>, guard: NamespaceGuard) -> Self {
        Self { cluster, guard, kinds: KindRegistry::new(), sleeper: Arc::new(TokioSleeper), retry: RetryPolicy::default() }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn guard(&self) -> &NamespaceGuard { &self.guard }

    pub fn cluster(&self) -> &Arc<dyn Cluster> { &self.cluster }

    /// Apply `documents` in order with `operation`.
    ///
    /// Every document is validated and its namespace checked against the guard before the first
    /// cluster call. Processing stops at the first failing document; earlier writes stay.
    pub async fn apply(&self, documents: &[ManifestDocument], operation: Operation) -> TronResult<ApplyReport> {
        let t0 = std::time::Instant::now();
        let mut report = ApplyReport::new(operation);

        let mut plan = Vec::with_capacity(documents.len());
        for doc in documents {
            let Some(view) = doc.validate(operation)? else {
                report.skipped += 1;
                continue;
            };
            self.guard.check_creatable(view.namespace)?;
            let resource = self.kinds.resolve(view.kind, view.api_version);
            plan.push(Planned {
                target: ObjectTarget::new(resource, view.namespace, view.name.unwrap_or_default()),
                api_version: view.api_version,
                body: view.body,
            });
        }
        if report.skipped > 0 {
            debug!(skipped = report.skipped, "non-mapping documents skipped");
        }

        if operation == Operation::Upsert {
            report.orphans_deleted = self.delete_orphaned_routes(&plan).await;
        }

        let mut ensured: BTreeSet<&str> = BTreeSet::new();
        for item in &plan {
            let ns = item.target.namespace.as_str();
            if ensured.insert(ns) {
                if let Err(e) = self.ensure_namespace(ns).await {
                    counter!("apply_err", 1u64);
                    return Err(e);
                }
            }
            let res = self.apply_one(item, operation, &mut report).await;
            counter!("apply_documents_total", 1u64, "op" => operation.as_str());
            if let Err(e) = res {
                counter!("apply_err", 1u64);
                warn!(object = %item.target.object_ref(), op = %operation, error = %e, "apply stopped");
                return Err(e);
            }
        }

        histogram!("apply_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(
            op = %operation,
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            absent = report.already_absent.len(),
            orphans = report.orphans_deleted.len(),
            "apply finished"
        );
        Ok(report)
    }

    async fn apply_one(&self, item: &Planned<'_>, operation: Operation, report: &mut ApplyReport) -> TronResult<()> {
        let target = &item.target;
        match operation {
            Operation::Create => {
                let created = self.cluster.create(target, item.body).await.map_err(|e| transport(target, operation, e))?;
                report.created.push(created_ref(target, &created));
            }
            Operation::Delete => match self.cluster.delete(target).await {
                Ok(()) => report.deleted.push(target.object_ref()),
                Err(e) if e.is_not_found() => {
                    debug!(object = %target.object_ref(), "already absent");
                    report.already_absent.push(target.object_ref());
                }
                Err(e) => return Err(transport(target, operation, e)),
            },
            Operation::Update | Operation::Upsert => match self.write_with_retry(item, operation).await? {
                Written::Created(created) => report.created.push(created_ref(target, &created)),
                Written::Updated => report.updated.push(target.object_ref()),
            },
        }
        Ok(())
    }

    /// Read-modify-write under one shared attempt budget.
    async fn write_with_retry(&self, item: &Planned<'_>, operation: Operation) -> TronResult<Written> {
        let max = self.retry.max_attempts.max(1);
        for attempt in 1..=max {
            match self.write_once(item, operation).await? {
                Attempt::Done(w) => return Ok(w),
                Attempt::Conflict => {
                    counter!("apply_conflicts_total", 1u64);
                    if attempt < max {
                        let delay = self.retry.delay_after(attempt);
                        debug!(object = %item.target.object_ref(), attempt, delay_ms = delay.as_millis() as u64, "conflict; retrying");
                        self.sleeper.sleep(delay).await;
                    }
                }
            }
        }
        Err(TronError::ConflictExhausted { target: item.target.object_ref(), operation, attempts: max })
    }

    async fn write_once(&self, item: &Planned<'_>, operation: Operation) -> TronResult<Attempt> {
        let target = &item.target;
        let preserve_workload = operation == Operation::Upsert && target.resource.kind == "Deployment";
        let mut desired = item.body.clone();
        match self.cluster.get(target).await {
            Ok(live) => carry_forward(&mut desired, &live, preserve_workload),
            Err(e) if e.is_not_found() => return self.create_missing(item, operation).await,
            Err(e) if preserve_workload => {
                warn!(object = %target.object_ref(), error = %e, "could not read live deployment; replicas not preserved");
            }
            Err(e) => return Err(transport(target, operation, e)),
        }
        match self.cluster.replace(target, &desired).await {
            Ok(_) => Ok(Attempt::Done(Written::Updated)),
            Err(e) if e.is_conflict() => Ok(Attempt::Conflict),
            Err(e) if e.is_not_found() => self.create_missing(item, operation).await,
            Err(e) => Err(transport(target, operation, e)),
        }
    }

    async fn create_missing(&self, item: &Planned<'_>, operation: Operation) -> TronResult<Attempt> {
        let target = &item.target;
        if operation == Operation::Update {
            return Err(TronError::NotFoundOnUpdate { target: target.object_ref() });
        }
        match self.cluster.create(target, item.body).await {
            Ok(created) => Ok(Attempt::Done(Written::Created(created))),
            // someone else created it between our read and write
            Err(e) if e.is_conflict() => Ok(Attempt::Conflict),
            Err(e) => Err(transport(target, operation, e)),
        }
    }

    /// Best-effort removal of route objects the component no longer declares. Never fails.
    async fn delete_orphaned_routes(&self, plan: &[Planned<'_>]) -> Vec<ObjectRef> {
        let primary = plan
            .iter()
            .find(|p| is_route(&p.target.resource.kind, p.api_version))
            .or_else(|| plan.iter().find(|p| !p.target.name.is_empty()));
        let Some(primary) = primary else { return Vec::new() };
        if primary.target.name.is_empty() {
            return Vec::new();
        }
        let declared: BTreeSet<&str> = plan
            .iter()
            .filter(|p| is_route(&p.target.resource.kind, p.api_version))
            .map(|p| p.target.resource.kind.as_str())
            .collect();

        let mut deleted = Vec::new();
        for rt in route_types() {
            if declared.contains(rt.kind.as_str()) {
                continue;
            }
            let target = ObjectTarget::new(rt, &primary.target.namespace, &primary.target.name);
            match self.cluster.delete(&target).await {
                Ok(()) => {
                    counter!("apply_orphans_deleted_total", 1u64);
                    info!(object = %target.object_ref(), "deleted orphaned route");
                    deleted.push(target.object_ref());
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(object = %target.object_ref(), error = %e, "orphaned route cleanup failed"),
            }
        }
        deleted
    }

    /// Make sure `name` exists, creating it if the guard allows.
    pub async fn ensure_namespace(&self, name: &str) -> TronResult<()> {
        self.guard.check_creatable(name)?;
        match self.cluster.get_namespace(name).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(namespace_transport(name, Operation::Create, e)),
        }
        match self.cluster.create_namespace(name).await {
            Ok(()) => {
                info!(namespace = %name, "namespace created");
                Ok(())
            }
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(namespace_transport(name, Operation::Create, e)),
        }
    }

    /// Delete a namespace after both guard checks. Returns `false` when it was already gone.
    pub async fn delete_namespace(&self, name: &str, legacy_override: bool) -> TronResult<bool> {
        self.guard.check_deletable(name, legacy_override)?;
        match self.cluster.delete_namespace(name).await {
            Ok(()) => {
                info!(namespace = %name, legacy = legacy_override, "namespace deleted");
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(namespace_transport(name, Operation::Delete, e)),
        }
    }
}

fn created_ref(target: &ObjectTarget, created: &Json) -> ObjectRef {
    let name = meta_str(created, "name").unwrap_or(&target.name);
    ObjectRef::new(&target.resource.kind, &target.namespace, name)
}
