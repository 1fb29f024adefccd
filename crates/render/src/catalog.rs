//! Template catalog contract and the in-memory catalog used by the CLI and tests.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tron_core::{TemplateDescriptor, TronError, TronResult};

/// Source of template descriptors per component type.
pub trait TemplateCatalog: Send + Sync {
    /// Enabled templates for `component_type`, ascending by `render_order`; ties keep the
    /// catalog's own order. Empty ⇒ `TronError::Configuration`.
    fn templates_for(&self, component_type: &str) -> TronResult<Vec<TemplateDescriptor>>;
}

/// Catalog held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: Vec<TemplateDescriptor>,
}

#[derive(Debug, Deserialize)]
struct IndexFile {
    templates: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    id: String,
    component_type: String,
    file: String,
    render_order: i32,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool { true }

fn builtin(id: &str, component_type: &str, render_order: i32, content: &str) -> TemplateDescriptor {
    TemplateDescriptor {
        id: id.to_string(),
        component_type: component_type.to_string(),
        content: content.to_string(),
        render_order,
        enabled: true,
    }
}

impl StaticCatalog {
    pub fn new(entries: Vec<TemplateDescriptor>) -> Self { Self { entries } }

    pub fn push(&mut self, descriptor: TemplateDescriptor) { self.entries.push(descriptor); }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn component_types(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|d| d.component_type.as_str()).collect()
    }

    /// Default templates shipped with Tron for `webapp`, `worker` and `cron` components.
    pub fn builtin() -> Self {
        Self::new(vec![
            builtin("webapp-deployment", "webapp", 1, include_str!("../templates/webapp/deployment.yaml.j2")),
            builtin("webapp-service", "webapp", 2, include_str!("../templates/webapp/service.yaml.j2")),
            builtin("webapp-hpa", "webapp", 3, include_str!("../templates/webapp/hpa.yaml.j2")),
            builtin("webapp-httproute", "webapp", 4, include_str!("../templates/webapp/httproute.yaml.j2")),
            builtin("webapp-tcproute", "webapp", 5, include_str!("../templates/webapp/tcproute.yaml.j2")),
            builtin("webapp-udproute", "webapp", 6, include_str!("../templates/webapp/udproute.yaml.j2")),
            builtin("worker-deployment", "worker", 1, include_str!("../templates/worker/deployment.yaml.j2")),
            builtin("worker-hpa", "worker", 2, include_str!("../templates/worker/hpa.yaml.j2")),
            builtin("cron-cronjob", "cron", 1, include_str!("../templates/cron/cron.yaml.j2")),
        ])
    }

    /// Load `<dir>/catalog.yaml`, whose entries point at template files relative to `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let index_path = dir.join("catalog.yaml");
        let raw = std::fs::read_to_string(&index_path)
            .with_context(|| format!("reading catalog index {}", index_path.display()))?;
        let index: IndexFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing catalog index {}", index_path.display()))?;
        let mut entries = Vec::with_capacity(index.templates.len());
        for e in index.templates {
            let path = dir.join(&e.file);
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading template '{}' from {}", e.id, path.display()))?;
            entries.push(TemplateDescriptor {
                id: e.id,
                component_type: e.component_type,
                content,
                render_order: e.render_order,
                enabled: e.enabled,
            });
        }
        Ok(Self::new(entries))
    }
}

impl TemplateCatalog for StaticCatalog {
    fn templates_for(&self, component_type: &str) -> TronResult<Vec<TemplateDescriptor>> {
        let mut out: Vec<TemplateDescriptor> = self
            .entries
            .iter()
            .filter(|d| d.enabled && d.component_type == component_type)
            .cloned()
            .collect();
        // stable: equal render_order keeps insertion order
        out.sort_by_key(|d| d.render_order);
        if out.is_empty() {
            return Err(TronError::Configuration { component_type: component_type.to_string() });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tpl(id: &str, ty: &str, order: i32, enabled: bool) -> TemplateDescriptor {
        TemplateDescriptor { id: id.into(), component_type: ty.into(), content: String::new(), render_order: order, enabled }
    }

    #[test]
    fn sorts_by_render_order_and_keeps_ties_in_insertion_order() {
        let cat = StaticCatalog::new(vec![
            tpl("c", "webapp", 3, true),
            tpl("a1", "webapp", 1, true),
            tpl("b", "webapp", 2, true),
            tpl("a2", "webapp", 1, true),
        ]);
        let ids: Vec<_> = cat.templates_for("webapp").unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a1", "a2", "b", "c"]);
    }

    #[test]
    fn filters_disabled_and_other_types() {
        let cat = StaticCatalog::new(vec![tpl("x", "webapp", 1, false), tpl("y", "cron", 1, true)]);
        let err = cat.templates_for("webapp").unwrap_err();
        assert!(matches!(err, TronError::Configuration { .. }));
        assert!(err.to_string().contains("webapp"));
        assert_eq!(cat.templates_for("cron").unwrap().len(), 1);
    }

    #[test]
    fn builtin_covers_all_component_types() {
        let cat = StaticCatalog::builtin();
        let types: Vec<_> = cat.component_types().into_iter().collect();
        assert_eq!(types, vec!["cron", "webapp", "worker"]);
        assert_eq!(cat.templates_for("webapp").unwrap().len(), 6);
    }
}
