//! Kind dispatch: which REST resource a document is written to.

use std::collections::HashMap;

use tron_kubehub::ResourceType;

/// Well-known kinds with their group, preferred version and plural.
const WELL_KNOWN: [(&str, &str, &str, &str); 7] = [
    ("Deployment", "apps", "v1", "deployments"),
    ("Service", "", "v1", "services"),
    ("ConfigMap", "", "v1", "configmaps"),
    ("Secret", "", "v1", "secrets"),
    ("Ingress", "networking.k8s.io", "v1", "ingresses"),
    ("HorizontalPodAutoscaler", "autoscaling", "v2", "horizontalpodautoscalers"),
    ("CronJob", "batch", "v1", "cronjobs"),
];

/// Lower-cased kinds whose plural does not follow the suffix rules.
const IRREGULAR_PLURALS: [(&str, &str); 3] = [("endpoints", "endpoints"), ("podmetrics", "pods"), ("nodemetrics", "nodes")];

/// Plural REST name for `kind`.
///
/// `...ss` gains `es`, consonant + `y` becomes `ies`, a trailing `s` is kept, anything else gains `s`.
pub fn plural_for(kind: &str) -> String {
    let lower = kind.to_ascii_lowercase();
    if let Some((_, plural)) = IRREGULAR_PLURALS.iter().find(|(k, _)| *k == lower) {
        return plural.to_string();
    }
    if lower.ends_with("ss") {
        return format!("{}es", lower);
    }
    if let Some(stem) = lower.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{}ies", stem);
        }
    }
    if lower.ends_with('s') { lower } else { format!("{}s", lower) }
}

fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Fixed registry for well-known kinds; everything else is addressed as a custom resource.
#[derive(Debug, Clone)]
pub struct KindRegistry {
    well_known: HashMap<&'static str, ResourceType>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        let well_known = WELL_KNOWN
            .iter()
            .map(|(kind, group, version, plural)| (*kind, ResourceType::new(group, version, kind, plural)))
            .collect();
        Self { well_known }
    }
}

impl KindRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn is_well_known(&self, kind: &str) -> bool { self.well_known.contains_key(kind) }

    /// Resolve a document's `kind`/`apiVersion`. A well-known kind keeps the document's
    /// version when the group matches; a same-named kind from another group is generic.
    pub fn resolve(&self, kind: &str, api_version: &str) -> ResourceType {
        let (group, version) = split_api_version(api_version);
        match self.well_known.get(kind) {
            Some(known) if known.group == group => ResourceType::new(group, version, kind, &known.plural),
            _ => ResourceType::new(group, version, kind, &plural_for(kind)),
        }
    }
}
