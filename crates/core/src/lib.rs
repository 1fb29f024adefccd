//! Tron core types: component context, manifest documents, and the error taxonomy.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use uuid::Uuid;

mod error;

pub use error::{TronError, TronResult};

/// One entry of an external template catalog. The core only reads these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateDescriptor {
    pub id: String,
    pub component_type: String,
    pub content: String,
    pub render_order: i32,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool { true }

/// Pointer to a pre-existing ingress gateway object. Not owned by Tron.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayReference {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// Secret key/value pair. `Debug` never prints the value.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretEntry {
    pub key: String,
    pub value: String,
}

impl fmt::Debug for SecretEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretEntry").field("key", &self.key).field("value", &"<redacted>").finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Exposure {
    /// `http`, `tcp` or `udp`
    #[serde(rename = "type")]
    pub kind: String,
    pub port: Option<u16>,
    /// `cluster`, `private` or `public`
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Autoscaling {
    pub min: u32,
    pub max: u32,
}

/// Per-component settings exposed to templates as `application.settings`.
///
/// Unknown keys (healthcheck, custom metrics, ...) are kept in `extra` and flattened back
/// into the template variables unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComponentSettings {
    #[serde(default)]
    pub envs: Vec<EnvVar>,
    #[serde(default)]
    pub secrets: Vec<SecretEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure: Option<Exposure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// CPU limit in cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    /// Memory limit in MiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_scaling_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_scaling_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaling: Option<Autoscaling>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// Immutable per-call description of the component being rendered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentContext {
    pub component_name: String,
    pub component_uuid: Uuid,
    /// `webapp`, `worker` or `cron`
    pub component_type: String,
    pub application_name: String,
    pub namespace_name: String,
    #[serde(default)]
    pub environment: String,
    pub image: String,
    pub version: String,
    #[serde(default)]
    pub settings: ComponentSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_reference: Option<GatewayReference>,
}

impl ComponentContext {
    pub fn has_secrets(&self) -> bool { !self.settings.secrets.is_empty() }
}

/// Apply operation requested by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Upsert,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Operation {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "upsert" => Ok(Operation::Upsert),
            "delete" => Ok(Operation::Delete),
            other => Err(format!("unknown operation '{}' (expect create|update|upsert|delete)", other)),
        }
    }
}

/// Identity of one cluster object, carried in errors and reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
        Self { kind: kind.to_string(), namespace: namespace.to_string(), name: name.to_string() }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} '{}'", self.kind, self.name)
        } else {
            write!(f, "{} '{}/{}'", self.kind, self.namespace, self.name)
        }
    }
}

/// A parsed structured document. May be anything YAML can express until validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestDocument(Json);

/// Borrowed view of a document that passed validation.
#[derive(Debug, Clone, Copy)]
pub struct DocumentView<'a> {
    pub kind: &'a str,
    pub api_version: &'a str,
    pub namespace: &'a str,
    pub name: Option<&'a str>,
    pub body: &'a Json,
}

impl DocumentView<'_> {
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.kind, self.namespace, self.name.unwrap_or_default())
    }
}

impl ManifestDocument {
    pub fn new(value: Json) -> Self { Self(value) }
    pub fn as_json(&self) -> &Json { &self.0 }
    pub fn into_json(self) -> Json { self.0 }

    fn str_at(&self, path: &[&str]) -> Option<&str> {
        let mut cur = &self.0;
        for seg in path { cur = cur.get(seg)?; }
        cur.as_str().filter(|s| !s.is_empty())
    }

    pub fn kind(&self) -> Option<&str> { self.str_at(&["kind"]) }
    pub fn api_version(&self) -> Option<&str> { self.str_at(&["apiVersion"]) }
    pub fn name(&self) -> Option<&str> { self.str_at(&["metadata", "name"]) }
    pub fn namespace(&self) -> Option<&str> { self.str_at(&["metadata", "namespace"]) }
    /// Opaque conflict token; never interpreted.
    pub fn resource_version(&self) -> Option<&str> { self.str_at(&["metadata", "resourceVersion"]) }

    /// Validate for the engine. `Ok(None)` means the document is not a mapping and is skipped.
    ///
    /// `kind`, `apiVersion` and `metadata.namespace` are always required; `metadata.name` is
    /// required for every operation except `create`.
    pub fn validate(&self, operation: Operation) -> TronResult<Option<DocumentView<'_>>> {
        if !self.0.is_object() { return Ok(None); }
        let kind = self.kind().ok_or_else(|| TronError::Validation("document missing kind".into()))?;
        let api_version = self
            .api_version()
            .ok_or_else(|| TronError::Validation(format!("{} document missing apiVersion", kind)))?;
        let name = self.name();
        let namespace = self.namespace().ok_or_else(|| {
            TronError::Validation(format!("{} '{}' missing metadata.namespace", kind, name.unwrap_or("?")))
        })?;
        if name.is_none() && operation != Operation::Create {
            return Err(TronError::Validation(format!("{} in '{}' missing metadata.name (required for {})", kind, namespace, operation)));
        }
        Ok(Some(DocumentView { kind, api_version, namespace, name, body: &self.0 }))
    }
}

impl From<Json> for ManifestDocument {
    fn from(v: Json) -> Self { Self(v) }
}
