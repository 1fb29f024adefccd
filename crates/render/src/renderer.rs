//! Manifest renderer: template text + variables ⇒ structured documents.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use metrics::counter;
use minijinja::Environment;
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};
use tron_core::{ComponentContext, GatewayReference, ManifestDocument, TronError, TronResult};

use crate::catalog::TemplateCatalog;

/// Secret manifest rendered ahead of the workload when a component declares secrets.
pub const BUILTIN_SECRETS_TEMPLATE: &str = include_str!("../templates/secret.yaml.j2");

/// Optional path to a replacement secrets template.
pub const SECRETS_TEMPLATE_ENV: &str = "TRON_SECRETS_TEMPLATE";

const SECRETS_TEMPLATE_ID: &str = "tron-secrets";

/// Outcome of rendering one template.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Document(ManifestDocument),
    /// The template intentionally produced nothing.
    Skipped,
}

impl Rendered {
    pub fn into_document(self) -> Option<ManifestDocument> {
        match self {
            Rendered::Document(d) => Some(d),
            Rendered::Skipped => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct GatewayVars<'a> {
    reference: &'a GatewayReference,
}

#[derive(Debug, Serialize)]
struct ClusterVars<'a> {
    gateway: GatewayVars<'a>,
}

/// Variables visible to templates: `application`, `environment`, `cluster.gateway.reference`.
#[derive(Debug, Serialize)]
pub struct RenderVariables<'a> {
    application: &'a ComponentContext,
    environment: &'a Map<String, Json>,
    cluster: ClusterVars<'a>,
}

impl<'a> RenderVariables<'a> {
    pub fn new(application: &'a ComponentContext, environment: &'a Map<String, Json>, gateway: &'a GatewayReference) -> Self {
        Self { application, environment, cluster: ClusterVars { gateway: GatewayVars { reference: gateway } } }
    }
}

fn b64encode(value: &str) -> String { STANDARD.encode(value.as_bytes()) }

/// Read the secrets template override at `path`. Unreadable ⇒ `None` with a warning.
pub fn load_secrets_template(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "secrets template unavailable; secrets will not be rendered");
            None
        }
    }
}

pub struct Renderer {
    env: Environment<'static>,
    secrets_template: Option<String>,
}

impl Default for Renderer {
    fn default() -> Self { Self::new() }
}

impl Renderer {
    /// Renderer with the built-in secrets template.
    pub fn new() -> Self { Self::with_secrets_template(Some(BUILTIN_SECRETS_TEMPLATE.to_string())) }

    /// `None` models an unavailable secrets template: secrets are then omitted, not an error.
    pub fn with_secrets_template(secrets_template: Option<String>) -> Self {
        let mut env = Environment::new();
        env.add_filter("b64encode", b64encode);
        Self { env, secrets_template }
    }

    /// Honors `TRON_SECRETS_TEMPLATE`, falling back to the built-in template when unset.
    pub fn from_env() -> Self {
        match std::env::var_os(SECRETS_TEMPLATE_ENV) {
            Some(p) => Self::with_secrets_template(load_secrets_template(Path::new(&p))),
            None => Self::new(),
        }
    }

    /// Render one template. Empty/whitespace output (or a YAML null) is `Rendered::Skipped`;
    /// anything else must parse as exactly one YAML document.
    pub fn render_one(&self, template_id: &str, text: &str, vars: &RenderVariables<'_>) -> TronResult<Rendered> {
        let out = self.env.render_str(text, vars).map_err(|e| TronError::TemplateParse {
            template: template_id.to_string(),
            reason: format!("render failed: {}", e),
        })?;
        if out.trim().is_empty() {
            counter!("render_skipped_total", 1u64);
            debug!(template = %template_id, "template rendered nothing");
            return Ok(Rendered::Skipped);
        }
        let yaml: serde_yaml::Value = serde_yaml::from_str(&out).map_err(|e| TronError::TemplateParse {
            template: template_id.to_string(),
            reason: format!("invalid YAML: {}", e),
        })?;
        let json = serde_json::to_value(yaml).map_err(|e| TronError::TemplateParse {
            template: template_id.to_string(),
            reason: format!("unsupported YAML structure: {}", e),
        })?;
        if json.is_null() {
            counter!("render_skipped_total", 1u64);
            return Ok(Rendered::Skipped);
        }
        counter!("render_documents_total", 1u64);
        Ok(Rendered::Document(ManifestDocument::new(json)))
    }

    /// Render every enabled template of the component's type, in catalog order.
    ///
    /// When the component declares secrets the Secret manifest comes first. `gateway` falls
    /// back to the context's own reference, then to an empty `{namespace: "", name: ""}`.
    /// Any template failure aborts the whole render.
    pub fn render_component(
        &self,
        catalog: &dyn TemplateCatalog,
        context: &ComponentContext,
        environment: &Map<String, Json>,
        gateway: Option<&GatewayReference>,
    ) -> TronResult<Vec<ManifestDocument>> {
        let templates = catalog.templates_for(&context.component_type)?;
        let empty = GatewayReference::default();
        let gateway = gateway.or(context.gateway_reference.as_ref()).unwrap_or(&empty);
        let vars = RenderVariables::new(context, environment, gateway);

        let mut docs = Vec::with_capacity(templates.len() + 1);
        if context.has_secrets() {
            match &self.secrets_template {
                Some(text) => {
                    if let Some(doc) = self.render_one(SECRETS_TEMPLATE_ID, text, &vars)?.into_document() {
                        docs.push(doc);
                    }
                }
                None => warn!(component = %context.component_name, "component declares secrets but no secrets template is available; skipping Secret"),
            }
        }
        for t in &templates {
            if let Some(doc) = self.render_one(&t.id, &t.content, &vars)?.into_document() {
                docs.push(doc);
            }
        }
        debug!(component = %context.component_name, component_type = %context.component_type, templates = templates.len(), documents = docs.len(), "component rendered");
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use tron_core::{ComponentSettings, SecretEntry, TemplateDescriptor};

    fn ctx() -> ComponentContext {
        ComponentContext {
            component_name: "api".into(),
            component_uuid: uuid::Uuid::nil(),
            component_type: "webapp".into(),
            application_name: "demo".into(),
            namespace_name: "tron-ns-demo".into(),
            environment: "prod".into(),
            image: "ghcr.io/acme/api".into(),
            version: "1.2.3".into(),
            settings: ComponentSettings::default(),
            gateway_reference: None,
        }
    }

    fn tpl(id: &str, order: i32, content: &str) -> TemplateDescriptor {
        TemplateDescriptor { id: id.into(), component_type: "webapp".into(), content: content.into(), render_order: order, enabled: true }
    }

    fn vars_render(r: &Renderer, text: &str) -> TronResult<Rendered> {
        let c = ctx();
        let env = Map::new();
        let gw = GatewayReference::default();
        r.render_one("t", text, &RenderVariables::new(&c, &env, &gw))
    }

    #[test]
    fn empty_and_whitespace_output_is_skipped() {
        let r = Renderer::new();
        assert_eq!(vars_render(&r, "").unwrap(), Rendered::Skipped);
        assert_eq!(vars_render(&r, "  \n\t\n").unwrap(), Rendered::Skipped);
        assert_eq!(vars_render(&r, "{% if false %}kind: X{% endif %}\n").unwrap(), Rendered::Skipped);
        assert_eq!(vars_render(&r, "# only a comment\n").unwrap(), Rendered::Skipped);
    }

    #[test]
    fn substitutes_variables() {
        let r = Renderer::new();
        let doc = vars_render(&r, "kind: ConfigMap\nmetadata:\n  name: {{ application.component_name }}\n  namespace: {{ application.namespace_name }}\n")
            .unwrap()
            .into_document()
            .unwrap();
        assert_eq!(doc.name(), Some("api"));
        assert_eq!(doc.namespace(), Some("tron-ns-demo"));
    }

    #[test]
    fn invalid_yaml_names_the_template() {
        let r = Renderer::new();
        let c = ctx();
        let env = Map::new();
        let gw = GatewayReference::default();
        let err = r.render_one("webapp-broken", "kind: [unclosed\n", &RenderVariables::new(&c, &env, &gw)).unwrap_err();
        match err {
            TronError::TemplateParse { template, .. } => assert_eq!(template, "webapp-broken"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn multiple_documents_are_rejected() {
        let r = Renderer::new();
        assert!(matches!(vars_render(&r, "kind: A\n---\nkind: B\n"), Err(TronError::TemplateParse { .. })));
    }

    #[test]
    fn b64encode_filter_is_available() {
        let r = Renderer::new();
        let doc = vars_render(&r, "data: {{ 'hi' | b64encode }}\n").unwrap().into_document().unwrap();
        assert_eq!(doc.as_json()["data"], "aGk=");
    }

    #[test]
    fn gateway_reference_defaults_to_empty_strings() {
        let r = Renderer::new();
        let doc = vars_render(&r, "ns: \"{{ cluster.gateway.reference.namespace }}\"\nname: \"{{ cluster.gateway.reference.name }}\"\n")
            .unwrap()
            .into_document()
            .unwrap();
        assert_eq!(doc.as_json()["ns"], "");
        assert_eq!(doc.as_json()["name"], "");
    }

    #[test]
    fn component_render_keeps_catalog_order_and_drops_skipped() {
        let cat = StaticCatalog::new(vec![
            tpl("svc", 2, "kind: Service\n"),
            tpl("none", 3, "{# nothing #}"),
            tpl("dep", 1, "kind: Deployment\n"),
        ]);
        let docs = Renderer::new().render_component(&cat, &ctx(), &Map::new(), None).unwrap();
        let kinds: Vec<_> = docs.iter().map(|d| d.kind().unwrap().to_string()).collect();
        assert_eq!(kinds, vec!["Deployment", "Service"]);
    }

    #[test]
    fn secrets_render_first() {
        let cat = StaticCatalog::new(vec![tpl("dep", 1, "kind: Deployment\n")]);
        let mut c = ctx();
        c.settings.secrets = vec![SecretEntry { key: "TOKEN".into(), value: "s3cr\"et".into() }];
        let docs = Renderer::new().render_component(&cat, &c, &Map::new(), None).unwrap();
        assert_eq!(docs[0].kind(), Some("Secret"));
        assert_eq!(docs[0].as_json()["stringData"]["TOKEN"], "s3cr\"et");
        assert_eq!(docs[1].kind(), Some("Deployment"));
    }

    #[test]
    fn missing_secrets_template_is_not_fatal() {
        let cat = StaticCatalog::new(vec![tpl("dep", 1, "kind: Deployment\n")]);
        let mut c = ctx();
        c.settings.secrets = vec![SecretEntry { key: "K".into(), value: "v".into() }];
        let docs = Renderer::with_secrets_template(None).render_component(&cat, &c, &Map::new(), None).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].kind(), Some("Deployment"));
    }

    #[test]
    fn unreadable_override_path_yields_none() {
        let p = std::env::temp_dir().join("tron-does-not-exist").join("secret.yaml.j2");
        assert!(load_secrets_template(&p).is_none());
    }

    #[test]
    fn parse_error_aborts_whole_render() {
        let cat = StaticCatalog::new(vec![tpl("dep", 1, "kind: Deployment\n"), tpl("bad", 2, "a: b: c\n")]);
        let err = Renderer::new().render_component(&cat, &ctx(), &Map::new(), None).unwrap_err();
        assert!(matches!(err, TronError::TemplateParse { ref template, .. } if template == "bad"));
    }

    #[test]
    fn explicit_gateway_overrides_context() {
        let cat = StaticCatalog::new(vec![tpl("gw", 1, "name: \"{{ cluster.gateway.reference.name }}\"\n")]);
        let mut c = ctx();
        c.gateway_reference = Some(GatewayReference { namespace: "a".into(), name: "from-context".into() });
        let r = Renderer::new();
        let docs = r.render_component(&cat, &c, &Map::new(), None).unwrap();
        assert_eq!(docs[0].as_json()["name"], "from-context");
        let explicit = GatewayReference { namespace: "b".into(), name: "explicit".into() };
        let docs = r.render_component(&cat, &c, &Map::new(), Some(&explicit)).unwrap();
        assert_eq!(docs[0].as_json()["name"], "explicit");
    }
}
