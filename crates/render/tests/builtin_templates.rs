#![forbid(unsafe_code)]

use serde_json::{json, Map, Value as Json};
use tron_core::{Autoscaling, ComponentContext, ComponentSettings, EnvVar, Exposure, GatewayReference, Operation, SecretEntry, TemplateDescriptor};
use tron_render::{Renderer, StaticCatalog, TemplateCatalog};

fn component(ty: &str, settings: ComponentSettings) -> ComponentContext {
    ComponentContext {
        component_name: "api".into(),
        component_uuid: uuid::Uuid::nil(),
        component_type: ty.into(),
        application_name: "demo".into(),
        namespace_name: "tron-ns-demo".into(),
        environment: "staging".into(),
        image: "ghcr.io/acme/api".into(),
        version: "2.0.0".into(),
        settings,
        gateway_reference: None,
    }
}

fn kinds(docs: &[tron_core::ManifestDocument]) -> Vec<String> {
    docs.iter().map(|d| d.kind().unwrap_or("?").to_string()).collect()
}

fn http_exposure() -> Option<Exposure> {
    Some(Exposure { kind: "http".into(), port: Some(8080), visibility: Some("public".into()) })
}

#[test]
fn webapp_with_gateway_renders_route() {
    let settings = ComponentSettings {
        exposure: http_exposure(),
        envs: vec![EnvVar { key: "RUST_LOG".into(), value: "info".into() }],
        ..Default::default()
    };
    let gw = GatewayReference { namespace: "gateway-system".into(), name: "public".into() };
    let docs = Renderer::new().render_component(&StaticCatalog::builtin(), &component("webapp", settings), &Map::new(), Some(&gw)).unwrap();
    assert_eq!(kinds(&docs), vec!["Deployment", "Service", "HTTPRoute"]);

    let dep = docs[0].as_json();
    assert_eq!(dep["spec"]["replicas"], 1);
    assert_eq!(dep["spec"]["template"]["spec"]["containers"][0]["image"], "ghcr.io/acme/api:2.0.0");
    assert_eq!(dep["spec"]["template"]["spec"]["containers"][0]["env"][0]["name"], "RUST_LOG");

    let route = docs[2].as_json();
    assert_eq!(route["apiVersion"], "gateway.networking.k8s.io/v1");
    assert_eq!(route["spec"]["parentRefs"][0], json!({"name": "public", "namespace": "gateway-system"}));
    assert_eq!(route["spec"]["rules"][0]["backendRefs"][0]["port"], 8080);
}

#[test]
fn webapp_without_gateway_has_no_route() {
    let settings = ComponentSettings { exposure: http_exposure(), ..Default::default() };
    let docs = Renderer::new().render_component(&StaticCatalog::builtin(), &component("webapp", settings), &Map::new(), None).unwrap();
    assert_eq!(kinds(&docs), vec!["Deployment", "Service"]);
}

#[test]
fn autoscaled_webapp_leaves_replicas_to_the_cluster() {
    let settings = ComponentSettings {
        exposure: Some(Exposure { kind: "tcp".into(), port: Some(5432), visibility: Some("private".into()) }),
        autoscaling: Some(Autoscaling { min: 2, max: 6 }),
        cpu_scaling_threshold: Some(70),
        ..Default::default()
    };
    let gw = GatewayReference { namespace: "gw".into(), name: "private".into() };
    let docs = Renderer::new().render_component(&StaticCatalog::builtin(), &component("webapp", settings), &Map::new(), Some(&gw)).unwrap();
    assert_eq!(kinds(&docs), vec!["Deployment", "Service", "HorizontalPodAutoscaler", "TCPRoute"]);
    assert!(docs[0].as_json()["spec"].get("replicas").is_none());
    let hpa = docs[2].as_json();
    assert_eq!(hpa["spec"]["minReplicas"], 2);
    assert_eq!(hpa["spec"]["maxReplicas"], 6);
    assert_eq!(hpa["spec"]["metrics"][0]["resource"]["target"]["averageUtilization"], 70);
}

#[test]
fn disabled_workload_skips_deployment() {
    let mut env = Map::new();
    env.insert("disable_workload".into(), Json::Bool(true));
    let docs = Renderer::new().render_component(&StaticCatalog::builtin(), &component("worker", ComponentSettings::default()), &env, None).unwrap();
    assert!(docs.is_empty());
}

#[test]
fn cron_with_secrets_puts_secret_first() {
    let settings = ComponentSettings {
        schedule: Some("*/5 * * * *".into()),
        command: Some(vec!["/bin/job".into(), "--once".into()]),
        secrets: vec![SecretEntry { key: "API_KEY".into(), value: "abc".into() }],
        ..Default::default()
    };
    let docs = Renderer::new().render_component(&StaticCatalog::builtin(), &component("cron", settings), &Map::new(), None).unwrap();
    assert_eq!(kinds(&docs), vec!["Secret", "CronJob"]);
    let cron = docs[1].as_json();
    assert_eq!(cron["spec"]["schedule"], "*/5 * * * *");
    assert_eq!(cron["spec"]["suspend"], false);
    let container = &cron["spec"]["jobTemplate"]["spec"]["template"]["spec"]["containers"][0];
    assert_eq!(container["command"], json!(["/bin/job", "--once"]));
    assert_eq!(container["envFrom"][0]["secretRef"]["name"], "api");
}

#[test]
fn rendered_order_follows_render_order() {
    let cat = StaticCatalog::builtin();
    let settings = ComponentSettings {
        exposure: http_exposure(),
        autoscaling: Some(Autoscaling { min: 1, max: 3 }),
        ..Default::default()
    };
    let gw = GatewayReference { namespace: "gw".into(), name: "public".into() };
    let docs = Renderer::new().render_component(&cat, &component("webapp", settings), &Map::new(), Some(&gw)).unwrap();
    let templates = cat.templates_for("webapp").unwrap();
    let order_of = |kind: &str| -> i32 {
        templates
            .iter()
            .find(|t| t.content.contains(&format!("kind: {}", kind)))
            .map(|t| t.render_order)
            .unwrap()
    };
    let orders: Vec<i32> = docs.iter().map(|d| order_of(d.kind().unwrap())).collect();
    assert!(orders.windows(2).all(|w| w[0] <= w[1]), "orders={:?}", orders);
}

#[test]
fn catalog_loads_from_directory_index() {
    let dir = std::env::temp_dir().join(format!("tron-catalog-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(dir.join("custom")).unwrap();
    std::fs::write(dir.join("custom/cm.yaml.j2"), "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {{ application.component_name }}\n  namespace: {{ application.namespace_name }}\n").unwrap();
    std::fs::write(
        dir.join("catalog.yaml"),
        "templates:\n  - id: cm\n    component_type: webapp\n    file: custom/cm.yaml.j2\n    render_order: 1\n  - id: off\n    component_type: webapp\n    file: custom/cm.yaml.j2\n    render_order: 2\n    enabled: false\n",
    )
    .unwrap();
    let cat = StaticCatalog::from_dir(&dir).unwrap();
    assert_eq!(cat.len(), 2);
    let active: Vec<TemplateDescriptor> = cat.templates_for("webapp").unwrap();
    assert_eq!(active.len(), 1);
    let docs = Renderer::new().render_component(&cat, &component("webapp", ComponentSettings::default()), &Map::new(), None).unwrap();
    assert_eq!(docs[0].name(), Some("api"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn scalar_looking_names_stay_strings() {
    for name in ["123", "null", "1e3", "true"] {
        let mut ctx = component("webapp", ComponentSettings {
            exposure: http_exposure(),
            envs: vec![EnvVar { key: "042".into(), value: "x".into() }],
            secrets: vec![SecretEntry { key: "007".into(), value: "s".into() }],
            ..Default::default()
        });
        ctx.component_name = name.into();
        let gw = GatewayReference { namespace: "gw".into(), name: "1".into() };
        let docs = Renderer::new().render_component(&StaticCatalog::builtin(), &ctx, &Map::new(), Some(&gw)).unwrap();
        assert_eq!(kinds(&docs), vec!["Secret", "Deployment", "Service", "HTTPRoute"]);
        for doc in &docs {
            assert_eq!(doc.name(), Some(name), "{}", doc.kind().unwrap());
            assert!(doc.validate(Operation::Upsert).unwrap().is_some());
            assert_eq!(doc.as_json()["metadata"]["labels"]["app"], name);
        }
        assert_eq!(docs[0].as_json()["stringData"]["007"], "s");
        let container = &docs[1].as_json()["spec"]["template"]["spec"]["containers"][0];
        assert_eq!(container["name"], name);
        assert_eq!(container["env"][0]["name"], "042");
        assert_eq!(container["envFrom"][0]["secretRef"]["name"], name);
        assert_eq!(docs[3].as_json()["spec"]["parentRefs"][0]["name"], "1");
    }
}
