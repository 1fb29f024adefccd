use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value as Json};
use tracing::{debug, info, warn};
use tron_apply::{ApplyReport, Engine};
use tron_core::{ComponentContext, GatewayReference, ManifestDocument, Operation};
use tron_kubehub::{find_gateway_reference, gateway_api_available, gateway_api_kinds, Cluster, ClusterConfig, KubeCluster};
use tron_namespace::{namespace_for_application, NamespaceGuard};
use tron_render::{Renderer, StaticCatalog};

#[derive(Parser, Debug)]
#[command(name = "tronctl", version, about = "Tron CLI: render and reconcile component manifests")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Cluster API URL (default: kubeconfig or in-cluster config)
    #[arg(long = "cluster-url", env = "TRON_CLUSTER_URL", global = true)]
    cluster_url: Option<String>,

    /// Bearer token for the cluster API
    #[arg(long = "token", env = "TRON_CLUSTER_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Skip TLS certificate verification (also TRON_INSECURE_SKIP_TLS_VERIFY=1)
    #[arg(long = "insecure-skip-tls-verify", action = ArgAction::SetTrue, global = true)]
    insecure_skip_tls_verify: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// Component context file (YAML or JSON)
    #[arg(long = "context")]
    context: PathBuf,
    /// Environment settings file exposed to templates as `environment`
    #[arg(long = "environment")]
    environment: Option<PathBuf>,
    /// Template directory containing catalog.yaml (default: built-in templates)
    #[arg(long = "templates")]
    templates: Option<PathBuf>,
    /// Gateway to attach routes to, as namespace/name
    #[arg(long = "gateway")]
    gateway: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a component's manifests without touching the cluster
    Render {
        #[command(flatten)]
        args: RenderArgs,
        /// Look up a Gateway in the cluster when none is given
        #[arg(long = "discover-gateway", action = ArgAction::SetTrue)]
        discover_gateway: bool,
    },
    /// Render a component (or read a manifest stream) and apply it
    Apply {
        /// create | update | upsert | delete
        #[arg(long = "op", default_value = "upsert")]
        op: String,
        /// Multi-document YAML manifest file; replaces rendering
        #[arg(long = "manifests", conflicts_with_all = ["context", "environment", "templates", "gateway"])]
        manifests: Option<PathBuf>,
        #[arg(long = "context")]
        context: Option<PathBuf>,
        #[arg(long = "environment")]
        environment: Option<PathBuf>,
        #[arg(long = "templates")]
        templates: Option<PathBuf>,
        #[arg(long = "gateway")]
        gateway: Option<String>,
    },
    /// Namespace lifecycle
    Ns {
        #[command(subcommand)]
        command: NsCommands,
    },
    /// Gateway API availability, served kinds, and default Gateway
    Gateway,
}

#[derive(Subcommand, Debug)]
enum NsCommands {
    /// Print the namespace an application deploys into
    Name { application: String },
    /// Create the namespace if missing
    Ensure { name: String },
    /// Delete a managed namespace
    Delete {
        name: String,
        /// Namespace is recorded as owned by Tron despite lacking the managed prefix
        #[arg(long = "legacy", action = ArgAction::SetTrue)]
        legacy: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("TRON_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("TRON_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid TRON_METRICS_ADDR; expected host:port");
        }
    }
}

fn cluster_config(cli: &Cli) -> ClusterConfig {
    let from_env = ClusterConfig::from_env();
    ClusterConfig {
        url: cli.cluster_url.clone(),
        token: cli.token.clone(),
        accept_invalid_certs: cli.insecure_skip_tls_verify || from_env.accept_invalid_certs,
    }
}

async fn connect(cli: &Cli) -> Result<Arc<dyn Cluster>> {
    let cluster = KubeCluster::connect(&cluster_config(cli)).await?;
    Ok(Arc::new(cluster))
}

fn parse_gateway(raw: &str) -> Result<GatewayReference> {
    match raw.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() => {
            Ok(GatewayReference { namespace: ns.to_string(), name: name.to_string() })
        }
        _ => Err(anyhow!("invalid gateway '{}' (expect namespace/name)", raw)),
    }
}

fn read_context(path: &Path) -> Result<ComponentContext> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing component context {}", path.display()))
}

fn read_environment(path: Option<&Path>) -> Result<Map<String, Json>> {
    let Some(path) = path else { return Ok(Map::new()) };
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match serde_yaml::from_str::<Json>(&raw).with_context(|| format!("parsing {}", path.display()))? {
        Json::Object(m) => Ok(m),
        Json::Null => Ok(Map::new()),
        _ => Err(anyhow!("{}: environment settings must be a mapping", path.display())),
    }
}

fn read_manifests(path: &Path) -> Result<Vec<ManifestDocument>> {
    use serde::Deserialize;
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut docs = Vec::new();
    for (i, de) in serde_yaml::Deserializer::from_str(&raw).enumerate() {
        let v = Json::deserialize(de).with_context(|| format!("{}: document {}", path.display(), i + 1))?;
        docs.push(ManifestDocument::new(v));
    }
    Ok(docs)
}

fn catalog(templates: Option<&Path>) -> Result<StaticCatalog> {
    match templates {
        Some(dir) => StaticCatalog::from_dir(dir),
        None => Ok(StaticCatalog::builtin()),
    }
}

fn render(args: &RenderArgs, gateway: Option<GatewayReference>) -> Result<Vec<ManifestDocument>> {
    let ctx = read_context(&args.context)?;
    let environment = read_environment(args.environment.as_deref())?;
    let catalog = catalog(args.templates.as_deref())?;
    NamespaceGuard::from_env().check_application_name(&ctx.application_name)?;
    let docs = Renderer::from_env().render_component(&catalog, &ctx, &environment, gateway.as_ref())?;
    debug!(component = %ctx.component_name, documents = docs.len(), "rendered");
    Ok(docs)
}

fn print_documents(docs: &[ManifestDocument], output: Output) -> Result<()> {
    match output {
        Output::Human => {
            for d in docs {
                println!("---");
                print!("{}", serde_yaml::to_string(d.as_json())?);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(docs)?),
    }
    Ok(())
}

fn print_report(report: &ApplyReport, output: Output) -> Result<()> {
    match output {
        Output::Human => {
            for (label, refs) in [
                ("created", &report.created),
                ("updated", &report.updated),
                ("deleted", &report.deleted),
                ("absent", &report.already_absent),
                ("orphan-deleted", &report.orphans_deleted),
            ] {
                for r in refs {
                    println!("{:<15} {}", label, r);
                }
            }
            if report.skipped > 0 {
                println!("{:<15} {} non-mapping document(s)", "skipped", report.skipped);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { args, discover_gateway } => {
            metrics::counter!("cli_commands_total", 1u64, "command" => "render");
            let gateway = match &args.gateway {
                Some(raw) => Some(parse_gateway(raw)?),
                None if *discover_gateway => {
                    let cluster = connect(&cli).await?;
                    find_gateway_reference(cluster.as_ref()).await
                }
                None => None,
            };
            let docs = render(args, gateway)?;
            print_documents(&docs, cli.output)?;
        }
        Commands::Apply { op, manifests, context, environment, templates, gateway } => {
            metrics::counter!("cli_commands_total", 1u64, "command" => "apply");
            let operation = Operation::from_str(op).map_err(|e| anyhow!(e))?;
            let cluster = connect(&cli).await?;
            let docs = match (manifests, context) {
                (Some(path), _) => read_manifests(path)?,
                (None, Some(ctx_path)) => {
                    let gateway = match gateway {
                        Some(raw) => Some(parse_gateway(raw)?),
                        None if gateway_api_available(cluster.as_ref()).await => find_gateway_reference(cluster.as_ref()).await,
                        None => None,
                    };
                    let args = RenderArgs {
                        context: ctx_path.clone(),
                        environment: environment.clone(),
                        templates: templates.clone(),
                        gateway: None,
                    };
                    render(&args, gateway)?
                }
                (None, None) => return Err(anyhow!("apply needs --context or --manifests")),
            };
            info!(op = %operation, documents = docs.len(), "applying");
            let engine = Engine::new(cluster, NamespaceGuard::from_env());
            let report = engine.apply(&docs, operation).await?;
            print_report(&report, cli.output)?;
        }
        Commands::Ns { command } => {
            metrics::counter!("cli_commands_total", 1u64, "command" => "ns");
            let guard = NamespaceGuard::from_env();
            match command {
                NsCommands::Name { application } => {
                    guard.check_application_name(application)?;
                    let ns = namespace_for_application(application);
                    match cli.output {
                        Output::Human => println!("{}", ns),
                        Output::Json => println!("{}", serde_json::json!({"application": application, "namespace": ns})),
                    }
                }
                NsCommands::Ensure { name } => {
                    let engine = Engine::new(connect(&cli).await?, guard);
                    engine.ensure_namespace(name).await?;
                    match cli.output {
                        Output::Human => println!("namespace {} ready", name),
                        Output::Json => println!("{}", serde_json::json!({"namespace": name, "ready": true})),
                    }
                }
                NsCommands::Delete { name, legacy } => {
                    if *legacy {
                        warn!(namespace = %name, "deleting with legacy ownership override");
                    }
                    let engine = Engine::new(connect(&cli).await?, guard);
                    let deleted = engine.delete_namespace(name, *legacy).await?;
                    match cli.output {
                        Output::Human if deleted => println!("namespace {} deleted", name),
                        Output::Human => println!("namespace {} already absent", name),
                        Output::Json => println!("{}", serde_json::json!({"namespace": name, "deleted": deleted})),
                    }
                }
            }
        }
        Commands::Gateway => {
            metrics::counter!("cli_commands_total", 1u64, "command" => "gateway");
            let cluster = connect(&cli).await?;
            let available = gateway_api_available(cluster.as_ref()).await;
            let kinds = if available { gateway_api_kinds(cluster.as_ref()).await } else { Vec::new() };
            let reference = if available { find_gateway_reference(cluster.as_ref()).await } else { None };
            match cli.output {
                Output::Human => {
                    println!("gateway api: {}", if available { "available" } else { "not available" });
                    if !kinds.is_empty() {
                        println!("kinds: {}", kinds.join(", "));
                    }
                    match &reference {
                        Some(r) => println!("gateway: {}/{}", r.namespace, r.name),
                        None => println!("gateway: none"),
                    }
                }
                Output::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({"available": available, "kinds": kinds, "reference": reference}))?
                ),
            }
        }
    }
    Ok(())
}
