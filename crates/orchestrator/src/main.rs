//! QueryForge Orchestrator CLI
//!
//! Runs a single orchestration from the command line:
//! - Loads configuration and installs logging/metrics
//! - Builds the engine with every built-in tool handler
//! - Prints the OrchestrationResult as JSON, or the event stream as SSE frames

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use queryforge_common::config::ObservabilityConfig;
use queryforge_common::llm::create_llm_client;
use queryforge_common::{metrics, AppConfig, VERSION};
use queryforge_orchestrator::context::{InMemoryHistory, StaticVectorReference};
use queryforge_orchestrator::handlers::{DisabledSearchBackend, HttpSearchBackend, SearchBackend};
use queryforge_orchestrator::{
    sse_frames, ImageInput, QueryOrchestrator, RequestAssembler, UserContext,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "QueryForge - decide, run tools, answer", long_about = None)]
#[command(version = VERSION)]
struct Cli {
    /// Print streaming events as SSE frames instead of the final result
    #[arg(long)]
    stream: bool,

    /// Conversation session id
    #[arg(long, default_value = "cli")]
    session: String,

    /// Answer language (vi, en)
    #[arg(long)]
    language: Option<String>,

    /// Image to attach to the query
    #[arg(long)]
    image: Option<PathBuf>,

    /// JSON file holding the vector-search reference for this query
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Configuration file (defaults to config/ and APP__ variables)
    #[arg(long, env = "QUERYFORGE_CONFIG")]
    config: Option<String>,

    /// The user query
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config.observability);
    let service = &config.observability.service_name;
    info!(service = %service, "Starting QueryForge Orchestrator v{}", VERSION);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .add_global_label("service", service.clone())
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Metrics exposed on {}", addr);
    }

    let llm = create_llm_client(&config.llm)?;
    let search_backend: Arc<dyn SearchBackend> = match &config.web_search.api_key {
        Some(api_key) => Arc::new(HttpSearchBackend::new(api_key.clone(), &config.web_search)?),
        None => Arc::new(DisabledSearchBackend),
    };
    let orchestrator = QueryOrchestrator::from_config(&config, llm, search_backend)?;

    let vectors = match &cli.reference {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            StaticVectorReference::from_json(&json)?
        }
        None => StaticVectorReference::default(),
    };
    let assembler = RequestAssembler::new(
        Arc::new(InMemoryHistory::new()),
        Arc::new(vectors),
        config.decision.history_turns,
    );

    let user_context = UserContext {
        language: cli.language.clone(),
        ..UserContext::default()
    };
    let query = cli.query.join(" ");
    let mut request = assembler.assemble(&cli.session, &query, user_context).await;
    if let Some(path) = &cli.image {
        request = request.with_image(read_image(path).await?);
    }

    if cli.stream {
        let (events, handle) = orchestrator.stream(request);
        let mut frames = Box::pin(sse_frames(events));
        while let Some(frame) = frames.next().await {
            print!("{}", frame);
        }
        let result = handle.await.context("orchestration task failed")?;
        info!(orchestration_id = %result.id(), "Stream finished");
    } else {
        let result = orchestrator.execute(request).await;
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    // Logs go to stderr so stdout stays machine-readable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn read_image(path: &Path) -> anyhow::Result<ImageInput> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image {}", path.display()))?;
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| match e.to_ascii_lowercase().as_str() {
            "jpg" => "jpeg".to_string(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "png".to_string());

    Ok(ImageInput {
        bytes,
        format,
        question: None,
    })
}
