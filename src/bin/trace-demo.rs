//! Demo application probing the propagation contract.
//!
//! Boots an instrumented axum app, then fires requests at it that exercise
//! the scenarios the core exists to get right: a span held across an await,
//! a detached completion finishing a span from outside its owning flow, and
//! two inherited flows running in parallel.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::Json,
    routing::{any, get},
    Router,
};
use clap::Parser;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use trace_agent::config::{load_config, AgentConfig};
use trace_agent::export::LogExporter;
use trace_agent::observability::{logging, metrics};
use trace_agent::pipeline::middleware::instrument_router;
use trace_agent::{FlowScope, RequestTracing, Tracer};

#[derive(Parser)]
#[command(name = "trace-demo")]
#[command(about = "Propagation demo for the tracing agent", long_about = None)]
struct Cli {
    /// Bind address for the demo app.
    #[arg(short, long, default_value = "127.0.0.1:8088")]
    bind: String,

    /// Optional agent config file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep serving after the probes finish.
    #[arg(long)]
    serve: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = AgentConfig::default();
            config.service.name = "trace-demo".to_string();
            config
        }
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let tracer = Arc::new(Tracer::new(&config, Arc::new(LogExporter)));
    let adapter = Arc::new(RequestTracing::new(tracer, &config.pipeline));

    let app = Router::new()
        .route("/health", any(health))
        .route("/api/values", get(values))
        .route("/api/detached", get(detached))
        .route("/api/parallel", get(parallel))
        .route("/api/downstream", get(downstream))
        .with_state(adapter.clone());
    let app = instrument_router(app, adapter);

    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Demo app listening");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    run_probes(&format!("http://{}", addr)).await?;

    if cli.serve {
        tracing::info!("Probes done, serving until Ctrl+C");
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}

async fn run_probes(base: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    // Pre-flight requests must leave no trace at all.
    let res = client
        .request(reqwest::Method::OPTIONS, format!("{}/health", base))
        .send()
        .await?;
    println!("OPTIONS /health -> {} (expected: no segments logged)", res.status());

    for route in ["/api/values", "/api/detached", "/api/parallel", "/api/downstream"] {
        let res = client.get(format!("{}{}", base, route)).send().await?;
        let status = res.status();
        let body: Value = res.json().await?;
        println!("GET {} -> {}\n  {}", route, status, body);
    }
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// Clean path: a local span inside the request flow, held across an await.
async fn values(State(adapter): State<Arc<RequestTracing>>) -> Json<Value> {
    let tracer = adapter.tracer();
    let result: Result<Vec<u32>, String> = tracer
        .in_local_span("load-values", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(vec![1, 2, 3])
        })
        .await;

    Json(json!({ "values": result.unwrap_or_default() }))
}

/// Detached-completion probe.
///
/// A spawned task tries to finish the span with a plain release (refused:
/// it does not own the flow), then goes through the explicit transfer. The
/// requesting flow's ambient current must resolve to the span's parent
/// afterwards, never the released span.
async fn detached(State(adapter): State<Arc<RequestTracing>>) -> Json<Value> {
    let tracer = adapter.tracer().clone();
    let local = tracer.create_local_context("detached-op");

    let (tx, rx) = oneshot::channel();
    let t = tracer.clone();
    let span = local.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let refused = t.release(&span).unwrap_err().to_string();
        if let Err(e) = t.adopt_and_release(&span) {
            tracing::warn!(error = %e, "Detached transfer failed");
        }
        let _ = tx.send(refused);
    });

    let refused = rx.await.unwrap_or_default();
    let current_after = tracer.current_context().map(|c| c.operation().to_string());

    Json(json!({
        "released": local.operation(),
        "plain_release_refused_with": refused,
        "current_after_resume": current_after,
    }))
}

/// Two detached flows inheriting the request context, run concurrently.
async fn parallel(State(adapter): State<Arc<RequestTracing>>) -> Json<Value> {
    let tracer = adapter.tracer().clone();
    let snapshot = tracer.capture();

    let spawn_branch = |name: &'static str| {
        let t = tracer.clone();
        let snap = snapshot.clone();
        tokio::spawn(async move {
            FlowScope::continued(snap)
                .run(async move {
                    t.in_local_span(name, async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok::<_, String>(name)
                    })
                    .await
                })
                .await
        })
    };

    let (a, b) = tokio::join!(spawn_branch("parallel-a"), spawn_branch("parallel-b"));
    let current_after = tracer.current_context().map(|c| c.operation().to_string());

    Json(json!({
        "branches": [a.ok().and_then(Result::ok), b.ok().and_then(Result::ok)],
        "current_after_join": current_after,
    }))
}

/// Mint an exit span and echo the carrier the downstream call would get.
async fn downstream(State(adapter): State<Arc<RequestTracing>>) -> Json<Value> {
    let tracer = adapter.tracer();
    let exit = tracer.create_exit_context("call-inventory", "inventory:8080");
    let headers: Vec<(String, String)> = exit
        .carrier()
        .map(|c| {
            c.to_headers()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect()
        })
        .unwrap_or_default();

    if let Err(e) = tracer.release(&exit) {
        tracing::warn!(error = %e, "Failed to release exit span");
    }
    Json(json!({ "carrier": headers }))
}
