//! Pipeline adapter and middleware tests against a live listener.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{any, get},
    Router,
};

use trace_agent::export::InMemoryExporter;
use trace_agent::pipeline::middleware::instrument_router;
use trace_agent::trace::carrier::{PARENT_SPAN_HEADER, SAMPLED_HEADER, TRACE_ID_HEADER};
use trace_agent::trace::SpanKind;
use trace_agent::{AgentConfig, FinishedSegment, RequestTracing, TraceId, Tracer};

struct TestApp {
    base: String,
    exporter: Arc<InMemoryExporter>,
}

/// Handler mirroring an instrumented controller: one local unit of work
/// wrapping one outbound call.
async fn apps_handler(State(adapter): State<Arc<RequestTracing>>) -> &'static str {
    let tracer = adapter.tracer();
    let local = tracer.create_local_context("load-apps");
    let exit = tracer.create_exit_context("db-query", "db:5432");
    tracer.release(&exit).unwrap();
    tracer.release(&local).unwrap();
    "ok"
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn failing_handler() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::BAD_GATEWAY, "upstream failed")
}

async fn start_app() -> TestApp {
    let config = AgentConfig::default();
    let exporter = Arc::new(InMemoryExporter::new());
    let tracer = Arc::new(Tracer::new(&config, exporter.clone()));
    let adapter = Arc::new(RequestTracing::new(tracer, &config.pipeline));

    let app = Router::new()
        .route("/health", any(health_handler))
        .route("/api/apps", get(apps_handler))
        .route("/api/broken", get(failing_handler))
        .with_state(adapter.clone());
    let app = instrument_router(app, adapter);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestApp {
        base: format!("http://{}", addr),
        exporter,
    }
}

fn by_kind(segments: &[FinishedSegment], kind: SpanKind) -> &FinishedSegment {
    segments
        .iter()
        .find(|s| s.kind == kind)
        .expect("segment of expected kind")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn traced_request_produces_full_parent_chain() {
    let app = start_app().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/apps", app.base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().get("x-request-id").is_some());

    let segments = app.exporter.drain();
    assert_eq!(segments.len(), 3);

    let entry = by_kind(&segments, SpanKind::Entry);
    let local = by_kind(&segments, SpanKind::Local);
    let exit = by_kind(&segments, SpanKind::Exit);

    assert_eq!(local.parent_span_id, Some(entry.span_id));
    assert_eq!(exit.parent_span_id, Some(local.span_id));
    assert_eq!(local.trace_id, entry.trace_id);
    assert_eq!(exit.trace_id, entry.trace_id);

    assert_eq!(entry.operation, "/api/apps");
    assert_eq!(exit.peer.as_deref(), Some("db:5432"));
    assert!(entry
        .tags
        .iter()
        .any(|(k, v)| k == "http.status_code" && v == "200"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn options_requests_are_not_traced() {
    let app = start_app().await;
    let client = reqwest::Client::new();

    let res = client
        .request(reqwest::Method::OPTIONS, format!("{}/health", app.base))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success() || res.status().as_u16() == 405);
    assert!(app.exporter.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn incoming_carrier_continues_the_trace() {
    let app = start_app().await;
    let client = reqwest::Client::new();

    let upstream_trace = TraceId::new();
    let res = client
        .get(format!("{}/api/apps", app.base))
        .header(TRACE_ID_HEADER, upstream_trace.to_string())
        .header(PARENT_SPAN_HEADER, "7")
        .header(SAMPLED_HEADER, "1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let segments = app.exporter.drain();
    let entry = by_kind(&segments, SpanKind::Entry);
    assert_eq!(entry.trace_id, upstream_trace);
    // Cross-process parentage is an upstream reference, not a local parent.
    assert_eq!(entry.parent_span_id, None);
    let upstream = entry.upstream.as_ref().unwrap();
    assert_eq!(upstream.span_id, "7");

    // The whole local chain still shares the continued trace.
    assert!(segments.iter().all(|s| s.trace_id == upstream_trace));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_carrier_falls_back_to_fresh_trace() {
    let app = start_app().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/apps", app.base))
        .header(TRACE_ID_HEADER, "definitely-not-a-trace-id")
        .header(PARENT_SPAN_HEADER, "7")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let segments = app.exporter.drain();
    let entry = by_kind(&segments, SpanKind::Entry);
    // Decode failure recovered locally: fresh identity, no upstream.
    assert!(entry.upstream.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn error_responses_mark_the_entry_segment() {
    let app = start_app().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/broken", app.base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);

    let segments = app.exporter.drain();
    let entry = by_kind(&segments, SpanKind::Entry);
    assert!(entry.error);
    assert!(entry
        .tags
        .iter()
        .any(|(k, v)| k == "http.status_code" && v == "502"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn inbound_request_id_is_propagated_back() {
    let app = start_app().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/apps", app.base))
        .header("x-request-id", "req-abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(
        res.headers().get("x-request-id").unwrap().to_str().unwrap(),
        "req-abc-123"
    );
    assert_eq!(app.exporter.drain().len(), 3);
}
