//! Axum middleware binding the adapter into a router.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
    Router,
};
use uuid::Uuid;

use crate::ambient::FlowScope;
use crate::pipeline::RequestTracing;
use crate::tracer::Tracer;

/// Middleware function opening one logical flow per request.
///
/// Derives the request ID (inbound header or a fresh UUID), decodes the
/// incoming carrier, and calls the adapter hooks around the downstream
/// handler. The handler and everything it awaits run inside the request's
/// flow scope, so instrumented code reads the entry context ambiently.
pub async fn trace_middleware(
    State(adapter): State<Arc<RequestTracing>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    if adapter.is_excluded(&method) {
        return next.run(request).await;
    }

    let id_header = HeaderName::from_bytes(adapter.request_id_header().as_bytes())
        .unwrap_or(HeaderName::from_static("x-request-id"));
    let request_id = request
        .headers()
        .get(&id_header)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let carrier = Tracer::decode_carrier(request.headers());
    let path = request.uri().path().to_string();
    let url = request.uri().to_string();

    let mut request = request;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(id_header.clone(), value);
    }

    let adapter = adapter.clone();
    let rid = request_id.clone();
    let mut response = FlowScope::new()
        .run(async move {
            adapter.on_request_start(&rid, &method, &path, &url, carrier.as_ref());
            let response = next.run(request).await;
            adapter.on_request_end(&rid, response.status().as_u16(), None);
            response
        })
        .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(id_header, value);
    }
    response
}

/// Attach the tracing middleware to a router.
pub fn instrument_router(router: Router, adapter: Arc<RequestTracing>) -> Router {
    router.layer(axum::middleware::from_fn_with_state(
        adapter,
        trace_middleware,
    ))
}
