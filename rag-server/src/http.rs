//! Axum entry point (spec §6): a single streaming chat endpoint plus a
//! liveness probe. Request-ID tagging, tracing and CORS are applied as
//! `tower`/`tower-http` layers so the handler itself only deals with the
//! request-fulfillment pipeline.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::stream::StreamExt;
use rag_core::error::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::{Core, RequestMeta};
use crate::protocol::{ChatRequest, ErrorBody, ErrorEnvelope, StreamEvent};
use crate::security::validate_chat_request;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Build the full router: `/v1/chat` for the streamed answer endpoint,
/// `/healthz` for liveness.
pub fn router(core: Arc<Core>) -> Router {
    Router::new()
        .route("/v1/chat", post(chat_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(core)
}

async fn healthz() -> &'static str {
    "ok"
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or("unknown")
        .to_string()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ").map(str::to_string)
}

fn user_agent(headers: &HeaderMap) -> String {
    headers.get(axum::http::header::USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("unknown").to_string()
}

/// `POST /v1/chat`: validates the request body, then streams
/// `[sources, token*, usage, done]` (or `[..., error]`) as server-sent
/// events, in the fixed order the pipeline emits them (§6).
async fn chat_handler(
    State(core): State<Arc<Core>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let mut response_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response_headers.insert(REQUEST_ID_HEADER, value);
    }

    let request = match validate_chat_request(request) {
        Ok(request) => request,
        Err(err) => return error_response(&err, request_id, response_headers),
    };

    let meta = RequestMeta { ip: client_ip(&headers), user_agent: user_agent(&headers), bearer_token: bearer_token(&headers) };
    let events = core.handle_chat(request, meta, "/v1/chat");
    let sse_stream = events.map(|event| Ok::<Event, Infallible>(to_sse_event(&event)));

    let mut response = Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))).into_response();
    response.headers_mut().extend(response_headers);
    response
}

fn to_sse_event(event: &StreamEvent) -> Event {
    match event {
        StreamEvent::Sources(sources) => Event::default().event("sources").json_data(sources).unwrap_or_else(Event::default),
        StreamEvent::Token(token) => Event::default().event("token").data(token),
        StreamEvent::Usage(usage) => Event::default().event("usage").json_data(usage).unwrap_or_else(Event::default),
        StreamEvent::Done(done) => Event::default().event("done").json_data(done).unwrap_or_else(Event::default),
        StreamEvent::Error(body) => Event::default().event("error").json_data(body).unwrap_or_else(Event::default),
    }
}

fn error_response(err: &Error, request_id: Uuid, mut headers: HeaderMap) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody::from_error(err, request_id, Utc::now());
    if let Some(retry_after) = body.retry_after {
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            headers.insert("Retry-After", value);
        }
    }
    let mut response = (status, Json(ErrorEnvelope { error: body })).into_response();
    response.headers_mut().extend(headers);
    response
}

