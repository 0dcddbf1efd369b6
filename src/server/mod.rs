//! HTTP surface: OpenAI and Ollama compatible routes over one [`Passerelle`].
//!
//! Every POST route reads the raw body, parses it as JSON and hands it to
//! [`Passerelle::handle`] with its [`ClientRoute`]. Failures are rendered as
//! `{error, detail, model, endpoint}` with the error's status.

pub mod config;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State, rejection::BytesRejection},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::gateway::{Passerelle, RequestFailure};
use crate::types::ClientRoute;
use crate::PasserelleError;

use config::LimitsConfig;

impl IntoResponse for RequestFailure {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body())).into_response()
    }
}

/// Build the application router.
pub fn router(gateway: Passerelle, limits: &LimitsConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(openai_chat))
        .route("/v1/completions", post(openai_completion))
        .route("/api/chat", post(ollama_chat))
        .route("/api/generate", post(ollama_generate))
        .route("/v1/models", get(openai_models))
        .route("/api/models", get(openwebui_models))
        .route("/api/tags", get(ollama_tags))
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/diagnostic", get(diagnostic))
        .layer(DefaultBodyLimit::max(limits.max_body_bytes))
        .layer(ConcurrencyLimitLayer::new(limits.max_concurrent_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(gateway)
}

/// Body extraction result; rejections are rendered like any other failure.
type RawBody = Result<Bytes, BytesRejection>;

async fn handle(gateway: &Passerelle, route: ClientRoute, body: RawBody) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_failure(rejection).into_response(),
    };
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return RequestFailure {
                model: None,
                error: PasserelleError::MalformedRequest(e.to_string()),
            }
            .into_response();
        }
    };
    match gateway.handle(route, payload).await {
        Ok(body) => Json(body).into_response(),
        Err(failure) => failure.into_response(),
    }
}

fn rejection_failure(rejection: BytesRejection) -> RequestFailure {
    let detail = rejection.body_text();
    let error = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PasserelleError::PayloadTooLarge(detail)
    } else {
        PasserelleError::MalformedRequest(detail)
    };
    RequestFailure { model: None, error }
}

async fn openai_chat(State(gateway): State<Passerelle>, body: RawBody) -> Response {
    handle(&gateway, ClientRoute::OpenAiChat, body).await
}

async fn openai_completion(State(gateway): State<Passerelle>, body: RawBody) -> Response {
    handle(&gateway, ClientRoute::OpenAiCompletion, body).await
}

async fn ollama_chat(State(gateway): State<Passerelle>, body: RawBody) -> Response {
    handle(&gateway, ClientRoute::OllamaChat, body).await
}

async fn ollama_generate(State(gateway): State<Passerelle>, body: RawBody) -> Response {
    handle(&gateway, ClientRoute::OllamaGenerate, body).await
}

async fn openai_models(State(gateway): State<Passerelle>) -> Json<Value> {
    Json(gateway.openai_models())
}

async fn openwebui_models(State(gateway): State<Passerelle>) -> Json<Value> {
    Json(gateway.openwebui_models())
}

async fn ollama_tags(State(gateway): State<Passerelle>) -> Json<Value> {
    Json(gateway.ollama_tags())
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn diagnostic(State(gateway): State<Passerelle>) -> Json<Value> {
    let reports = gateway.diagnose().await;
    let reachable = reports.iter().filter(|r| r.reachable).count();
    Json(json!({
        "endpoints": reports,
        "reachable": reachable,
    }))
}
