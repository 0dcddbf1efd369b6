//! Gateway — one request pipeline shared by every client route.
//!
//! `convert` (Ollama only) → resolve model → normalize → dispatch →
//! translate. The pipeline is parameterized by [`ClientRoute`]; the HTTP
//! layer only picks the route and serializes the outcome.

mod builder;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info};

use crate::dispatch::{Dispatcher, EndpointReport};
use crate::normalize::Normalizer;
use crate::registry::ModelRegistry;
use crate::types::{ClientRoute, ControlFlags, ModelEntry, RouteKind};
use crate::{ErrorBody, PasserelleError, Result, convert, telemetry, translate};

pub use builder::PasserelleBuilder;

/// A failed request: the error plus the logical model it concerned.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RequestFailure {
    /// Logical model name, once resolved.
    pub model: Option<String>,
    #[source]
    pub error: PasserelleError,
}

impl RequestFailure {
    /// HTTP status for the client.
    pub fn status_code(&self) -> u16 {
        self.error.status_code()
    }

    /// Structured JSON body for the client.
    pub fn body(&self) -> ErrorBody {
        self.error.to_body(self.model.as_deref())
    }
}

/// The proxy: registry, normalizer and dispatcher behind one entry point.
///
/// Cheap to clone; the registry is shared.
#[derive(Debug, Clone)]
pub struct Passerelle {
    registry: Arc<ModelRegistry>,
    normalizer: Normalizer,
    dispatcher: Dispatcher,
}

impl Passerelle {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> PasserelleBuilder {
        PasserelleBuilder::new()
    }

    pub(crate) fn new(
        registry: Arc<ModelRegistry>,
        normalizer: Normalizer,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            registry,
            normalizer,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serve one client request on `route`.
    ///
    /// Returns the response body in the route's client shape, or a
    /// [`RequestFailure`] carrying the status and body to send back.
    pub async fn handle(
        &self,
        route: ClientRoute,
        payload: Value,
    ) -> std::result::Result<Value, RequestFailure> {
        let start = Instant::now();
        let mut model = None;
        let result = self.process(route, &payload, &mut model).await;

        let label = model.clone().unwrap_or_else(|| "unknown".to_string());
        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.status_code(),
        };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "model" => label.clone(),
            "route" => route.as_str(),
            "status" => status.to_string(),
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "model" => label,
            "route" => route.as_str(),
        )
        .record(start.elapsed().as_secs_f64());

        result.map_err(|error| RequestFailure { model, error })
    }

    async fn process(
        &self,
        route: ClientRoute,
        payload: &Value,
        model: &mut Option<String>,
    ) -> Result<Value> {
        let payload = match route {
            ClientRoute::OllamaChat => convert::from_ollama_chat(payload)?,
            ClientRoute::OllamaGenerate => convert::from_ollama_generate(
                payload,
                &self.normalizer.defaults().system_prompt,
            )?,
            ClientRoute::OpenAiChat | ClientRoute::OpenAiCompletion => payload.clone(),
        };

        let requested = match payload.get("model") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.as_str(),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err(PasserelleError::MissingField("model"));
            }
            Some(_) => {
                return Err(PasserelleError::InvalidField {
                    field: "model",
                    reason: "expected a string".into(),
                });
            }
        };
        let entry = self.registry.resolve(requested)?;
        *model = Some(entry.name.clone());

        let kind = route.route_kind();
        let request = self.normalizer.normalize(kind, &payload, entry)?;

        let upstream = if ControlFlags::from_payload(&payload).test_mode {
            info!(model = %entry.name, route = route.as_str(), "test mode, upstream skipped");
            test_mode_response(kind, entry)
        } else {
            self.dispatcher.dispatch(kind, &request, entry).await?
        };
        debug!(model = %entry.name, route = route.as_str(), "upstream answered");

        translate::to_client_shape(route.target_shape(), upstream, entry)
    }

    /// `GET /v1/models` body.
    pub fn openai_models(&self) -> Value {
        translate::openai_models(&self.registry.list())
    }

    /// `GET /api/models` body.
    pub fn openwebui_models(&self) -> Value {
        translate::openwebui_models(&self.registry.list())
    }

    /// `GET /api/tags` body.
    pub fn ollama_tags(&self) -> Value {
        translate::ollama_tags(&self.registry.list())
    }

    /// Probe every endpoint of every model and report reachability.
    pub async fn diagnose(&self) -> Vec<EndpointReport> {
        self.dispatcher.diagnose(&self.registry).await
    }
}

fn test_mode_response(kind: RouteKind, entry: &ModelEntry) -> Value {
    translate::synthetic_openai(
        kind == RouteKind::Chat,
        &entry.upstream_model_id,
        &format!("[test_mode] {}", entry.name),
    )
}
