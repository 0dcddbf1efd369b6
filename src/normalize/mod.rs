//! Payload normalizer — client request bodies to [`UpstreamRequest`].
//!
//! All "this model needs it *this* way" request logic lives here: per-model
//! defaults, keyword heuristics and multimodal content rewriting. The
//! dispatcher only ever sees the normalized payload.
//!
//! Explicit client values always win. Defaults and heuristics only fill in
//! fields the caller left out.

pub mod heuristics;
pub mod multimodal;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::types::{
    Message, MessageContent, ModelEntry, ModelTrait, Role, RouteKind, UpstreamBody,
    UpstreamRequest,
};
use crate::{PasserelleError, Result};

pub use heuristics::{Assessment, HeuristicsConfig};

/// Sampling options forwarded upstream unchanged when present.
const PASSTHROUGH_FIELDS: &[&str] = &[
    "top_p",
    "stop",
    "seed",
    "presence_penalty",
    "frequency_penalty",
    "logprobs",
];

/// Fields consumed by the normalizer itself.
const CONSUMED_FIELDS: &[&str] = &["model", "messages", "prompt", "max_tokens", "temperature"];

/// Upper bound of the accepted temperature range.
const MAX_TEMPERATURE: f64 = 2.0;

/// Global request defaults.
///
/// ```toml
/// [defaults]
/// max_tokens = 1000
/// temperature = 0.7
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// `max_tokens` for models without a per-model default.
    pub max_tokens: u32,
    /// Temperature when the client sets none.
    pub temperature: f64,
    /// System prompt for Ollama `/api/generate` requests without `system`.
    pub system_prompt: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
            system_prompt: "You are a helpful assistant.".to_string(),
        }
    }
}

/// Builds upstream payloads from raw client JSON.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    defaults: DefaultsConfig,
    heuristics: HeuristicsConfig,
}

impl Normalizer {
    pub fn new(defaults: DefaultsConfig, heuristics: HeuristicsConfig) -> Self {
        Self {
            defaults,
            heuristics,
        }
    }

    pub fn defaults(&self) -> &DefaultsConfig {
        &self.defaults
    }

    /// Normalize a client payload for `entry`.
    ///
    /// Fails with `MissingField` when the route's required field is absent
    /// (`messages` for chat, `prompt` for completion) and with
    /// `InvalidField` for wrong types or out-of-range values.
    pub fn normalize(
        &self,
        route: RouteKind,
        payload: &Value,
        entry: &ModelEntry,
    ) -> Result<UpstreamRequest> {
        let obj = payload.as_object().ok_or_else(|| {
            PasserelleError::MalformedRequest("request body must be a JSON object".into())
        })?;

        let body = match route {
            RouteKind::Chat => UpstreamBody::Messages(parse_messages(obj, entry)?),
            RouteKind::Completion => UpstreamBody::Prompt(parse_prompt(obj)?),
        };

        let explicit_max_tokens = parse_max_tokens(obj)?;
        let explicit_temperature = parse_temperature(obj)?;

        let assessment = self.heuristics.assess(entry, &request_text(&body));
        let max_tokens = explicit_max_tokens.unwrap_or_else(|| {
            let default = entry.default_max_tokens.unwrap_or(self.defaults.max_tokens);
            self.heuristics.max_tokens_floor(assessment, default)
        });
        let temperature = explicit_temperature.unwrap_or_else(|| {
            self.heuristics
                .temperature(assessment, self.defaults.temperature)
        });

        debug!(
            model = %entry.name,
            route = route.as_str(),
            max_tokens,
            temperature,
            detailed = assessment.detailed,
            code = assessment.code,
            "normalized request"
        );

        Ok(UpstreamRequest {
            model: entry.upstream_model_id.clone(),
            body,
            max_tokens,
            temperature,
            options: passthrough_options(obj),
        })
    }
}

fn parse_messages(obj: &Map<String, Value>, entry: &ModelEntry) -> Result<Vec<Message>> {
    let raw = match obj.get("messages") {
        None | Some(Value::Null) => return Err(PasserelleError::MissingField("messages")),
        Some(Value::Array(items)) if items.is_empty() => {
            return Err(PasserelleError::MissingField("messages"));
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(PasserelleError::InvalidField {
                field: "messages",
                reason: "expected an array".into(),
            });
        }
    };
    let multimodal = entry.has_trait(ModelTrait::Multimodal);
    raw.iter()
        .enumerate()
        .map(|(i, m)| parse_message(i, m, multimodal, &entry.name))
        .collect()
}

fn parse_message(index: usize, raw: &Value, multimodal: bool, model: &str) -> Result<Message> {
    let invalid = |reason: String| PasserelleError::InvalidField {
        field: "messages",
        reason,
    };
    let obj = raw
        .as_object()
        .ok_or_else(|| invalid(format!("message {index} is not an object")))?;

    let role_name = obj
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("message {index} has no role")))?;
    let role = match Role::parse(role_name) {
        Some(role) => role,
        None if multimodal => {
            warn!(model, role = role_name, index, "unsupported role coerced to user");
            Role::User
        }
        None => return Err(invalid(format!("message {index} has unknown role '{role_name}'"))),
    };

    let tool_calls = obj.get("tool_calls").filter(|v| !v.is_null()).cloned();
    let content = match obj.get("content") {
        None | Some(Value::Null) if tool_calls.is_some() => MessageContent::Null,
        None | Some(Value::Null) => MessageContent::default(),
        Some(Value::String(text)) if multimodal && multimodal::is_image_url(text) => {
            debug!(model, index, "image URL rewritten as image_url part");
            MessageContent::image_url(text.trim())
        }
        Some(Value::String(text)) => MessageContent::Text(text.clone()),
        Some(Value::Array(parts)) => MessageContent::Parts(parts.clone()),
        Some(_) => {
            return Err(invalid(format!(
                "message {index} content must be a string or an array"
            )));
        }
    };

    Ok(Message {
        role,
        content,
        name: obj.get("name").and_then(Value::as_str).map(str::to_owned),
        tool_call_id: obj
            .get("tool_call_id")
            .and_then(Value::as_str)
            .map(str::to_owned),
        tool_calls,
    })
}

fn parse_prompt(obj: &Map<String, Value>) -> Result<String> {
    match obj.get("prompt") {
        None | Some(Value::Null) => Err(PasserelleError::MissingField("prompt")),
        Some(Value::String(prompt)) => Ok(prompt.clone()),
        Some(_) => Err(PasserelleError::InvalidField {
            field: "prompt",
            reason: "expected a string".into(),
        }),
    }
}

fn parse_max_tokens(obj: &Map<String, Value>) -> Result<Option<u32>> {
    match obj.get("max_tokens") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| PasserelleError::InvalidField {
                field: "max_tokens",
                reason: format!("expected a positive integer, got {v}"),
            }),
    }
}

fn parse_temperature(obj: &Map<String, Value>) -> Result<Option<f64>> {
    match obj.get("temperature") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|t| (0.0..=MAX_TEMPERATURE).contains(t))
            .map(Some)
            .ok_or_else(|| PasserelleError::InvalidField {
                field: "temperature",
                reason: format!("expected a number in [0, {MAX_TEMPERATURE}], got {v}"),
            }),
    }
}

fn passthrough_options(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut options = Map::new();
    for (key, value) in obj {
        if PASSTHROUGH_FIELDS.contains(&key.as_str()) {
            if !value.is_null() {
                options.insert(key.clone(), value.clone());
            }
        } else if !CONSUMED_FIELDS.contains(&key.as_str()) {
            debug!(field = %key, "client field not forwarded upstream");
        }
    }
    options
}

/// All request text, newline-joined, for keyword sniffing.
fn request_text(body: &UpstreamBody) -> String {
    match body {
        UpstreamBody::Prompt(prompt) => prompt.clone(),
        UpstreamBody::Messages(messages) => messages
            .iter()
            .flat_map(|m| m.content.text_fragments())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
