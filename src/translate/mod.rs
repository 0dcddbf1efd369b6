//! Response translator — upstream OpenAI-shaped JSON to the client's shape.
//!
//! OpenAI clients get the upstream body back unchanged, apart from reasoning
//! traces. Ollama clients get a `done: true` object built from the first
//! choice.

pub mod listing;

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::types::{ModelEntry, ModelTrait, TargetShape};
use crate::{PasserelleError, Result};

pub use listing::{ollama_tags, openai_models, openwebui_models};

static THINK_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("literal pattern"));

/// Remove every `<think>...</think>` span and trim what leads the remainder.
///
/// Text without a closed span is returned unchanged.
pub fn strip_reasoning(text: &str) -> String {
    if !THINK_SPAN.is_match(text) {
        return text.to_string();
    }
    THINK_SPAN.replace_all(text, "").trim_start().to_string()
}

/// Translate `upstream` into `shape` for the model `entry`.
///
/// `created_at` in Ollama shapes is taken from the upstream `created`
/// timestamp, or the current time when absent.
pub fn to_client_shape(shape: TargetShape, upstream: Value, entry: &ModelEntry) -> Result<Value> {
    let mut upstream = match upstream {
        Value::Object(map) => map,
        other => {
            return Err(PasserelleError::MalformedUpstreamResponse(format!(
                "expected a JSON object, got {other}"
            )));
        }
    };
    let Some(Value::Array(choices)) = upstream.get_mut("choices") else {
        return Err(PasserelleError::MalformedUpstreamResponse(
            "response has no 'choices' array".into(),
        ));
    };
    if entry.has_trait(ModelTrait::Reasoning) {
        choices.iter_mut().for_each(strip_choice);
    }

    match shape {
        TargetShape::OpenAi => Ok(Value::Object(upstream)),
        TargetShape::OllamaChat => ollama_object(&upstream, entry, |content| {
            ("message", json!({"role": "assistant", "content": content}))
        }),
        TargetShape::OllamaGenerate => {
            ollama_object(&upstream, entry, |content| ("response", Value::String(content)))
        }
    }
}

fn strip_choice(choice: &mut Value) {
    if let Some(Value::String(content)) = choice.pointer_mut("/message/content") {
        *content = strip_reasoning(content);
    }
    if let Some(Value::String(text)) = choice.get_mut("text") {
        *text = strip_reasoning(text);
    }
}

fn ollama_object(
    upstream: &Map<String, Value>,
    entry: &ModelEntry,
    body: impl FnOnce(String) -> (&'static str, Value),
) -> Result<Value> {
    let choice = upstream
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| PasserelleError::MalformedUpstreamResponse("'choices' is empty".into()))?;
    let content = choice
        .pointer("/message/content")
        .or_else(|| choice.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PasserelleError::MalformedUpstreamResponse("first choice has no content".into())
        })?;

    let mut out = Map::new();
    out.insert("model".into(), Value::String(entry.name.clone()));
    out.insert(
        "created_at".into(),
        Value::String(created_at(upstream.get("created"))),
    );
    let (key, value) = body(content.to_string());
    out.insert(key.into(), value);
    out.insert("done".into(), Value::Bool(true));
    out.insert(
        "done_reason".into(),
        choice
            .get("finish_reason")
            .filter(|v| v.is_string())
            .cloned()
            .unwrap_or_else(|| Value::String("stop".into())),
    );
    if let Some(usage) = upstream.get("usage") {
        if let Some(n) = usage.get("prompt_tokens").and_then(Value::as_u64) {
            out.insert("prompt_eval_count".into(), n.into());
        }
        if let Some(n) = usage.get("completion_tokens").and_then(Value::as_u64) {
            out.insert("eval_count".into(), n.into());
        }
    }
    Ok(Value::Object(out))
}

fn created_at(created: Option<&Value>) -> String {
    created
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A synthetic OpenAI response carrying `content`, used by test mode.
pub fn synthetic_openai(route_is_chat: bool, model: &str, content: &str) -> Value {
    let created = Utc::now().timestamp();
    let choice = if route_is_chat {
        json!({
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        })
    } else {
        json!({"index": 0, "text": content, "finish_reason": "stop"})
    };
    json!({
        "id": format!("test-{created}"),
        "object": if route_is_chat { "chat.completion" } else { "text_completion" },
        "created": created,
        "model": model,
        "choices": [choice],
        "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
    })
}
