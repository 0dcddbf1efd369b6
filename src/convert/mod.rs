//! Conversions from Ollama request bodies to OpenAI chat payloads.
//!
//! Both Ollama routes are served through the upstream chat endpoint, so
//! `/api/chat` and `/api/generate` bodies are rewritten into an OpenAI-style
//! chat payload before normalization. The result still carries the client
//! model name; resolution happens afterwards.

use serde_json::{Map, Value, json};

use crate::{PasserelleError, Result};

/// Ollama `options` keys mapped to OpenAI request fields.
const OPTION_FIELDS: &[(&str, &str)] = &[
    ("num_predict", "max_tokens"),
    ("temperature", "temperature"),
    ("top_p", "top_p"),
    ("seed", "seed"),
    ("stop", "stop"),
    ("presence_penalty", "presence_penalty"),
    ("frequency_penalty", "frequency_penalty"),
];

/// Top-level fields kept as they are. Mapped `options` override the
/// sampling ones.
const KEPT_FIELDS: &[&str] = &["model", "test_mode", "max_tokens", "temperature"];

/// Convert an Ollama `/api/chat` body.
///
/// `messages` is copied with `images` folded into `image_url` parts. A
/// missing `messages` field is left for the normalizer to report.
pub fn from_ollama_chat(payload: &Value) -> Result<Value> {
    let obj = as_object(payload)?;
    let mut out = base_payload(obj);
    if let Some(messages) = obj.get("messages") {
        let converted = match messages {
            Value::Array(items) => Value::Array(items.iter().map(convert_message).collect()),
            other => other.clone(),
        };
        out.insert("messages".into(), converted);
    }
    Ok(Value::Object(out))
}

/// Convert an Ollama `/api/generate` body into a two-message chat.
///
/// The system message is the request's `system` field, or `default_system`
/// when absent.
pub fn from_ollama_generate(payload: &Value, default_system: &str) -> Result<Value> {
    let obj = as_object(payload)?;
    let prompt = match obj.get("prompt") {
        None | Some(Value::Null) => return Err(PasserelleError::MissingField("prompt")),
        Some(Value::String(p)) => p.as_str(),
        Some(_) => {
            return Err(PasserelleError::InvalidField {
                field: "prompt",
                reason: "expected a string".into(),
            });
        }
    };
    let system = obj
        .get("system")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_system);

    let mut user = json!({"role": "user", "content": prompt});
    if let Some(images) = obj.get("images") {
        user["images"] = images.clone();
    }

    let mut out = base_payload(obj);
    out.insert(
        "messages".into(),
        json!([
            {"role": "system", "content": system},
            convert_message(&user),
        ]),
    );
    Ok(Value::Object(out))
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>> {
    payload.as_object().ok_or_else(|| {
        PasserelleError::MalformedRequest("request body must be a JSON object".into())
    })
}

/// Kept top-level fields plus mapped `options`. An option replaces the
/// top-level field it maps to.
fn base_payload(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for key in KEPT_FIELDS {
        if let Some(v) = obj.get(*key) {
            out.insert((*key).to_string(), v.clone());
        }
    }
    if let Some(Value::Object(options)) = obj.get("options") {
        for (from, to) in OPTION_FIELDS {
            if let Some(v) = options.get(*from).filter(|v| !v.is_null()) {
                out.insert((*to).to_string(), v.clone());
            }
        }
    }
    out
}

/// Fold Ollama `images` (bare base64) into OpenAI content parts.
fn convert_message(message: &Value) -> Value {
    let Some(obj) = message.as_object() else {
        return message.clone();
    };
    let images: Vec<&str> = obj
        .get("images")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut out = obj.clone();
    out.remove("images");
    if images.is_empty() {
        return Value::Object(out);
    }

    let mut parts = Vec::with_capacity(images.len() + 1);
    if let Some(text) = obj.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            parts.push(json!({"type": "text", "text": text}));
        }
    }
    for data in images {
        parts.push(json!({
            "type": "image_url",
            "image_url": {"url": data_url(data)},
        }));
    }
    out.insert("content".into(), Value::Array(parts));
    Value::Object(out)
}

/// `data:` URL for a base64 image, typed by its magic-number prefix.
fn data_url(base64: &str) -> String {
    let mime = if base64.starts_with("iVBOR") {
        "image/png"
    } else if base64.starts_with("R0lGOD") {
        "image/gif"
    } else if base64.starts_with("UklGR") {
        "image/webp"
    } else {
        "image/jpeg"
    };
    format!("data:{mime};base64,{base64}")
}
