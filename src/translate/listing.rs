//! Model listing responses for OpenAI, OpenWebUI and Ollama clients.

use serde_json::{Value, json};

use crate::types::ModelEntry;

/// Fixed creation timestamp reported for every model.
const LISTED_CREATED: i64 = 1_699_891_200;
const OWNED_BY: &str = "OVH AI";
/// Placeholder modification time for Ollama listings.
const LISTED_MODIFIED_AT: &str = "2023-11-04T14:56:49.277302746-07:00";

fn latest(name: &str) -> String {
    format!("{name}:latest")
}

/// `GET /v1/models`
pub fn openai_models(entries: &[&ModelEntry]) -> Value {
    let data: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "id": e.name,
                "object": "model",
                "created": LISTED_CREATED,
                "owned_by": OWNED_BY,
            })
        })
        .collect();
    json!({"object": "list", "data": data})
}

/// `GET /api/models`: OpenAI listing with `:latest` ids, as OpenWebUI expects.
pub fn openwebui_models(entries: &[&ModelEntry]) -> Value {
    let data: Vec<Value> = entries
        .iter()
        .map(|e| {
            let id = latest(&e.name);
            json!({
                "id": id,
                "name": id,
                "model_id": id,
                "object": "model",
                "created": LISTED_CREATED,
                "owned_by": OWNED_BY,
                "root": e.name,
                "parent": null,
                "permission": [],
            })
        })
        .collect();
    json!({"object": "list", "data": data})
}

/// `GET /api/tags`
pub fn ollama_tags(entries: &[&ModelEntry]) -> Value {
    let models: Vec<Value> = entries
        .iter()
        .map(|e| {
            let id = latest(&e.name);
            json!({
                "name": id,
                "model": id,
                "modified_at": LISTED_MODIFIED_AT,
                "size": 0,
                "digest": format!("sha256:{}", e.name),
                "details": {
                    "format": "gguf",
                    "family": family(&e.name),
                    "parameter_size": parameter_size(&e.name),
                    "quantization_level": "Q4_0",
                },
            })
        })
        .collect();
    json!({"models": models})
}

/// Leading word of the model name (`llama-3-1-8b` → `llama`).
fn family(name: &str) -> &str {
    name.split('-').next().unwrap_or(name)
}

/// First `<digits>b` segment of the name, upper-cased (`8b` → `8B`).
fn parameter_size(name: &str) -> String {
    name.split('-')
        .filter_map(|seg| {
            let n = seg.strip_suffix('b')?;
            (!n.is_empty() && n.chars().all(|c| c.is_ascii_digit() || c == 'x'))
                .then(|| format!("{n}B"))
        })
        .next()
        .unwrap_or_else(|| "unknown".to_string())
}
