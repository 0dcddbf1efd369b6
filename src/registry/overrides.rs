//! Override file — extra alternate deployments per model.
//!
//! The file is a JSON object keyed by logical model name. Each value is a
//! base URL or a list of base URLs:
//!
//! ```json
//! {
//!   "llama-3-1-8b-instruct": ["https://llama-eu.example.net", "https://llama-us.example.net"],
//!   "mistral-7b-instruct-v0.3": "https://mistral-backup.example.net"
//! }
//! ```
//!
//! Malformed entries are logged and skipped. A missing or unparseable file
//! yields no overrides; startup never fails because of it.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{PasserelleError, Result};

/// Alternate base URLs contributed for one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateOverride {
    pub model: String,
    pub alternate_base_urls: Vec<String>,
}

/// Parse override JSON.
///
/// Returns an error only if the document itself is not a JSON object;
/// individual bad entries and URLs are dropped with a warning.
pub fn parse_overrides(json: &str) -> Result<Vec<AlternateOverride>> {
    let root: Map<String, Value> = serde_json::from_str(json).map_err(|e| {
        PasserelleError::Configuration(format!("failed to parse override file: {e}"))
    })?;

    let mut overrides = Vec::with_capacity(root.len());
    for (model, value) in root {
        let candidates = match value {
            Value::String(url) => vec![Value::String(url)],
            Value::Array(items) => items,
            other => {
                warn!(%model, value = %other, "override entry is not a URL or list of URLs, skipping");
                continue;
            }
        };

        let urls: Vec<String> = candidates
            .into_iter()
            .filter_map(|item| match item {
                Value::String(url) if is_http_url(&url) => Some(url),
                other => {
                    warn!(%model, value = %other, "invalid alternate URL, skipping");
                    None
                }
            })
            .collect();

        if urls.is_empty() {
            warn!(%model, "override entry has no usable URLs, skipping");
            continue;
        }
        overrides.push(AlternateOverride {
            model,
            alternate_base_urls: urls,
        });
    }
    Ok(overrides)
}

/// Load overrides from disk.
///
/// Returns an empty list on a missing, unreadable or corrupt file.
pub fn load_overrides(path: &Path) -> Vec<AlternateOverride> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read override file");
            return Vec::new();
        }
    };
    match parse_overrides(&content) {
        Ok(overrides) => {
            info!(path = %path.display(), models = overrides.len(), "loaded endpoint overrides");
            overrides
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt override file");
            Vec::new()
        }
    }
}

fn is_http_url(url: &str) -> bool {
    (url.starts_with("https://") || url.starts_with("http://")) && !url.contains(char::is_whitespace)
}
