//! Model registry — logical model names mapped to upstream deployments.
//!
//! The registry is built once at startup from two layers:
//! 1. **Embedded seed** — compiled-in JSON, always available
//! 2. **Override file** — optional JSON contributing extra alternate base
//!    URLs per model (see [`overrides`])
//!
//! After that it is read-only and shared behind an `Arc`.

pub mod overrides;

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::types::ModelEntry;
use crate::{PasserelleError, Result};

pub use overrides::{AlternateOverride, load_overrides, parse_overrides};

/// Strip a trailing `:tag` (e.g. `:latest`) from a client model name.
///
/// Everything from the first colon on is dropped.
pub fn strip_tag(name: &str) -> &str {
    name.split_once(':').map_or(name, |(base, _)| base)
}

/// Logical model name → [`ModelEntry`] lookup table.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: HashMap<String, ModelEntry>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a model entry, replacing any existing entry with the same name.
    pub fn insert(&mut self, entry: ModelEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Get an entry by its exact logical name.
    pub fn get(&self, name: &str) -> Option<&ModelEntry> {
        self.entries.get(name)
    }

    /// Resolve a client-supplied model name.
    ///
    /// The `:tag` suffix is stripped first. Exact matches win over
    /// ASCII case-insensitive ones. Unknown names fail with
    /// [`PasserelleError::ModelNotFound`]; there is no default model.
    pub fn resolve(&self, logical_name: &str) -> Result<&ModelEntry> {
        let name = strip_tag(logical_name.trim());
        if let Some(entry) = self.entries.get(name) {
            return Ok(entry);
        }
        self.entries
            .values()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| PasserelleError::ModelNotFound(name.to_string()))
    }

    /// All entries, sorted by logical name.
    pub fn list(&self) -> Vec<&ModelEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Number of entries in the registry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append alternate base URLs from an override layer.
    ///
    /// Overrides for unknown models are skipped with a warning. URLs already
    /// present on the entry (as primary or alternate) are not added twice.
    pub fn apply_overrides(&mut self, overrides: Vec<AlternateOverride>) {
        for o in overrides {
            let Some(entry) = self.entries.get_mut(&o.model) else {
                warn!(model = %o.model, "override for unknown model, skipping");
                continue;
            };
            for url in o.alternate_base_urls {
                let url = url.trim_end_matches('/').to_string();
                if entry.base_urls().any(|existing| existing == url) {
                    debug!(model = %o.model, %url, "duplicate alternate ignored");
                    continue;
                }
                entry.alternate_base_urls.push(url);
            }
        }
    }

    /// Create a registry pre-populated with the embedded seed data.
    pub fn with_embedded_seed() -> Self {
        let mut registry = Self::new();
        match serde_json::from_str::<Vec<ModelEntry>>(EMBEDDED_SEED) {
            Ok(entries) => {
                for entry in entries {
                    registry.insert(entry);
                }
            }
            Err(e) => {
                // Seed is compiled in and covered by tests; an empty
                // registry still serves listings and 404s.
                warn!(error = %e, "failed to parse embedded model seed");
            }
        }
        registry
    }

    /// Seed table merged with an optional override file.
    ///
    /// Never fails: a missing or broken override file only produces warnings.
    pub fn load(overrides_path: Option<&Path>) -> Self {
        let mut registry = Self::with_embedded_seed();
        if let Some(path) = overrides_path {
            registry.apply_overrides(load_overrides(path));
        }
        registry
    }
}

/// Raw JSON seed data compiled into the binary.
const EMBEDDED_SEED: &str = include_str!("seed.json");
