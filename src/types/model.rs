//! Model registry entries.

use serde::{Deserialize, Serialize};

/// A behavioural trait of a model that changes how requests are built,
/// dispatched or translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTrait {
    /// Slow or verbose model: longer per-attempt timeout, more attempts.
    Slow,
    /// Code-generation model: low temperature, higher token floor.
    Code,
    /// Accepts image parts; roles are coerced and image URLs rewritten.
    Multimodal,
    /// Emits `<think>...</think>` reasoning traces that are stripped.
    Reasoning,
}

/// One logical model and where it is served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Logical name used by clients (registry key).
    pub name: String,
    /// Exact model id the provider expects in its `model` field.
    pub upstream_model_id: String,
    /// Primary deployment, tried first.
    pub primary_base_url: String,
    /// Other deployments of the same model, tried in order.
    #[serde(default)]
    pub alternate_base_urls: Vec<String>,
    /// Default `max_tokens` when the client does not set one.
    #[serde(default)]
    pub default_max_tokens: Option<u32>,
    #[serde(default)]
    pub traits: Vec<ModelTrait>,
}

impl ModelEntry {
    /// Create an entry with no alternates, defaults or traits.
    pub fn new(
        name: impl Into<String>,
        upstream_model_id: impl Into<String>,
        primary_base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            upstream_model_id: upstream_model_id.into(),
            primary_base_url: primary_base_url.into(),
            alternate_base_urls: Vec::new(),
            default_max_tokens: None,
            traits: Vec::new(),
        }
    }

    /// Add an alternate deployment.
    pub fn with_alternate(mut self, base_url: impl Into<String>) -> Self {
        self.alternate_base_urls.push(base_url.into());
        self
    }

    /// Set the per-model default `max_tokens`.
    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = Some(max_tokens);
        self
    }

    /// Add a trait to this model.
    pub fn with_trait(mut self, t: ModelTrait) -> Self {
        if !self.traits.contains(&t) {
            self.traits.push(t);
        }
        self
    }

    pub fn has_trait(&self, t: ModelTrait) -> bool {
        self.traits.contains(&t)
    }

    /// Candidate base URLs: primary first, then alternates in order.
    pub fn base_urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary_base_url.as_str())
            .chain(self.alternate_base_urls.iter().map(String::as_str))
    }
}
