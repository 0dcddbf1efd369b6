//! Route kinds, client shapes and the canonical upstream payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::Message;

/// Upstream request shape: which OpenAI-compatible path is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Chat,
    Completion,
}

impl RouteKind {
    /// Path below `{base_url}/api/openai_compat/v1/`.
    pub fn upstream_path(&self) -> &'static str {
        match self {
            RouteKind::Chat => "chat/completions",
            RouteKind::Completion => "completions",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Chat => "chat",
            RouteKind::Completion => "completion",
        }
    }
}

/// Response envelope expected by the calling client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetShape {
    /// OpenAI chat or completion object, passed through.
    OpenAi,
    /// Ollama `/api/chat` object with a `message` field.
    OllamaChat,
    /// Ollama `/api/generate` object with a `response` field.
    OllamaGenerate,
}

/// A client-facing route: the pair of upstream route kind and client shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientRoute {
    /// `POST /v1/chat/completions`
    OpenAiChat,
    /// `POST /v1/completions`
    OpenAiCompletion,
    /// `POST /api/chat`
    OllamaChat,
    /// `POST /api/generate`
    OllamaGenerate,
}

impl ClientRoute {
    /// Upstream route kind. Both Ollama routes go through chat.
    pub fn route_kind(&self) -> RouteKind {
        match self {
            ClientRoute::OpenAiCompletion => RouteKind::Completion,
            _ => RouteKind::Chat,
        }
    }

    pub fn target_shape(&self) -> TargetShape {
        match self {
            ClientRoute::OpenAiChat | ClientRoute::OpenAiCompletion => TargetShape::OpenAi,
            ClientRoute::OllamaChat => TargetShape::OllamaChat,
            ClientRoute::OllamaGenerate => TargetShape::OllamaGenerate,
        }
    }

    /// Metric/log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientRoute::OpenAiChat => "openai_chat",
            ClientRoute::OpenAiCompletion => "openai_completion",
            ClientRoute::OllamaChat => "ollama_chat",
            ClientRoute::OllamaGenerate => "ollama_generate",
        }
    }
}

/// Body of the upstream payload, keyed by its JSON field when flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamBody {
    Messages(Vec<Message>),
    Prompt(String),
}

/// The canonical payload sent to an upstream endpoint.
///
/// `model` always carries the provider's model id, never the logical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    pub model: String,
    #[serde(flatten)]
    pub body: UpstreamBody,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Sampling options forwarded verbatim (`top_p`, `stop`, `seed`, ...).
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl UpstreamRequest {
    pub fn messages(&self) -> Option<&[Message]> {
        match &self.body {
            UpstreamBody::Messages(m) => Some(m),
            UpstreamBody::Prompt(_) => None,
        }
    }

    pub fn prompt(&self) -> Option<&str> {
        match &self.body {
            UpstreamBody::Prompt(p) => Some(p),
            UpstreamBody::Messages(_) => None,
        }
    }
}

/// Control flags carried in a client request that never reach upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlFlags {
    /// Answer with a synthetic response instead of calling upstream.
    pub test_mode: bool,
}

impl ControlFlags {
    /// Read control flags from a raw client payload.
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            test_mode: payload
                .get("test_mode")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}
