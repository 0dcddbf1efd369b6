//! Telemetry metric name constants.
//!
//! Centralised metric names for passerelle operations. Deployments install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `passerelle_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model` — logical model name (e.g. "llama-3-1-8b-instruct")
//! - `route` — client route (e.g. "openai_chat", "ollama_generate")
//! - `status` — HTTP status returned to the client (e.g. "200", "404")
//! - `phase` — dispatch phase: "probe", "preflight" or "full"

/// Total client requests handled by the gateway.
///
/// Labels: `model` ("unknown" before resolution), `route`, `status`.
pub const REQUESTS_TOTAL: &str = "passerelle_requests_total";

/// Client request duration in seconds, dispatch included.
///
/// Labels: `model`, `route`.
pub const REQUEST_DURATION_SECONDS: &str = "passerelle_request_duration_seconds";

/// Total outbound calls made to upstream endpoints.
///
/// Labels: `phase`, `outcome` (error kind, or "ok").
pub const UPSTREAM_ATTEMPTS_TOTAL: &str = "passerelle_upstream_attempts_total";

/// Total retries of a full attempt (not counting the initial request).
///
/// Labels: `model`.
pub const RETRIES_TOTAL: &str = "passerelle_retries_total";

/// Total times dispatch gave up on an endpoint and moved to the next one.
///
/// Labels: `model`.
pub const FALLBACKS_TOTAL: &str = "passerelle_fallbacks_total";
