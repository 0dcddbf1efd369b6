//! Dispatch engine — sends a normalized request to the first upstream
//! deployment that answers.
//!
//! For each candidate endpoint (primary first, then alternates in order):
//!
//! 1. **Auth probe** (optional): `GET .../models` with a short timeout.
//!    `401`/`403` skips the endpoint; any other failure is only logged.
//! 2. **Pre-flight** (optional, chat with more than one message): the last
//!    user message alone with a tiny `max_tokens`. The result is discarded;
//!    only `401`/`403` skips the endpoint.
//! 3. **Full attempt**: up to N calls with exponential backoff on 5xx,
//!    timeouts and connection errors. `401`/`403`, `429` and other 4xx move
//!    on to the next endpoint without retrying.
//!
//! The first 2xx response wins. When every candidate fails, the last
//! recorded error is returned. Probe and pre-flight exist because cold
//! endpoints can hang silently; a cheap short-timeout call first avoids
//! spending a long timeout on a dead deployment.
//!
//! Worst-case latency is the sum of all probe, pre-flight and attempt
//! timeouts across every candidate. Cap fan-out with
//! [`DispatchPolicy::max_candidates`].

mod client;
pub mod retry;

use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::registry::ModelRegistry;
use crate::telemetry;
use crate::types::{ModelEntry, ModelTrait, Role, RouteKind, UpstreamBody, UpstreamRequest};
use crate::{PasserelleError, Result};

pub use client::{UpstreamClient, endpoint_url};
pub use retry::RetryPolicy;

/// Upstream path listing models, used for auth probes.
const MODELS_PATH: &str = "models";

/// Dispatch phase, used as a log field and metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Probe,
    Preflight,
    Full,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Probe => "probe",
            Phase::Preflight => "preflight",
            Phase::Full => "full",
        }
    }
}

/// Timeouts, attempt ceilings and backoff for dispatch.
///
/// Models with [`ModelTrait::Slow`] get the `slow_*` timeout and attempt
/// ceiling.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Run the auth probe before each endpoint. Default: true.
    pub auth_probe: bool,
    /// Timeout of the auth probe. Default: 5s.
    pub probe_timeout: Duration,
    /// Run the simplified pre-flight for multi-message chats. Default: true.
    pub preflight: bool,
    /// Timeout of the pre-flight call. Default: 15s.
    pub preflight_timeout: Duration,
    /// `max_tokens` ceiling of the pre-flight call. Default: 50.
    pub preflight_max_tokens: u32,
    /// Per-attempt timeout. Default: 60s.
    pub timeout: Duration,
    /// Per-attempt timeout for slow models. Default: 120s.
    pub slow_timeout: Duration,
    /// Full-attempt ceiling, initial call included. Default: 2.
    pub max_attempts: u32,
    /// Full-attempt ceiling for slow models. Default: 3.
    pub slow_max_attempts: u32,
    /// Backoff between attempts.
    pub retry: RetryPolicy,
    /// Maximum number of endpoints tried per request. Default: unlimited.
    pub max_candidates: Option<usize>,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            auth_probe: true,
            probe_timeout: Duration::from_secs(5),
            preflight: true,
            preflight_timeout: Duration::from_secs(15),
            preflight_max_tokens: 50,
            timeout: Duration::from_secs(60),
            slow_timeout: Duration::from_secs(120),
            max_attempts: 2,
            slow_max_attempts: 3,
            retry: RetryPolicy::default(),
            max_candidates: None,
        }
    }
}

impl DispatchPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the auth probe.
    pub fn auth_probe(mut self, enabled: bool) -> Self {
        self.auth_probe = enabled;
        self
    }

    /// Enable or disable the pre-flight call.
    pub fn preflight(mut self, enabled: bool) -> Self {
        self.preflight = enabled;
        self
    }

    /// Set the per-attempt timeouts (standard and slow models).
    pub fn timeouts(mut self, standard: Duration, slow: Duration) -> Self {
        self.timeout = standard;
        self.slow_timeout = slow;
        self
    }

    /// Set the probe and pre-flight timeouts.
    pub fn check_timeouts(mut self, probe: Duration, preflight: Duration) -> Self {
        self.probe_timeout = probe;
        self.preflight_timeout = preflight;
        self
    }

    /// Set the attempt ceilings (standard and slow models).
    pub fn max_attempts(mut self, standard: u32, slow: u32) -> Self {
        self.max_attempts = standard;
        self.slow_max_attempts = slow;
        self
    }

    /// Set the backoff policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cap the number of endpoints tried per request.
    pub fn max_candidates(mut self, n: usize) -> Self {
        self.max_candidates = Some(n);
        self
    }

    /// Attempt ceiling for `entry`.
    pub fn attempts_for(&self, entry: &ModelEntry) -> u32 {
        if entry.has_trait(ModelTrait::Slow) {
            self.slow_max_attempts
        } else {
            self.max_attempts
        }
    }

    /// Per-attempt timeout for `entry`.
    pub fn timeout_for(&self, entry: &ModelEntry) -> Duration {
        if entry.has_trait(ModelTrait::Slow) {
            self.slow_timeout
        } else {
            self.timeout
        }
    }
}

/// Probe outcome for one endpoint, as reported by [`Dispatcher::diagnose`].
#[derive(Debug, Clone, Serialize)]
pub struct EndpointReport {
    pub model: String,
    pub endpoint: String,
    pub reachable: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Sends upstream requests with probing, retries and endpoint fallback.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: UpstreamClient,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(client: UpstreamClient, policy: DispatchPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Ordered candidate base URLs for `entry`, capped by `max_candidates`.
    pub fn candidates<'a>(&self, entry: &'a ModelEntry) -> Vec<&'a str> {
        let limit = self.policy.max_candidates.unwrap_or(usize::MAX);
        entry.base_urls().take(limit).collect()
    }

    /// Send `request` to the first endpoint of `entry` that succeeds.
    ///
    /// Returns the upstream JSON unchanged, or the last error recorded
    /// across all candidates.
    pub async fn dispatch(
        &self,
        route: RouteKind,
        request: &UpstreamRequest,
        entry: &ModelEntry,
    ) -> Result<Value> {
        let candidates = self.candidates(entry);
        if candidates.is_empty() {
            return Err(PasserelleError::ModelNotFound(entry.name.clone()));
        }

        let mut last_error = None;
        for (index, base_url) in candidates.into_iter().enumerate() {
            if index > 0 {
                metrics::counter!(telemetry::FALLBACKS_TOTAL, "model" => entry.name.clone())
                    .increment(1);
                info!(model = %entry.name, endpoint = base_url, index, "falling back to alternate endpoint");
            }
            match self.try_endpoint(route, request, entry, base_url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!(
                        model = %entry.name,
                        endpoint = base_url,
                        error = %e,
                        "endpoint failed"
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| PasserelleError::ModelNotFound(entry.name.clone())))
    }

    async fn try_endpoint(
        &self,
        route: RouteKind,
        request: &UpstreamRequest,
        entry: &ModelEntry,
        base_url: &str,
    ) -> Result<Value> {
        if self.policy.auth_probe {
            self.probe_auth(base_url, entry).await?;
        }
        if self.policy.preflight && route == RouteKind::Chat {
            self.preflight(base_url, request, entry).await?;
        }

        let url = endpoint_url(base_url, route.upstream_path());
        let timeout = self.policy.timeout_for(entry);
        let client = &self.client;
        let target = url.as_str();
        retry::with_retry(
            &self.policy.retry,
            self.policy.attempts_for(entry),
            &entry.name,
            target,
            move || async move {
                let result = client.post_json(target, request, timeout).await;
                record_attempt(Phase::Full, &result);
                result
            },
        )
        .await
    }

    /// Fails only on `401`/`403`; every other outcome is advisory.
    async fn probe_auth(&self, base_url: &str, entry: &ModelEntry) -> Result<()> {
        let url = endpoint_url(base_url, MODELS_PATH);
        let result = self.client.get(&url, self.policy.probe_timeout).await;
        record_attempt(Phase::Probe, &result);
        match result {
            Ok(status) => {
                debug!(model = %entry.name, endpoint = %url, status, "auth probe ok");
                Ok(())
            }
            Err(e @ PasserelleError::AuthFailure { .. }) => Err(e),
            Err(e) => {
                warn!(model = %entry.name, endpoint = %url, error = %e, "auth probe failed, continuing");
                Ok(())
            }
        }
    }

    /// Warm the endpoint with the last user message only.
    ///
    /// Skipped for single-message chats. Fails only on `401`/`403`.
    async fn preflight(
        &self,
        base_url: &str,
        request: &UpstreamRequest,
        entry: &ModelEntry,
    ) -> Result<()> {
        let Some(messages) = request.messages() else {
            return Ok(());
        };
        if messages.len() <= 1 {
            return Ok(());
        }
        let Some(last_user) = messages.iter().rev().find(|m| m.role == Role::User) else {
            return Ok(());
        };

        let reduced = UpstreamRequest {
            model: request.model.clone(),
            body: UpstreamBody::Messages(vec![last_user.clone()]),
            max_tokens: request.max_tokens.min(self.policy.preflight_max_tokens),
            temperature: request.temperature,
            options: Map::new(),
        };
        let url = endpoint_url(base_url, RouteKind::Chat.upstream_path());
        let result = self
            .client
            .post_json(&url, &reduced, self.policy.preflight_timeout)
            .await;
        record_attempt(Phase::Preflight, &result);
        match result {
            Ok(_) => {
                debug!(model = %entry.name, endpoint = %url, "pre-flight ok");
                Ok(())
            }
            Err(e @ PasserelleError::AuthFailure { .. }) => Err(e),
            Err(e) => {
                debug!(model = %entry.name, endpoint = %url, error = %e, "pre-flight failed, continuing");
                Ok(())
            }
        }
    }

    /// Probe every endpoint of every registered model concurrently.
    pub async fn diagnose(&self, registry: &ModelRegistry) -> Vec<EndpointReport> {
        let mut probes = Vec::new();
        for entry in registry.list() {
            for base_url in entry.base_urls() {
                probes.push(self.probe_endpoint(&entry.name, base_url));
            }
        }
        join_all(probes).await
    }

    async fn probe_endpoint(&self, model: &str, base_url: &str) -> EndpointReport {
        let url = endpoint_url(base_url, MODELS_PATH);
        let start = Instant::now();
        let result = self.client.get(&url, self.policy.probe_timeout).await;
        let latency_ms = start.elapsed().as_millis() as u64;
        let (reachable, status, error) = match result {
            Ok(status) => (true, Some(status), None),
            // Timeouts and connection failures carry no HTTP status.
            Err(e @ (PasserelleError::Timeout { .. } | PasserelleError::Connection { .. })) => {
                (false, None, Some(e.to_string()))
            }
            Err(e) => (false, Some(e.status_code()), Some(e.to_string())),
        };
        EndpointReport {
            model: model.to_string(),
            endpoint: base_url.to_string(),
            reachable,
            status,
            error,
            latency_ms,
        }
    }
}

fn record_attempt<T>(phase: Phase, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::counter!(telemetry::UPSTREAM_ATTEMPTS_TOTAL,
        "phase" => phase.as_str(),
        "outcome" => outcome,
    )
    .increment(1);
}
