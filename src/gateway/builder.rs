//! Builder for configuring gateway instances

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::Passerelle;
use crate::dispatch::{DispatchPolicy, Dispatcher, UpstreamClient};
use crate::normalize::{DefaultsConfig, HeuristicsConfig, Normalizer};
use crate::registry::{ModelRegistry, load_overrides};
use crate::{PasserelleError, Result};

/// Builder for configuring gateway instances.
///
/// Only the upstream token is required. Without an explicit registry the
/// embedded seed is used, merged with the override file when one is set.
#[derive(Default)]
pub struct PasserelleBuilder {
    token: Option<String>,
    registry: Option<ModelRegistry>,
    overrides_path: Option<PathBuf>,
    policy: DispatchPolicy,
    defaults: DefaultsConfig,
    heuristics: HeuristicsConfig,
    http: Option<reqwest::Client>,
}

impl PasserelleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bearer token sent to every upstream endpoint.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Use this registry instead of the embedded seed.
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Merge alternate endpoints from a JSON override file.
    pub fn overrides_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.overrides_path = Some(path.into());
        self
    }

    /// Set the dispatch policy (probes, timeouts, attempts, backoff).
    pub fn dispatch_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set global request defaults.
    pub fn defaults(mut self, defaults: DefaultsConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the keyword heuristics.
    pub fn heuristics(mut self, heuristics: HeuristicsConfig) -> Self {
        self.heuristics = heuristics;
        self
    }

    /// Share an existing HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<Passerelle> {
        let token = self
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PasserelleError::Configuration("no upstream token configured".into()))?;

        let mut registry = self
            .registry
            .unwrap_or_else(ModelRegistry::with_embedded_seed);
        if let Some(path) = &self.overrides_path {
            registry.apply_overrides(load_overrides(path));
        }
        if registry.is_empty() {
            return Err(PasserelleError::Configuration(
                "model registry is empty".into(),
            ));
        }
        info!(models = registry.len(), "model registry ready");

        let client = match self.http {
            Some(http) => UpstreamClient::with_http(http, token),
            None => UpstreamClient::new(token)?,
        };

        Ok(Passerelle::new(
            Arc::new(registry),
            Normalizer::new(self.defaults, self.heuristics),
            Dispatcher::new(client, self.policy),
        ))
    }
}
