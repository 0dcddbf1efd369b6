//! Passerelle - OpenAI/Ollama compatible proxy for per-model endpoints
//!
//! Clients speak the OpenAI (`/v1/...`) or Ollama (`/api/...`) wire
//! protocol. Each logical model is served by its own upstream deployment
//! with an OpenAI-compatible API; Passerelle resolves the model, fills in
//! per-model defaults, dispatches with auth probing, retries and fallback
//! to alternate deployments, and translates the answer back into the
//! caller's shape.
//!
//! # Example
//!
//! ```rust,no_run
//! use passerelle::{ClientRoute, Passerelle};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> passerelle::Result<()> {
//!     let gateway = Passerelle::builder().token("your-token").build()?;
//!
//!     let response = gateway
//!         .handle(
//!             ClientRoute::OpenAiChat,
//!             json!({
//!                 "model": "llama-3-1-8b-instruct:latest",
//!                 "messages": [{"role": "user", "content": "Bonjour"}]
//!             }),
//!         )
//!         .await;
//!
//!     match response {
//!         Ok(body) => println!("{}", body["choices"][0]["message"]["content"]),
//!         Err(failure) => eprintln!("{}: {}", failure.status_code(), failure),
//!     }
//!     Ok(())
//! }
//! ```

mod convert;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod registry;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;
pub mod translate;
pub mod types;
mod version;

// Re-export main types at crate root
pub use dispatch::{DispatchPolicy, Dispatcher, EndpointReport, RetryPolicy, UpstreamClient};
pub use error::{ErrorBody, PasserelleError, Result};
pub use gateway::{Passerelle, PasserelleBuilder, RequestFailure};
pub use normalize::{DefaultsConfig, HeuristicsConfig, Normalizer};
pub use registry::ModelRegistry;
pub use version::{BUILD_TIMESTAMP, GIT_BRANCH, GIT_SHA, PKG_VERSION, git_dirty, version_string};

// Re-export all types
pub use types::{
    ClientRoute, ControlFlags, Message, MessageContent, ModelEntry, ModelTrait, Role, RouteKind,
    TargetShape, UpstreamBody, UpstreamRequest,
};
