//! passerelled — Passerelle daemon.
//!
//! Serves OpenAI and Ollama compatible routes in front of per-model
//! upstream deployments.

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use passerelle::server::config::{Config, DEV_PLACEHOLDER_TOKEN, Secrets, TOKEN_ENV_VAR};
use passerelle::{DispatchPolicy, Passerelle, PasserelleError};

/// Passerelle daemon — OpenAI/Ollama proxy for per-model endpoints.
#[derive(Parser)]
#[command(name = "passerelled")]
#[command(version = passerelle::PKG_VERSION)]
#[command(about = "OpenAI/Ollama compatible proxy daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "PASSERELLE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Address to bind to, overriding the config file.
    #[arg(short, long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    let token = match secrets.token() {
        Some(token) => token,
        None => {
            warn!(
                env = TOKEN_ENV_VAR,
                "no upstream token configured, running in development mode"
            );
            DEV_PLACEHOLDER_TOKEN.to_string()
        }
    };

    let mut builder = Passerelle::builder()
        .token(token)
        .dispatch_policy(DispatchPolicy::from(&config.dispatch))
        .defaults(config.defaults.clone())
        .heuristics(config.heuristics.clone());
    if let Some(path) = &config.upstream.overrides {
        builder = builder.overrides_file(path);
    }
    let gateway = builder.build()?;

    let address = args.address.unwrap_or(config.server.address.clone());
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| PasserelleError::Configuration(format!("Invalid address {address}: {e}")))?;

    info!(
        version = passerelle::version_string(),
        %addr,
        models = gateway.registry().len(),
        "passerelled starting"
    );

    let app = passerelle::server::router(gateway, &config.server.limits);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("passerelled stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
