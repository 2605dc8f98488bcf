//! Reload Bridge probe
//!
//! Checks that a dev build can be bootstrapped from here:
//! - Reads bridge options from `RELOAD_BRIDGE_*` environment variables
//! - Resolves the remote options document, if one is configured
//! - Fetches the base runtime, dependency graph and unit metadata
//!
//! Prints the resolved bootstrap config as JSON.

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use reload_bridge::fetch::{FsFetcher, HttpFetcher};
use reload_bridge::runtime::resolve_config;
use reload_bridge::sdk::Fetcher;
use reload_bridge::BridgeOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn is_remote(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,reload_bridge=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = BridgeOptions::from_env().context("Invalid bridge options")?;
    tracing::info!("Options loaded: {:?}", options);

    let remote_debugger = env::var("RELOAD_BRIDGE_REMOTE_DEBUGGER")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let source = options
        .options_url
        .as_deref()
        .or(options.asset_path.as_deref())
        .unwrap_or_default();
    let fetcher: Arc<dyn Fetcher> = if is_remote(source) {
        Arc::new(HttpFetcher::new())
    } else {
        Arc::new(FsFetcher::new())
    };

    let config = resolve_config(&options, fetcher.as_ref(), remote_debugger)
        .await
        .context("Unable to resolve bootstrap config")?;

    let mut missing = Vec::new();
    for locator in [config.base_locator(), config.deps_locator(), config.cljs_deps_locator()] {
        match fetcher.fetch(&locator).await {
            Ok(response) if response.ok => {
                tracing::info!(%locator, bytes = response.body.len(), "Reachable");
            }
            Ok(response) => {
                tracing::error!(%locator, status = response.status, "Not available");
                missing.push(locator);
            }
            Err(e) => {
                tracing::error!(%locator, error = %e, "Fetch failed");
                missing.push(locator);
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&config)?);

    if !missing.is_empty() {
        bail!("{} bootstrap resource(s) unavailable: {}", missing.len(), missing.join(", "));
    }
    Ok(())
}
