//! Bootstrap orchestrator
//!
//! Brings up an application compiled without optimizations in four phases:
//!
//! 1. Load the base runtime (`goog/base.js`) and publish the import hooks
//! 2. Load the dependency graph (`goog/deps.js`)
//! 3. Load the compiled-unit metadata (`cljs_deps.js`)
//! 4. Require each preload, then the main unit, and wait for the chain
//!
//! Phases 1 to 3 are direct loads awaited one after another. Phase 4 drives
//! the module system's resolver, which imports units through the hook, so
//! its loads go through the [`Sequencer`] chain.

use std::sync::Arc;

use reload_bridge_sdk::host::FetchEvaluate;
use reload_bridge_sdk::registry::munge;
use reload_bridge_sdk::{Evaluator, Fetcher, HostError, Loader, Registry, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::BootstrapConfig;
use crate::error::{BridgeError, Result};
use super::sequencer::Sequencer;

/// Hook the module system calls to import a unit: `(url, opt_src_text)`
pub const IMPORT_SCRIPT_HOOK: &str = "CLOSURE_IMPORT_SCRIPT";

/// Hook the reload client calls to re-import a unit: `(uri, callback)`
pub const RELOAD_IMPORT_HOOK: &str = "FIGWHEEL_IMPORT_SCRIPT";

/// Tells the base runtime not to load `deps.js` on its own
pub const NO_DEPS_FLAG: &str = "CLOSURE_NO_DEPS";

pub const UNCOMPILED_DEFINES: &str = "CLOSURE_UNCOMPILED_DEFINES";

pub const BASE_PATH: &str = "goog.basePath";

/// The module system's resolver
pub const REQUIRE: &str = "goog.require";

/// Runs bootstrap attempts against one host
#[derive(Clone)]
pub struct Bootstrapper {
    fetcher: Arc<dyn Fetcher>,
    evaluator: Arc<dyn Evaluator>,
    registry: Registry,
}

impl Bootstrapper {
    pub fn new(fetcher: Arc<dyn Fetcher>, evaluator: Arc<dyn Evaluator>, registry: Registry) -> Self {
        Self {
            fetcher,
            evaluator,
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Run the four phases and return the config, augmented with its chain
    ///
    /// Any failure ends the attempt; it is logged here and returned. No
    /// phase is timed out, so a fetch that never answers leaves the attempt
    /// pending.
    pub async fn bootstrap(&self, config: BootstrapConfig) -> Result<BootstrapConfig> {
        let attempt = Uuid::new_v4();
        let span = tracing::info_span!("bootstrap", %attempt, main = %config.main);

        let result = self.run(config).instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| tracing::error!(error = %e, "Bootstrap failed"));
        }
        result
    }

    async fn run(&self, mut config: BootstrapConfig) -> Result<BootstrapConfig> {
        let evaluator = config
            .evaluator
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.evaluator));
        let loader: Arc<dyn Loader> = match &config.loader {
            Some(loader) => Arc::clone(loader),
            None => Arc::new(FetchEvaluate::new(
                Arc::clone(&self.fetcher),
                Arc::clone(&evaluator),
                self.registry.clone(),
            )),
        };
        let sequencer = Sequencer::new(loader, evaluator, self.registry.clone());

        let base = config.base_locator();
        self.registry
            .define(NO_DEPS_FLAG, true)
            .map_err(|e| BridgeError::load(&base, e))?;

        sequencer.load(&base).await?;
        self.install_hooks(&sequencer, &config)
            .map_err(|e| BridgeError::load(&base, e))?;
        tracing::info!(locator = %base, "Base runtime loaded");

        let deps = config.deps_locator();
        sequencer.load(&deps).await?;
        tracing::info!(locator = %deps, "Dependency graph loaded");

        let cljs_deps = config.cljs_deps_locator();
        sequencer.load(&cljs_deps).await?;
        tracing::info!(locator = %cljs_deps, "Compiled-unit metadata loaded");

        for preload in &config.preloads {
            self.require(preload)?;
        }
        self.require(&config.main)?;

        let queued = sequencer.queued();
        sequencer.settle().await;
        tracing::info!(queued, "Import chain settled");

        config.sequencer = Some(sequencer);
        Ok(config)
    }

    fn install_hooks(&self, sequencer: &Sequencer, config: &BootstrapConfig) -> Result<(), HostError> {
        self.registry.define(BASE_PATH, config.base_path())?;
        if let Some(defines) = &config.closure_defines {
            self.registry
                .define(UNCOMPILED_DEFINES, Value::Json(defines.clone().into()))?;
        }
        self.registry.define(IMPORT_SCRIPT_HOOK, sequencer.import_hook())?;

        // A no-op unless a reload client is loaded, which may replace it
        self.registry.define(RELOAD_IMPORT_HOOK, sequencer.reload_hook())?;
        Ok(())
    }

    /// Ask the module system to resolve `id`, importing what it needs
    fn require(&self, id: &str) -> Result<()> {
        let resolver = self
            .registry
            .resolve(REQUIRE)
            .ok_or_else(|| BridgeError::ModuleSystemMissing(REQUIRE.to_string()))?;

        let id = munge(id);
        tracing::debug!(namespace = %id, "Requiring namespace");
        resolver
            .call(&[Value::from(id.as_str())])
            .map(|_| ())
            .map_err(|source| BridgeError::Require { id, source })
    }
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("registry", &self.registry)
            .finish()
    }
}
