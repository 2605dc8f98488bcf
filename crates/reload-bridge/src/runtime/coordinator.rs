//! Reload coordinator
//!
//! Wraps an application's root view. The coordinator starts `Unloaded`; the
//! first [`ReloadCoordinator::mount`] moves it to `Loading` and returns the
//! load future, later mounts return nothing. When the load succeeds it moves
//! to `Loaded`, holding the app's render entry, and from then on reload
//! notifications only ask the view layer to render again. The app is never
//! loaded twice and the coordinator never goes back to waiting.
//!
//! A load that fails leaves the coordinator `Loading`, showing the waiting
//! view; the fault is logged and kept for inspection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::{BoxFuture, FutureExt};
use reload_bridge_sdk::events::{ReloadHandler, ReloadNotifier, Subscription};
use reload_bridge_sdk::registry::munge;
use reload_bridge_sdk::{Fetcher, HostError, NativeFn, Registry, Value};
use serde_json::Value as JsonValue;
use tokio::sync::watch;

use crate::config::{BootstrapConfig, BridgeOptions};
use crate::error::{BridgeError, Result};
use crate::fetch::{correct_url, fetch_options};
use super::bootstrap::Bootstrapper;
use super::events::AFTER_LOAD_EVENT;

/// Text shown until the app is loaded
pub const WAITING_MESSAGE: &str = "Waiting for Figwheel to load files.";

/// Registry name of the function that forces a re-render
pub const REFRESH_HOOK: &str = "goog.figwheelBridgeRefresh";

/// Produces the app's root element
pub type RenderEntry = Arc<dyn Fn() -> Result<Value, HostError> + Send + Sync>;

/// Lifecycle of a coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
}

/// What the coordinator renders
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// Placeholder shown while the app loads
    Waiting(&'static str),
    /// Output of the app's render entry
    Element(Value),
}

/// A loaded application
pub struct LoadedApp {
    /// Config the app was bootstrapped with; owns the import chain
    pub config: BootstrapConfig,
    pub entry: RenderEntry,
}

impl std::fmt::Debug for LoadedApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedApp")
            .field("config", &self.config)
            .finish()
    }
}

/// Resolve options, bootstrap, and find the render entry
///
/// With an `optionsUrl` the remote document is fetched first and the
/// caller's own fields override it.
pub async fn load_app(
    options: &BridgeOptions,
    bootstrapper: &Bootstrapper,
    remote_debugger: bool,
) -> Result<LoadedApp> {
    let config = resolve_config(options, bootstrapper.fetcher().as_ref(), remote_debugger).await?;
    let config = bootstrapper.bootstrap(config).await?;
    let entry = render_entry(bootstrapper.registry(), &config.main, &options.render_fn)?;
    Ok(LoadedApp { config, entry })
}

/// Produce the bootstrap record for `options`
///
/// Fetches and merges the remote options document when one is configured.
pub async fn resolve_config(
    options: &BridgeOptions,
    fetcher: &dyn Fetcher,
    remote_debugger: bool,
) -> Result<BootstrapConfig> {
    let Some(url) = &options.options_url else {
        return options.to_bootstrap_config();
    };

    let url = correct_url(url, remote_debugger);
    let mut document = fetch_options(fetcher, &url).await?;
    document.extend(options.overrides());
    tracing::debug!(%url, "Merged remote options");
    BootstrapConfig::from_document(document)
}

/// Build the render entry for `render_fn` on the main namespace
///
/// The function is looked up on every call so reloaded code is picked up.
fn render_entry(registry: &Registry, main: &str, render_fn: &str) -> Result<RenderEntry> {
    let namespace = munge(main);
    let Some(main_ns) = registry.resolve(&namespace) else {
        return Err(BridgeError::Resolution(format!("Namespace {} not found.", main)));
    };
    if main_ns.member(render_fn).and_then(Value::as_function).is_none() {
        return Err(BridgeError::Resolution(format!(
            "Render function {} not found.",
            render_fn
        )));
    }

    let registry = registry.clone();
    let target = format!("{}.{}", namespace, render_fn);
    Ok(Arc::new(move || registry.call(&target, &[])))
}

#[derive(Default)]
struct BridgeState {
    phase: LoadState,
    entry: Option<RenderEntry>,
    app: Option<BootstrapConfig>,
    error: Option<BridgeError>,
    subscription: Option<Subscription>,
}

struct Inner {
    options: BridgeOptions,
    bootstrapper: Bootstrapper,
    notifier: Arc<dyn ReloadNotifier>,
    remote_debugger: AtomicBool,
    state: Mutex<BridgeState>,
    reloads: AtomicU64,
    revision: watch::Sender<u64>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refresh(&self) {
        tracing::info!("Refreshing root element");
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn finish_load(self: &Arc<Self>, app: LoadedApp) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let refresh = NativeFn::new("figwheel_bridge_refresh", move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.refresh();
            }
            Ok(Value::Null)
        });
        if let Err(e) = self.bootstrapper.registry().define(REFRESH_HOOK, refresh) {
            tracing::warn!(error = %e, "Could not publish refresh hook");
        }

        let subscription = self.options.auto_refresh.then(|| {
            let weak: Weak<Inner> = Arc::downgrade(self);
            let handler: ReloadHandler = Arc::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.refresh();
                }
            });
            self.notifier.subscribe(AFTER_LOAD_EVENT, handler)
        });

        {
            let mut state = self.state();
            state.phase = LoadState::Loaded;
            state.entry = Some(app.entry);
            state.app = Some(app.config);
            state.subscription = subscription;
        }
        tracing::info!(auto_refresh = self.options.auto_refresh, "Application loaded");
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// Mount-once loader and reload listener for an app's root view
#[derive(Clone)]
pub struct ReloadCoordinator {
    inner: Arc<Inner>,
}

impl ReloadCoordinator {
    /// Validate `options` and build an unloaded coordinator
    ///
    /// Validation faults are returned here, before anything is fetched.
    pub fn new(
        options: JsonValue,
        bootstrapper: Bootstrapper,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Result<Self> {
        let options = BridgeOptions::from_value(options)?;
        Ok(Self::with_options(options, bootstrapper, notifier))
    }

    /// Build from already validated options
    pub fn with_options(
        options: BridgeOptions,
        bootstrapper: Bootstrapper,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                options,
                bootstrapper,
                notifier,
                remote_debugger: AtomicBool::new(false),
                state: Mutex::new(BridgeState::default()),
                reloads: AtomicU64::new(0),
                revision,
            }),
        }
    }

    /// Rewrite `optionsUrl` to the local machine, for remote debugging
    ///
    /// Only takes effect before the first mount.
    pub fn with_remote_debugger(self, remote_debugger: bool) -> Self {
        self.inner.remote_debugger.store(remote_debugger, Ordering::SeqCst);
        self
    }

    /// Start loading the app, once
    ///
    /// Returns the load future on the first call and `None` afterwards. The
    /// caller drives the future (spawn it or await it).
    pub fn mount(&self) -> Option<BoxFuture<'static, ()>> {
        {
            let mut state = self.inner.state();
            if state.phase != LoadState::Unloaded {
                return None;
            }
            state.phase = LoadState::Loading;
        }
        tracing::debug!("Coordinator mounted, loading application");

        let inner = Arc::clone(&self.inner);
        Some(
            async move {
                let remote_debugger = inner.remote_debugger.load(Ordering::SeqCst);
                match load_app(&inner.options, &inner.bootstrapper, remote_debugger).await {
                    Ok(app) => inner.finish_load(app),
                    Err(e) => {
                        tracing::error!(error = %e, "Application failed to load");
                        inner.state().error = Some(e);
                    }
                }
            }
            .boxed(),
        )
    }

    pub fn state(&self) -> LoadState {
        self.inner.state().phase
    }

    /// Render the waiting view or the app's root element
    pub fn render(&self) -> Result<View, HostError> {
        let entry = self.inner.state().entry.clone();
        match entry {
            Some(entry) => entry().map(View::Element),
            None => Ok(View::Waiting(WAITING_MESSAGE)),
        }
    }

    /// Ask the view layer to render again
    pub fn refresh(&self) {
        self.inner.refresh();
    }

    /// Reload notifications handled so far
    pub fn reload_count(&self) -> u64 {
        self.inner.reloads.load(Ordering::SeqCst)
    }

    /// Receiver that changes whenever the view should be rendered again
    pub fn renders(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Fault that stopped the load, if any
    pub fn last_error(&self) -> Option<BridgeError> {
        self.inner.state().error.clone()
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }

    /// Bootstrap record of the loaded app
    pub fn app_config(&self) -> Option<BootstrapConfig> {
        self.inner.state().app.clone()
    }
}

impl std::fmt::Debug for ReloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadCoordinator")
            .field("state", &self.state())
            .field("reloads", &self.reload_count())
            .field("options", &self.inner.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::events::EventBus;
    use crate::testing::{app_fixture, MemoryFetcher, ScriptEvaluator};
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        fetcher: MemoryFetcher,
        evaluator: ScriptEvaluator,
        bus: EventBus,
        bootstrapper: Bootstrapper,
    }

    fn harness(fetcher: MemoryFetcher) -> Harness {
        let evaluator = ScriptEvaluator::new();
        let bootstrapper = Bootstrapper::new(
            Arc::new(fetcher.clone()),
            Arc::new(evaluator.clone()),
            Registry::new(),
        );
        Harness {
            fetcher,
            evaluator,
            bus: EventBus::new(),
            bootstrapper,
        }
    }

    impl Harness {
        fn coordinator(&self, options: JsonValue) -> Result<ReloadCoordinator> {
            ReloadCoordinator::new(options, self.bootstrapper.clone(), Arc::new(self.bus.clone()))
        }
    }

    fn local_options() -> JsonValue {
        json!({ "asset-path": "out", "main": "app.core", "autoRefresh": true })
    }

    #[tokio::test]
    async fn test_lifecycle_with_auto_refresh() {
        let h = harness(app_fixture("out").with_delay("out/goog/../app/core.js", Duration::from_millis(20)));
        let coordinator = h.coordinator(local_options()).unwrap();

        assert_eq!(coordinator.state(), LoadState::Unloaded);
        assert_eq!(coordinator.render().unwrap(), View::Waiting(WAITING_MESSAGE));

        let load = coordinator.mount().expect("first mount loads");
        assert!(coordinator.mount().is_none());
        assert_eq!(coordinator.state(), LoadState::Loading);
        assert_eq!(coordinator.render().unwrap(), View::Waiting(WAITING_MESSAGE));

        load.await;
        assert_eq!(coordinator.state(), LoadState::Loaded);
        assert_eq!(coordinator.render().unwrap(), View::Element(Value::from("<root/>")));
        assert_eq!(h.evaluator.render_calls(), 1);

        let renders = coordinator.renders();
        assert_eq!(h.bus.emit(AFTER_LOAD_EVENT), 1);
        assert_eq!(coordinator.reload_count(), 1);
        assert!(renders.has_changed().unwrap());

        assert_eq!(coordinator.render().unwrap(), View::Element(Value::from("<root/>")));
        assert_eq!(h.evaluator.render_calls(), 2);
        assert_eq!(h.fetcher.fetch_count("out/goog/base.js"), 1);
        assert!(coordinator.mount().is_none());
    }

    #[tokio::test]
    async fn test_render_picks_up_reloaded_function() {
        let h = harness(app_fixture("out"));
        let coordinator = h.coordinator(local_options()).unwrap();
        coordinator.mount().unwrap().await;

        h.bootstrapper
            .registry()
            .define(
                "app.core.figwheel_rn_root",
                NativeFn::new("figwheel_rn_root", |_| Ok(Value::from("<root v2/>"))),
            )
            .unwrap();
        h.bus.emit(AFTER_LOAD_EVENT);

        assert_eq!(coordinator.render().unwrap(), View::Element(Value::from("<root v2/>")));
    }

    #[tokio::test]
    async fn test_invalid_auto_refresh_rejected_before_fetch() {
        let h = harness(app_fixture("out"));
        let err = h
            .coordinator(json!({ "asset-path": "out", "main": "app.core", "autoRefresh": "true" }))
            .unwrap_err();

        assert!(err.is_validation());
        assert!(h.fetcher.fetched().is_empty());
    }

    #[tokio::test]
    async fn test_without_auto_refresh_no_listener() {
        let h = harness(app_fixture("out"));
        let coordinator = h
            .coordinator(json!({ "asset-path": "out", "main": "app.core", "autoRefresh": false }))
            .unwrap();
        coordinator.mount().unwrap().await;

        assert_eq!(coordinator.state(), LoadState::Loaded);
        assert_eq!(h.bus.listener_count(AFTER_LOAD_EVENT), 0);
        assert_eq!(h.bus.emit(AFTER_LOAD_EVENT), 0);
        assert_eq!(coordinator.reload_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_hook_in_registry() {
        let h = harness(app_fixture("out"));
        let coordinator = h.coordinator(local_options()).unwrap();
        coordinator.mount().unwrap().await;

        h.bootstrapper.registry().call(REFRESH_HOOK, &[]).unwrap();
        assert_eq!(coordinator.reload_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_waiting() {
        let h = harness(app_fixture("out").with_status("out/goog/base.js", 500));
        let coordinator = h.coordinator(local_options()).unwrap();
        coordinator.mount().unwrap().await;

        assert_eq!(coordinator.state(), LoadState::Loading);
        assert_eq!(coordinator.render().unwrap(), View::Waiting(WAITING_MESSAGE));
        assert!(matches!(coordinator.last_error(), Some(BridgeError::Load { .. })));
        assert!(coordinator.mount().is_none());
    }

    #[tokio::test]
    async fn test_missing_render_function() {
        let h = harness(app_fixture("out"));
        let coordinator = h
            .coordinator(json!({ "asset-path": "out", "main": "app.core", "renderFn": "app_root" }))
            .unwrap();
        coordinator.mount().unwrap().await;

        assert_eq!(
            coordinator.last_error(),
            Some(BridgeError::Resolution("Render function app_root not found.".to_string()))
        );
        assert_eq!(coordinator.render().unwrap(), View::Waiting(WAITING_MESSAGE));
    }

    #[tokio::test]
    async fn test_options_url_with_overrides() {
        let asset_path = "http://127.0.0.1:9500/cljs-out/dev";
        let fetcher = app_fixture(asset_path).with_file(
            "http://127.0.0.1:9500/cljs-out/dev/cljsc_opts.json",
            r#"{"main": "app.missing", "preloads": ["app.dev"]}"#,
        );
        let h = harness(fetcher);
        let coordinator = h
            .coordinator(json!({
                "optionsUrl": "http://192.168.0.7:9500/cljs-out/dev/cljsc_opts.json",
                "main": "app.core",
            }))
            .unwrap()
            .with_remote_debugger(true);

        coordinator.mount().unwrap().await;

        assert_eq!(coordinator.last_error(), None);
        assert_eq!(coordinator.state(), LoadState::Loaded);
        let config = coordinator.app_config().unwrap();
        assert_eq!(config.asset_path, asset_path);
        assert_eq!(config.main, "app.core");
        assert_eq!(config.preloads, vec!["app.dev"]);
        assert_eq!(h.fetcher.fetched()[0], "http://127.0.0.1:9500/cljs-out/dev/cljsc_opts.json");
    }

    #[tokio::test]
    async fn test_unreachable_options_url() {
        let h = harness(MemoryFetcher::new());
        let coordinator = h
            .coordinator(json!({ "optionsUrl": "http://localhost:9500/cljsc_opts.json" }))
            .unwrap();
        coordinator.mount().unwrap().await;

        assert!(matches!(coordinator.last_error(), Some(BridgeError::OptionsFetch { .. })));
        assert_eq!(coordinator.state(), LoadState::Loading);
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let h = harness(app_fixture("out"));
        let coordinator = h.coordinator(local_options()).unwrap();
        coordinator.mount().unwrap().await;
        assert_eq!(h.bus.listener_count(AFTER_LOAD_EVENT), 1);

        drop(coordinator);
        assert_eq!(h.bus.listener_count(AFTER_LOAD_EVENT), 0);
    }

    #[tokio::test]
    async fn test_reload_import_after_load() {
        let fetcher = app_fixture("out").with_file("out/app/changed.js", "log changed");
        let h = harness(fetcher);
        let coordinator = h.coordinator(local_options()).unwrap();
        coordinator.mount().unwrap().await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let callback = NativeFn::new("done", move |args| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(args[0].clone());
            }
            Ok(Value::Null)
        });
        h.bootstrapper
            .registry()
            .call(
                crate::runtime::bootstrap::RELOAD_IMPORT_HOOK,
                &[Value::from("out/app/changed.js"), Value::Function(callback)],
            )
            .unwrap();

        assert_eq!(rx.await.unwrap(), Value::Bool(true));
        assert_eq!(h.evaluator.log().last().map(String::as_str), Some("changed"));
        assert!(coordinator.app_config().is_some());
    }
}
