//! Test doubles for host capabilities
//!
//! `MemoryFetcher` serves canned text with optional latency. `ScriptEvaluator`
//! runs a tiny line language, one statement per line:
//!
//! - `log <text>`: record `<text>` in the evaluation log
//! - `define <name> <text>`: define a string symbol
//! - `render <ns> <fn> <text>`: define a render function returning `<text>`
//! - `fail <text>`: evaluation error
//! - `import <locator>`: call the import hook for `<locator>`
//! - `inline <statement>`: call the import hook with inline source
//! - `module-system`: publish a `goog.require` backed by `dep` lines
//! - `dep <id> <path> [requires,...]`: declare a unit for `goog.require`

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reload_bridge_sdk::host::BoxFuture;
use reload_bridge_sdk::{Evaluator, FetchResponse, Fetcher, HostError, NativeFn, Registry, Value};

use crate::runtime::bootstrap::IMPORT_SCRIPT_HOOK;

#[derive(Default)]
struct FetchTable {
    files: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    delays: HashMap<String, Duration>,
    errors: HashSet<String>,
}

/// In-memory fetcher with per-locator latency and a fetch log
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    table: Arc<Mutex<FetchTable>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, locator: &str, body: &str) -> Self {
        self.table.lock().unwrap().files.insert(locator.to_string(), body.to_string());
        self
    }

    pub fn with_delay(self, locator: &str, delay: Duration) -> Self {
        self.table.lock().unwrap().delays.insert(locator.to_string(), delay);
        self
    }

    /// Answer `locator` with a non-ok status
    pub fn with_status(self, locator: &str, status: u16) -> Self {
        self.table.lock().unwrap().statuses.insert(locator.to_string(), status);
        self
    }

    /// Make fetching `locator` fail outright
    pub fn with_error(self, locator: &str) -> Self {
        self.table.lock().unwrap().errors.insert(locator.to_string());
        self
    }

    /// Locators in the order their fetches started
    pub fn fetched(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, locator: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|l| *l == locator).count()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, locator: &str) -> BoxFuture<'static, Result<FetchResponse, HostError>> {
        self.log.lock().unwrap().push(locator.to_string());
        let locator = locator.to_string();
        let (delay, result) = {
            let table = self.table.lock().unwrap();
            let delay = table.delays.get(&locator).copied();
            let result = if table.errors.contains(&locator) {
                Err(HostError::Http(format!("connection reset: {}", locator)))
            } else if let Some(status) = table.statuses.get(&locator) {
                Ok(FetchResponse::failed(locator.clone(), *status))
            } else if let Some(body) = table.files.get(&locator) {
                Ok(FetchResponse::ok(locator.clone(), body.clone()))
            } else {
                Ok(FetchResponse::failed(locator.clone(), 404))
            };
            (delay, result)
        };
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

#[derive(Default)]
struct ScriptState {
    log: Vec<String>,
    deps: HashMap<String, (String, Vec<String>)>,
    requested: HashSet<String>,
}

/// Evaluator for the test line language
#[derive(Clone, Default)]
pub struct ScriptEvaluator {
    state: Arc<Mutex<ScriptState>>,
    render_calls: Arc<AtomicUsize>,
    evaluations: Arc<AtomicUsize>,
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texts recorded by `log` statements, in evaluation order
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Number of times any render function was called
    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    /// Number of sources evaluated
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    fn statement(&self, line: &str, registry: &Registry) -> Result<(), HostError> {
        let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
        match op {
            "log" => {
                self.state.lock().unwrap().log.push(rest.to_string());
                Ok(())
            }
            "define" => {
                let (name, text) = rest.split_once(' ').unwrap_or((rest, ""));
                registry.define(name, text)
            }
            "render" => {
                let mut parts = rest.splitn(3, ' ');
                let ns = parts.next().unwrap_or_default();
                let func = parts.next().unwrap_or_default();
                let text = parts.next().unwrap_or_default().to_string();
                let calls = Arc::clone(&self.render_calls);
                registry.define(
                    &format!("{}.{}", ns, func),
                    NativeFn::new(func, move |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(Value::from(text.clone()))
                    }),
                )
            }
            "fail" => Err(HostError::Eval(rest.to_string())),
            "import" => registry.call(IMPORT_SCRIPT_HOOK, &[Value::from(rest)]).map(|_| ()),
            "inline" => registry
                .call(IMPORT_SCRIPT_HOOK, &[Value::Null, Value::from(rest)])
                .map(|_| ()),
            "dep" => {
                let mut parts = rest.split_whitespace();
                let id = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();
                let requires = parts
                    .next()
                    .map(|r| r.split(',').map(str::to_string).collect())
                    .unwrap_or_default();
                self.state.lock().unwrap().deps.insert(id, (path, requires));
                Ok(())
            }
            "module-system" => {
                let evaluator = self.clone();
                let scope = registry.clone();
                registry.define(
                    "goog.require",
                    NativeFn::new("require", move |args| {
                        let id = args
                            .first()
                            .and_then(Value::as_str)
                            .ok_or_else(|| HostError::InvalidArgument("require needs an id".to_string()))?;
                        evaluator.require(id, &scope)?;
                        Ok(Value::Null)
                    }),
                )
            }
            "" => Ok(()),
            other => Err(HostError::Eval(format!("unknown statement: {}", other))),
        }
    }

    /// Request `id` and its dependencies, dependencies first
    fn require(&self, id: &str, registry: &Registry) -> Result<(), HostError> {
        let base_path = registry
            .resolve("goog.basePath")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let mut order = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let mut visiting = HashSet::new();
            collect(&mut state, id, &mut visiting, &mut order)?;
        }

        // Hook calls may evaluate inline source, so the state lock is released
        for path in order {
            registry.call(IMPORT_SCRIPT_HOOK, &[Value::from(format!("{}{}", base_path, path))])?;
        }
        Ok(())
    }
}

fn collect(
    state: &mut ScriptState,
    id: &str,
    visiting: &mut HashSet<String>,
    order: &mut Vec<String>,
) -> Result<(), HostError> {
    if state.requested.contains(id) || !visiting.insert(id.to_string()) {
        return Ok(());
    }
    let (path, requires) = state
        .deps
        .get(id)
        .cloned()
        .ok_or_else(|| HostError::Eval(format!("undeclared namespace: {}", id)))?;
    for dep in &requires {
        collect(state, dep, visiting, order)?;
    }
    state.requested.insert(id.to_string());
    order.push(path);
    Ok(())
}

impl Evaluator for ScriptEvaluator {
    fn evaluate(&self, source: &str, registry: &Registry) -> Result<(), HostError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        for line in source.lines() {
            self.statement(line.trim(), registry)?;
        }
        Ok(())
    }
}

/// Fetcher serving a small compiled app under `asset_path`
///
/// `app.core` requires `app.util`; `app.dev` is a standalone preload. The main
/// namespace publishes `figwheel_rn_root`, which renders `<root/>`.
pub fn app_fixture(asset_path: &str) -> MemoryFetcher {
    let unit = |path: &str| format!("{}/goog/../app/{}", asset_path, path);
    MemoryFetcher::new()
        .with_file(&format!("{}/goog/base.js", asset_path), "log base\nmodule-system")
        .with_file(&format!("{}/goog/deps.js", asset_path), "log deps")
        .with_file(
            &format!("{}/cljs_deps.js", asset_path),
            "log cljs-deps\n\
             dep app.util ../app/util.js\n\
             dep app.core ../app/core.js app.util\n\
             dep app.dev ../app/dev.js",
        )
        .with_file(&unit("util.js"), "log app.util")
        .with_file(&unit("dev.js"), "log app.dev")
        .with_file(
            &unit("core.js"),
            "log app.core\nrender app.core figwheel_rn_root <root/>",
        )
}
