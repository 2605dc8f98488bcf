//! Bridge configuration
//!
//! Options arrive as a loosely typed record (from the embedding host or the
//! environment), are merged with defaults and validated once, and are later
//! resolved into an immutable [`BootstrapConfig`] for a single load attempt.

use std::env;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use reload_bridge_sdk::{Evaluator, Loader};

use crate::error::{BridgeError, Result};
use crate::runtime::sequencer::Sequencer;

/// Name of the render function looked up on the main namespace by default
pub const DEFAULT_RENDER_FN: &str = "figwheel_rn_root";

/// Validated bridge options
///
/// Deserializing goes through [`BridgeOptions::from_value`], so defaults
/// and validation apply either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonValue")]
pub struct BridgeOptions {
    /// Re-render on external reload notifications
    #[serde(rename = "autoRefresh")]
    pub auto_refresh: bool,

    /// Function on the main namespace that produces the root element
    #[serde(rename = "renderFn")]
    pub render_fn: String,

    /// Remote options document supplying the fields below
    #[serde(rename = "optionsUrl", default, skip_serializing_if = "Option::is_none")]
    pub options_url: Option<String>,

    #[serde(rename = "asset-path", default, skip_serializing_if = "Option::is_none")]
    pub asset_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preloads: Vec<String>,

    #[serde(rename = "closure-defines", default, skip_serializing_if = "Option::is_none")]
    pub closure_defines: Option<Map<String, JsonValue>>,
}

impl TryFrom<JsonValue> for BridgeOptions {
    type Error = BridgeError;

    fn try_from(options: JsonValue) -> Result<Self> {
        Self::from_value(options)
    }
}

impl BridgeOptions {
    /// Merge defaults under `options` and validate the result
    pub fn from_value(options: JsonValue) -> Result<Self> {
        let JsonValue::Object(options) = options else {
            return Err(BridgeError::Validation("options must be an object".to_string()));
        };

        let mut merged = Map::new();
        merged.insert("renderFn".to_string(), JsonValue::from(DEFAULT_RENDER_FN));
        merged.insert("autoRefresh".to_string(), JsonValue::Bool(true));
        merged.extend(options);

        validate(&merged)?;

        let options_url = optional_string(&merged, "optionsUrl").filter(|s| !s.is_empty());
        Ok(Self {
            auto_refresh: merged["autoRefresh"].as_bool().unwrap_or(true),
            render_fn: optional_string(&merged, "renderFn").unwrap_or_else(|| DEFAULT_RENDER_FN.to_string()),
            options_url,
            asset_path: optional_string(&merged, "asset-path"),
            main: optional_string(&merged, "main"),
            preloads: preload_list(merged.get("preloads")),
            closure_defines: merged
                .get("closure-defines")
                .and_then(JsonValue::as_object)
                .cloned(),
        })
    }

    /// Load options from `RELOAD_BRIDGE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Map::new();

        if let Some(url) = lookup("RELOAD_BRIDGE_OPTIONS_URL") {
            options.insert("optionsUrl".to_string(), JsonValue::from(url));
        }
        if let Some(path) = lookup("RELOAD_BRIDGE_ASSET_PATH") {
            options.insert("asset-path".to_string(), JsonValue::from(path));
        }
        if let Some(main) = lookup("RELOAD_BRIDGE_MAIN") {
            options.insert("main".to_string(), JsonValue::from(main));
        }
        if let Some(render_fn) = lookup("RELOAD_BRIDGE_RENDER_FN") {
            options.insert("renderFn".to_string(), JsonValue::from(render_fn));
        }
        if let Some(preloads) = lookup("RELOAD_BRIDGE_PRELOADS") {
            let list: Vec<JsonValue> = preloads
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(JsonValue::from)
                .collect();
            options.insert("preloads".to_string(), JsonValue::Array(list));
        }
        if let Some(flag) = lookup("RELOAD_BRIDGE_AUTO_REFRESH") {
            // Unparseable flags stay strings so validation reports them
            let value = match flag.as_str() {
                "true" | "1" => JsonValue::Bool(true),
                "false" | "0" => JsonValue::Bool(false),
                _ => JsonValue::from(flag),
            };
            options.insert("autoRefresh".to_string(), value);
        }

        Self::from_value(JsonValue::Object(options))
    }

    /// Fields the caller set explicitly, in options-document form
    ///
    /// These override fields fetched from `optionsUrl`.
    pub fn overrides(&self) -> Map<String, JsonValue> {
        let mut fields = Map::new();
        if let Some(path) = &self.asset_path {
            fields.insert("asset-path".to_string(), JsonValue::from(path.clone()));
        }
        if let Some(main) = &self.main {
            fields.insert("main".to_string(), JsonValue::from(main.clone()));
        }
        if !self.preloads.is_empty() {
            fields.insert("preloads".to_string(), JsonValue::from(self.preloads.clone()));
        }
        if let Some(defines) = &self.closure_defines {
            fields.insert("closure-defines".to_string(), JsonValue::Object(defines.clone()));
        }
        fields
    }

    /// Build the bootstrap record from local options only
    pub fn to_bootstrap_config(&self) -> Result<BootstrapConfig> {
        BootstrapConfig::from_document(self.overrides())
    }
}

fn validate(options: &Map<String, JsonValue>) -> Result<()> {
    assert_kind(options, "autoRefresh", JsonValue::is_boolean, "boolean")?;
    assert_kind(options, "renderFn", JsonValue::is_string, "string")?;

    if is_present(options, "optionsUrl") {
        assert_kind(options, "optionsUrl", JsonValue::is_string, "string")?;
        // Remote document fills these in; only check what was given
        for key in ["asset-path", "main"] {
            if is_present(options, key) {
                assert_kind(options, key, JsonValue::is_string, "string")?;
            }
        }
    } else {
        for key in ["asset-path", "main"] {
            if !is_present(options, key) {
                return Err(BridgeError::Validation(format!(
                    "must provide a {} option when no optionsUrl is provided",
                    key
                )));
            }
            assert_kind(options, key, JsonValue::is_string, "string")?;
        }
    }

    if is_present(options, "preloads") {
        let valid = match &options["preloads"] {
            JsonValue::String(_) => true,
            JsonValue::Array(items) => items.iter().all(JsonValue::is_string),
            _ => false,
        };
        if !valid {
            return Err(BridgeError::Validation(
                "preloads must be a string or an array of strings".to_string(),
            ));
        }
    }

    if is_present(options, "closure-defines") {
        assert_kind(options, "closure-defines", JsonValue::is_object, "map")?;
    }

    Ok(())
}

/// Present and not a falsy placeholder
fn is_present(options: &Map<String, JsonValue>, key: &str) -> bool {
    match options.get(key) {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn assert_kind(
    options: &Map<String, JsonValue>,
    key: &str,
    check: fn(&JsonValue) -> bool,
    kind: &str,
) -> Result<()> {
    match options.get(key) {
        Some(value) if check(value) => Ok(()),
        _ => Err(BridgeError::Validation(format!("{} must be a {}", key, kind))),
    }
}

fn optional_string(options: &Map<String, JsonValue>, key: &str) -> Option<String> {
    options.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

fn preload_list(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(JsonValue::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Immutable record driving one bootstrap attempt
#[derive(Clone, Serialize)]
pub struct BootstrapConfig {
    /// Base for every derived locator
    #[serde(rename = "asset-path")]
    pub asset_path: String,

    /// Dotted identifier of the main unit
    pub main: String,

    /// Units required before the main unit, in order
    pub preloads: Vec<String>,

    #[serde(rename = "closure-defines", skip_serializing_if = "Option::is_none")]
    pub closure_defines: Option<Map<String, JsonValue>>,

    /// Replaces the host evaluator
    #[serde(skip)]
    pub evaluator: Option<Arc<dyn Evaluator>>,

    /// Replaces fetch-then-evaluate for single resources
    #[serde(skip)]
    pub loader: Option<Arc<dyn Loader>>,

    /// Import chain of the bootstrap that produced this record
    ///
    /// Keeps the reload import hook alive after bootstrap returns.
    #[serde(skip)]
    pub sequencer: Option<Sequencer>,
}

impl BootstrapConfig {
    pub fn new(asset_path: impl Into<String>, main: impl Into<String>) -> Self {
        Self {
            asset_path: asset_path.into(),
            main: main.into(),
            preloads: Vec::new(),
            closure_defines: None,
            evaluator: None,
            loader: None,
            sequencer: None,
        }
    }

    /// Build from an options document (`asset-path`, `main`, `preloads`,
    /// `closure-defines`)
    pub fn from_document(document: Map<String, JsonValue>) -> Result<Self> {
        let required = |key: &str| {
            document
                .get(key)
                .and_then(JsonValue::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| BridgeError::Validation(format!("{} must be a non-empty string", key)))
        };

        let asset_path = required("asset-path")?;
        let main = required("main")?;

        let closure_defines = match document.get("closure-defines") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Object(defines)) => Some(defines.clone()),
            Some(_) => {
                return Err(BridgeError::Validation("closure-defines must be a map".to_string()))
            }
        };

        Ok(Self {
            asset_path: asset_path.trim_end_matches('/').to_string(),
            main,
            preloads: preload_list(document.get("preloads")),
            closure_defines,
            evaluator: None,
            loader: None,
            sequencer: None,
        })
    }

    pub fn with_preloads<I, S>(mut self, preloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preloads = preloads.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_closure_defines(mut self, defines: Map<String, JsonValue>) -> Self {
        self.closure_defines = Some(defines);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Locator of the base runtime
    pub fn base_locator(&self) -> String {
        format!("{}/goog/base.js", self.asset_path)
    }

    /// Locator of the dependency graph
    pub fn deps_locator(&self) -> String {
        format!("{}/goog/deps.js", self.asset_path)
    }

    /// Locator of the compiled-unit metadata
    pub fn cljs_deps_locator(&self) -> String {
        format!("{}/cljs_deps.js", self.asset_path)
    }

    /// Directory the module system resolves relative imports against
    pub fn base_path(&self) -> String {
        format!("{}/goog/", self.asset_path)
    }
}

impl std::fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("asset_path", &self.asset_path)
            .field("main", &self.main)
            .field("preloads", &self.preloads)
            .field("closure_defines", &self.closure_defines)
            .field("custom_evaluator", &self.evaluator.is_some())
            .field("custom_loader", &self.loader.is_some())
            .field("sequencer", &self.sequencer)
            .finish()
    }
}
