//! Remote options document
//!
//! The compiler writes its options as JSON beside its output. Fetching that
//! document gives the bridge `main`, `preloads` and `closure-defines`; the
//! asset path is taken from the document's own directory.

use serde_json::{Map, Value as JsonValue};
use url::Url;

use reload_bridge_sdk::Fetcher;

use crate::error::{BridgeError, Result};

/// Host a remote debugger reaches the dev server through
pub const DEBUGGER_HOST: &str = "127.0.0.1";

/// Fetch and parse the options document at `url`
///
/// `asset-path` is always set to the directory containing the document.
pub async fn fetch_options(fetcher: &dyn Fetcher, url: &str) -> Result<Map<String, JsonValue>> {
    let fetch_error = |reason: String| BridgeError::OptionsFetch {
        url: url.to_string(),
        reason,
    };

    let text = fetcher
        .fetch(url)
        .await
        .and_then(|response| response.text())
        .map_err(|e| fetch_error(e.to_string()))?;

    let mut document = match serde_json::from_str::<JsonValue>(&text) {
        Ok(JsonValue::Object(document)) => document,
        Ok(_) => return Err(fetch_error("options document is not an object".to_string())),
        Err(e) => return Err(fetch_error(e.to_string())),
    };

    document.insert("asset-path".to_string(), JsonValue::from(parent_of(url)));
    tracing::debug!(%url, keys = document.len(), "Fetched options document");
    Ok(document)
}

fn parent_of(locator: &str) -> String {
    match locator.rfind('/') {
        Some(index) => locator[..index].to_string(),
        None => String::new(),
    }
}

/// Replace the host of `url`, keeping scheme, port and path
///
/// Returns `None` for URLs without a host or that cannot be parsed.
pub fn edit_hostname(url: &str, hostname: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.host_str()?;
    parsed.set_host(Some(hostname)).ok()?;
    Some(parsed.to_string())
}

/// Point `url` at the local machine when running under a remote debugger
///
/// The debugger runs on the developer's machine, next to the dev server,
/// whatever address the device itself was given.
pub fn correct_url(url: &str, remote_debugger: bool) -> String {
    if !remote_debugger {
        return url.to_string();
    }
    edit_hostname(url, DEBUGGER_HOST).unwrap_or_else(|| url.to_string())
}
