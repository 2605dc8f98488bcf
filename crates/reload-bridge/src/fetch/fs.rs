//! Filesystem fetcher

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use reload_bridge_sdk::host::BoxFuture;
use reload_bridge_sdk::{FetchResponse, Fetcher, HostError};
use url::Url;

/// Reads locators from disk
///
/// Locators are plain paths (relative ones are joined onto the root) or
/// `file://` URLs. A missing file is a non-ok 404 response, not an error.
#[derive(Debug, Clone, Default)]
pub struct FsFetcher {
    root: Option<PathBuf>,
}

impl FsFetcher {
    /// Fetcher resolving relative locators against the working directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetcher resolving relative locators against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf, HostError> {
        if locator.starts_with("file://") {
            let url = Url::parse(locator)
                .map_err(|e| HostError::InvalidArgument(format!("{}: {}", locator, e)))?;
            return url
                .to_file_path()
                .map_err(|_| HostError::InvalidArgument(format!("not a file path: {}", locator)));
        }

        let path = Path::new(locator);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

impl Fetcher for FsFetcher {
    fn fetch(&self, locator: &str) -> BoxFuture<'static, Result<FetchResponse, HostError>> {
        let locator = locator.to_string();
        let path = self.resolve(&locator);
        Box::pin(async move {
            let path = path?;
            match tokio::fs::read_to_string(&path).await {
                Ok(body) => Ok(FetchResponse::ok(locator, body)),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "File not found");
                    Ok(FetchResponse::failed(locator, 404))
                }
                Err(e) => Err(HostError::Io(format!("{}: {}", path.display(), e))),
            }
        })
    }
}
