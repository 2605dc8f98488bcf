//! HTTP fetcher for dev-server hosted output

use std::time::Duration;

use reload_bridge_sdk::host::BoxFuture;
use reload_bridge_sdk::{FetchResponse, Fetcher, HostError};

/// Fetches locators over HTTP
///
/// Non-2xx responses are reported as non-ok responses. No request timeout is
/// applied unless one is configured: a dev server that stops answering
/// leaves the load pending.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Fail requests that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, locator: &str) -> BoxFuture<'static, Result<FetchResponse, HostError>> {
        let mut request = self.client.get(locator);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let locator = locator.to_string();

        Box::pin(async move {
            let response = request
                .send()
                .await
                .map_err(|e| HostError::Http(format!("{}: {}", locator, e)))?;

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(%locator, status = status.as_u16(), "Fetch returned non-success status");
                return Ok(FetchResponse::failed(locator, status.as_u16()));
            }

            let body = response
                .text()
                .await
                .map_err(|e| HostError::Http(format!("{}: {}", locator, e)))?;
            Ok(FetchResponse::ok(locator, body))
        })
    }
}
