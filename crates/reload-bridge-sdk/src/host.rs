//! Host capabilities
//!
//! The loader never touches the network or a script engine directly. The
//! host hands it a [`Fetcher`] to retrieve source text and an [`Evaluator`]
//! to execute it against a [`Registry`]. A [`Loader`] combines the two into
//! a single "load this locator" step and can be replaced wholesale.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::HostError;
use crate::registry::Registry;

/// Type alias for boxed futures returned by host capabilities
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response to a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// Locator the response belongs to
    pub locator: String,
    pub ok: bool,
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    /// A successful response with the given body
    pub fn ok(locator: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            ok: true,
            status: 200,
            body: body.into(),
        }
    }

    /// A failed response with the given status
    pub fn failed(locator: impl Into<String>, status: u16) -> Self {
        Self {
            locator: locator.into(),
            ok: false,
            status,
            body: String::new(),
        }
    }

    /// Body text of an ok response; non-ok responses become a fetch error
    pub fn text(self) -> Result<String, HostError> {
        if self.ok {
            Ok(self.body)
        } else {
            Err(HostError::Fetch {
                locator: self.locator,
                status: self.status,
            })
        }
    }
}

/// Asynchronously retrieves raw text for a locator
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, locator: &str) -> BoxFuture<'static, Result<FetchResponse, HostError>>;
}

/// Executes source text to completion
///
/// Evaluation may define symbols in the registry and may call back into
/// functions already published there.
pub trait Evaluator: Send + Sync + 'static {
    fn evaluate(&self, source: &str, registry: &Registry) -> Result<(), HostError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str, &Registry) -> Result<(), HostError> + Send + Sync + 'static,
{
    fn evaluate(&self, source: &str, registry: &Registry) -> Result<(), HostError> {
        self(source, registry)
    }
}

/// Loads and applies a single resource
pub trait Loader: Send + Sync + 'static {
    fn load(&self, locator: &str) -> BoxFuture<'static, Result<(), HostError>>;
}

/// The default loader: fetch the text, then evaluate it
#[derive(Clone)]
pub struct FetchEvaluate {
    fetcher: Arc<dyn Fetcher>,
    evaluator: Arc<dyn Evaluator>,
    registry: Registry,
}

impl FetchEvaluate {
    pub fn new(fetcher: Arc<dyn Fetcher>, evaluator: Arc<dyn Evaluator>, registry: Registry) -> Self {
        Self {
            fetcher,
            evaluator,
            registry,
        }
    }
}

impl Loader for FetchEvaluate {
    fn load(&self, locator: &str) -> BoxFuture<'static, Result<(), HostError>> {
        let response = self.fetcher.fetch(locator);
        let evaluator = Arc::clone(&self.evaluator);
        let registry = self.registry.clone();
        Box::pin(async move {
            let text = response.await?.text()?;
            evaluator.evaluate(&text, &registry)
        })
    }
}

impl std::fmt::Debug for FetchEvaluate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchEvaluate")
            .field("registry", &self.registry)
            .finish()
    }
}
