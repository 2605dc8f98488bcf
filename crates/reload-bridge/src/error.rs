//! Error types for the loader runtime

use reload_bridge_sdk::HostError;
use thiserror::Error;

/// Faults raised by option validation, loading and entry resolution
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Malformed or missing option, raised before any load starts
    #[error("Invalid options: {0}")]
    Validation(String),

    /// A fetch or evaluation step failed
    #[error("Failed to load {locator}: {source}")]
    Load {
        locator: String,
        #[source]
        source: HostError,
    },

    /// The main namespace or its render function is missing after load
    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("Unable to fetch optionsUrl {url}: {reason}")]
    OptionsFetch { url: String, reason: String },

    /// The base runtime loaded but did not publish a module resolver
    #[error("Module system not available: {0} is not defined")]
    ModuleSystemMissing(String),

    #[error("Module system rejected require of {id}: {source}")]
    Require {
        id: String,
        #[source]
        source: HostError,
    },
}

impl BridgeError {
    pub fn load(locator: impl Into<String>, source: HostError) -> Self {
        BridgeError::Load {
            locator: locator.into(),
            source,
        }
    }

    /// Whether the fault was raised synchronously at construction
    pub fn is_validation(&self) -> bool {
        matches!(self, BridgeError::Validation(_))
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
