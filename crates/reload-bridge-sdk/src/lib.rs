//! Reload Bridge SDK - Host capabilities for the reload bridge loader
//!
//! This crate provides the types and traits a host implements to let the
//! loader fetch and evaluate compiled units, and the registry those units
//! publish their symbols into.

pub mod error;
pub mod value;
pub mod registry;
pub mod host;
pub mod events;

pub mod prelude {
    //! Common imports for hosts embedding the reload bridge
    pub use crate::error::HostError;
    pub use crate::value::{NativeFn, Value};
    pub use crate::registry::{munge, Registry};
    pub use crate::host::{BoxFuture, Evaluator, FetchEvaluate, FetchResponse, Fetcher, Loader};
    pub use crate::events::{ReloadHandler, ReloadNotifier, Subscription};
    pub use serde_json::{json, Value as JsonValue};
}

// Re-export key types at crate root
pub use error::HostError;
pub use value::{NativeFn, Value};
pub use registry::Registry;
pub use host::{Evaluator, FetchResponse, Fetcher, Loader};
pub use events::{ReloadNotifier, Subscription};
