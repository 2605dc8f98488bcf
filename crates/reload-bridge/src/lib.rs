//! Reload Bridge - Load unoptimized compiled output into a script host
//!
//! The compiled output assumes each imported unit runs before the next
//! import statement proceeds. Hosts here can only fetch asynchronously, so
//! the bridge:
//! - Serializes every import behind one chain of async steps
//! - Bootstraps the app in fixed phases (base runtime, dependency graph,
//!   unit metadata, preloads and main)
//! - Wraps the app's root view in a coordinator that loads once and
//!   re-renders on reload notifications

pub mod config;
pub mod error;
pub mod fetch;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{BootstrapConfig, BridgeOptions};
pub use error::BridgeError;
pub use runtime::{Bootstrapper, EventBus, ReloadCoordinator, Sequencer, View};
pub use reload_bridge_sdk as sdk;
