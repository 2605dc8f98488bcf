//! Runtime module - ordered async loading and reload coordination
//!
//! This module provides:
//! - The import chain that serializes asynchronous unit loads
//! - The four-phase bootstrap orchestrator
//! - In-process reload notifications
//! - The mount-once reload coordinator

pub mod sequencer;
pub mod bootstrap;
pub mod events;
pub mod coordinator;

pub use sequencer::{ImportRequest, Sequencer};
pub use bootstrap::Bootstrapper;
pub use events::{EventBus, AFTER_LOAD_EVENT};
pub use coordinator::{load_app, resolve_config, LoadState, LoadedApp, ReloadCoordinator, RenderEntry, View};
