//! Fetchers and remote options
//!
//! Two [`Fetcher`](reload_bridge_sdk::Fetcher) implementations cover the
//! usual places compiled output lives: a local build directory and a dev
//! server. The options helpers resolve the `optionsUrl` document the compiler
//! writes next to its output.

pub mod fs;
pub mod http;
pub mod options;

pub use fs::FsFetcher;
pub use http::HttpFetcher;
pub use options::{correct_url, edit_hostname, fetch_options, DEBUGGER_HOST};
