//! Core library for the polite HTTP fetching toolkit.
//!
//! Provides adaptive per-host rate limiting, circuit breaking, retry
//! scheduling, URL canonicalization, pagination discovery, batch
//! orchestration, and structured job logging used by the CLI binary.
pub mod batch;
pub mod canonical;
pub mod circuit;
pub mod config;
pub mod error;
pub mod fetch;
pub mod host;
pub mod log;
pub mod metrics;
pub mod paginate;
pub mod ratelimit;
pub mod retry;
pub mod runtime;

pub use error::*;

/// Returns the version of the politefetch-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
