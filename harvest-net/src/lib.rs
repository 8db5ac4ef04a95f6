//! Harvest Net - network I/O for the pipeline
//!
//! Everything that suspends lives here:
//! - HTTP client construction (optional upstream proxy, rotating user agent)
//! - Concurrent source fetching with retry and backoff
//! - Channel preview page parsing
//! - TCP connect-and-close liveness probing

pub mod client;
pub mod channel;
pub mod fetcher;
pub mod probe;

pub use client::*;
pub use fetcher::*;
pub use probe::*;
