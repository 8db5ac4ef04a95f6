//! Harvest Runtime
//!
//! Drives the pipeline end to end and writes its results.

pub mod pipeline;
pub mod sources;
pub mod export;

pub use pipeline::*;
pub use sources::*;
pub use export::*;
