//! Harvest Core - protocol model and text-level stages
//!
//! This crate provides the synchronous building blocks of the pipeline:
//! - The closed [`Protocol`] enumeration of supported URI dialects
//! - [`CandidateRecord`], the enriched unit passed between stages
//! - Candidate extraction from noisy text
//! - Best-effort payload decoding with explicit fallbacks
//! - Settings and progress reporting shared by all stages

pub mod protocol;
pub mod record;
pub mod extract;
pub mod decode;
pub mod settings;
pub mod progress;

pub use protocol::*;
pub use record::*;
pub use extract::*;
pub use decode::*;
pub use settings::*;
pub use progress::*;

/// Country code used when attribution is unavailable
pub const UNKNOWN_COUNTRY: &str = "NA";
