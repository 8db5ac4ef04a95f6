//! Harvest Agents
//!
//! Record-level stages of the pipeline:
//! - **GeoLookup**: offline IP to country attribution
//! - **Enricher**: decodes endpoints, scores and filters candidates
//! - **Validator**: keeps only candidates that answer a TCP connect in time

pub mod geo;
pub mod enricher;
pub mod validator;

pub use geo::*;
pub use enricher::*;
pub use validator::*;
