//! Collects every street name of a city and every house number per street from two
//! autocomplete endpoints that cap their answers at a fixed number of suggestions.

pub mod config;
pub mod discover;
mod error;
pub mod expand;
pub mod macros;
pub mod parse;
pub mod process;
pub mod request;
pub mod store;

pub use error::{Error, Result};

/// Most suggestions the endpoints return for one query.
pub const SATURATION_THRESHOLD: usize = 12;
/// Streets processed between two checkpoints.
pub const CHECKPOINT_EVERY: usize = 50;
pub const STREET_URL: &str = "https://service.stuttgart.de/lhs-services/aws/strassennamen";
pub const NUMBER_URL: &str = "https://service.stuttgart.de/lhs-services/aws/hausnummern";
