//! Configuration module for the vintage pipeline.

pub mod forecast;
pub mod persistence;
pub mod source;

mod debug; // Private: use crate::config::DEBUG_FLAGS, not crate::config::debug::DEBUG_FLAGS
pub use debug::DEBUG_FLAGS;

// Re-export commonly used items
pub use forecast::{FORECAST, ForecastSettings, InformationCriterion, OrderSelection};
pub use persistence::{PERSISTENCE, vintage_cache_filename};
pub use source::{FetchSettings, SOURCE};
