// Domain types and value objects
pub mod period;
pub mod vintage;

// Re-export commonly used types
pub use period::{Periodicity, ReferencePeriod};
pub use vintage::{IdentifierRange, Observation, Vintage, VintageId};
