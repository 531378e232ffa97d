// Data acquisition, caching, and parsing
pub mod cache_file;
pub mod parser;
pub mod source;

// Re-export commonly used types
pub use cache_file::{CacheEntry, CachedSource};
pub use parser::{FORMAT_ERAS, FormatEra, ParsedVintage, SkippedRow, VintageParser};
pub use source::{FetchFailure, FetchReport, HttpSource, MemorySource, Origin, RawVintage, VintageSource, fetch_range};
