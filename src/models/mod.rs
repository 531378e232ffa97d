// Reconciled data models: the vintage panel and its derived series
// These modules contain pure logic independent of acquisition/export

pub mod panel;
pub mod timeseries;

// Re-export key types for convenience
pub use panel::{ConflictWarning, ConsolidationWarning, IngestSummary, Panel, PanelBuilder, consolidate};
pub use timeseries::{Completeness, CurrentSeries, SeriesPoint};
