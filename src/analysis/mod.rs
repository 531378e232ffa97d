// Revision analysis over the consolidated panel
pub mod revisions;

// Re-export commonly used types
pub use revisions::{
    HorizonSummary, RevisionExtreme, RevisionPathPoint, RevisionRecord, RevisionSummary, Revisions,
    compare_vintages, compute_revisions, revision_path, summarise_by_horizon,
};
