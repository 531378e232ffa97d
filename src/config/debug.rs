//! Debugging feature flags.
//!
//! Toggle individual diagnostics here; keep them `false` by default so a normal
//! run only logs the stage summaries.

pub struct DebugFlags {
    /// Emit every skipped row with its reason while parsing a vintage.
    pub print_skipped_rows: bool,
    /// Emit cache hit/miss/write details.
    pub print_cache_events: bool,
    /// Emit one line per candidate order with its criterion value or failure.
    pub print_candidate_fits: bool,
    /// Emit the ACF/PACF values used for identification.
    pub print_correlogram: bool,
    /// Emit each revision record as it is computed.
    pub print_revisions: bool,
}

pub const DEBUG_FLAGS: DebugFlags = DebugFlags {
    print_skipped_rows: false,
    print_cache_events: false,
    print_candidate_fits: false,
    print_correlogram: false,
    print_revisions: false,
};
