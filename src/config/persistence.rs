//! File persistence and serialization configuration

use crate::domain::VintageId;

pub struct CacheConfig {
    /// Directory path for storing raw vintage files
    pub directory: &'static str,
    /// Current version of the cache entry format
    /// Bump when `CacheEntry` changes shape
    pub version: f64,
}

pub struct ReportConfig {
    /// Long-form panel export (`;` separated)
    pub consolidated_filename: &'static str,
    /// Forecast + revision report
    pub report_filename: &'static str,
}

pub struct PersistenceConfig {
    pub cache: CacheConfig,
    pub reports: ReportConfig,
}

pub const PERSISTENCE: PersistenceConfig = PersistenceConfig {
    cache: CacheConfig {
        directory: "ONS_UK_Vacancies",
        version: 1.0,
    },
    reports: ReportConfig {
        consolidated_filename: "ONS_UK_Vacancies_Consolidated.csv",
        report_filename: "vacancy_forecast.json",
    },
};

/// Cache filename for one release
/// Example: "v117.bin"
pub fn vintage_cache_filename(id: VintageId) -> String {
    format!("{}.bin", id)
}
