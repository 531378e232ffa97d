pub mod arima;
pub mod core;
pub mod diagnostics;
pub mod identification;
pub mod optimizer;
pub mod result;
pub mod state_space;
pub mod stationarity;

// Re-export key components
pub use arima::{ArimaFit, FitSettings, ModelOrder, ParameterEstimate, SeasonalOrder};
pub use core::{ForecastEngine, forecast};
pub use diagnostics::{LjungBox, ResidualDiagnostics, TestOutcome};
pub use identification::Correlogram;
pub use result::{
    CandidateOutcome, ForecastPoint, ForecastQuality, ForecastResult, QualityIssue, SelectedModel,
};
pub use stationarity::{AdfTest, DifferencingDecision, StationarityReport};
