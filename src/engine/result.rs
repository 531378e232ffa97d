use serde::{Deserialize, Serialize};

use crate::config::InformationCriterion;
use crate::domain::ReferencePeriod;
use crate::engine::arima::{ModelOrder, ParameterEstimate};
use crate::engine::diagnostics::ResidualDiagnostics;
use crate::engine::identification::Correlogram;
use crate::engine::stationarity::StationarityReport;
use crate::error::FitError;
use crate::models::Completeness;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub period: ReferencePeriod,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    /// Square root of the model's forecast-error variance
    pub std_error: f64,
}

impl ForecastPoint {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// What happened to one candidate order during selection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Fitted {
        order: ModelOrder,
        aic: f64,
        bic: f64,
        log_likelihood: f64,
    },
    Failed {
        order: ModelOrder,
        error: FitError,
    },
}

impl CandidateOutcome {
    pub fn order(&self) -> ModelOrder {
        match self {
            CandidateOutcome::Fitted { order, .. } | CandidateOutcome::Failed { order, .. } => *order,
        }
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self, CandidateOutcome::Fitted { .. })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum QualityIssue {
    /// Ljung-Box rejected "no residual autocorrelation"
    ResidualAutocorrelation { p_value: f64 },
    /// Jarque-Bera rejected normal residuals
    NonNormalResiduals { p_value: f64 },
    /// No differencing order up to the cap passed the unit-root test
    MaxDifferencing { d: usize },
    /// The unit-root test could not run; `d` is a guess
    InconclusiveStationarity { d: usize },
    /// Gaps in the series: only the trailing contiguous run was modelled
    TruncatedHistory { dropped_periods: usize },
    /// The selected model reproduces the history exactly; intervals collapse to the point
    ZeroVariance,
    /// The requested order could not be fitted; a simpler one was used
    OrderFallback { requested: ModelOrder, used: ModelOrder },
}

impl QualityIssue {
    /// Issues that make a forecast non-conforming (the rest are informational).
    pub fn is_diagnostic_failure(&self) -> bool {
        matches!(
            self,
            QualityIssue::ResidualAutocorrelation { .. }
                | QualityIssue::NonNormalResiduals { .. }
                | QualityIssue::ZeroVariance
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ForecastQuality {
    pub conforming: bool,
    pub issues: Vec<QualityIssue>,
}

impl ForecastQuality {
    pub fn from_issues(issues: Vec<QualityIssue>) -> Self {
        Self {
            conforming: !issues.iter().any(QualityIssue::is_diagnostic_failure),
            issues,
        }
    }
}

/// The model the forecast came from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SelectedModel {
    pub order: ModelOrder,
    pub criterion: InformationCriterion,
    pub criterion_value: f64,
    pub aic: f64,
    pub bic: f64,
    pub log_likelihood: f64,
    pub sigma2: f64,
    pub nobs: usize,
    pub parameters: Vec<ParameterEstimate>,
}

/// Output of one forecast run. Built once; holds no fit state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub points: Vec<ForecastPoint>,
    pub confidence_level: f64,
    pub model: SelectedModel,
    pub stationarity: StationarityReport,
    pub correlogram: Correlogram,
    pub candidates: Vec<CandidateOutcome>,
    pub diagnostics: ResidualDiagnostics,
    pub quality: ForecastQuality,
    pub completeness: Completeness,
}

impl ForecastResult {
    pub fn horizon(&self) -> usize {
        self.points.len()
    }

    pub fn failed_candidates(&self) -> usize {
        self.candidates.iter().filter(|c| !c.is_fitted()).count()
    }
}
