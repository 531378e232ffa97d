//! Model identification and forecasting configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::domain::Periodicity;
use crate::engine::arima::ModelOrder;

/// Settings for the unit-root test that picks the differencing order
pub struct StationaritySettings {
    // Reject the unit root when the ADF p-value is below this
    pub significance: f64,
    // Never difference more than this (over-differencing guard)
    pub max_d: usize,
}

/// Bounds of the candidate grid
pub struct GridSettings {
    pub max_p: usize,
    pub max_q: usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_q: usize,
    // Seasonal differencing is not searched; this is used as-is
    pub seasonal_d: usize,
    // Observations left over after estimating all parameters
    pub min_residual_dof: usize,
}

/// Per-fit caps so a pathological series cannot stall the run.
/// The iteration cap is the bound that decides a fit's outcome; the wall-clock
/// cap only catches a runaway fit and sits far above any normal fit time.
pub struct OptimiserSettings {
    pub max_iterations_per_parameter: usize,
    // Backstop only, since hitting it makes outcomes machine dependent
    pub max_fit_millis: u64,
    pub tolerance: f64,
}

/// Settings for residual checks
pub struct DiagnosticSettings {
    pub ljung_box_lags: usize,
    pub significance: f64,
    // Lags reported for ACF/PACF identification plots
    pub correlogram_lags: usize,
}

/// The Master Forecast Configuration
pub struct ForecastConfig {
    pub periodicity: Periodicity,
    pub default_horizon: usize,
    pub confidence_level: f64,
    pub stationarity: StationaritySettings,
    pub grid: GridSettings,
    pub optimiser: OptimiserSettings,
    pub diagnostics: DiagnosticSettings,
}

pub const FORECAST: ForecastConfig = ForecastConfig {
    periodicity: Periodicity::Monthly,
    default_horizon: 6,
    confidence_level: 0.95,

    stationarity: StationaritySettings {
        significance: 0.05,
        max_d: 2,
    },

    grid: GridSettings {
        max_p: 3,
        max_q: 3,
        max_seasonal_p: 1,
        max_seasonal_q: 1,
        seasonal_d: 0,
        min_residual_dof: 3,
    },

    optimiser: OptimiserSettings {
        max_iterations_per_parameter: 400,
        max_fit_millis: 120_000,
        tolerance: 1e-8,
    },

    diagnostics: DiagnosticSettings {
        ljung_box_lags: 10,
        significance: 0.05,
        correlogram_lags: 20,
    },
};

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, EnumIter, EnumString, Display,
)]
#[strum(ascii_case_insensitive)]
pub enum InformationCriterion {
    #[strum(serialize = "aic")]
    Aic,
    #[strum(serialize = "bic")]
    Bic,
}

/// How the (p, d, q) order is chosen.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OrderSelection {
    /// Grid search over small orders, best information criterion wins
    Auto,
    /// Try this order first and fall back to simpler ones if it cannot be fitted
    Fixed(ModelOrder),
}

/// Runtime forecast settings. `Default` reads `FORECAST`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSettings {
    pub periodicity: Periodicity,
    pub confidence_level: f64,
    pub selection: OrderSelection,
    pub criterion: InformationCriterion,
    pub significance: f64,
    pub max_d: usize,
    pub max_p: usize,
    pub max_q: usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_q: usize,
    pub seasonal_d: usize,
    pub min_residual_dof: usize,
    pub max_iterations_per_parameter: usize,
    pub max_fit_time: Duration,
    pub tolerance: f64,
    pub ljung_box_lags: usize,
    pub diagnostic_significance: f64,
    pub correlogram_lags: usize,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            periodicity: FORECAST.periodicity,
            confidence_level: FORECAST.confidence_level,
            selection: OrderSelection::Auto,
            criterion: InformationCriterion::Aic,
            significance: FORECAST.stationarity.significance,
            max_d: FORECAST.stationarity.max_d,
            max_p: FORECAST.grid.max_p,
            max_q: FORECAST.grid.max_q,
            max_seasonal_p: FORECAST.grid.max_seasonal_p,
            max_seasonal_q: FORECAST.grid.max_seasonal_q,
            seasonal_d: FORECAST.grid.seasonal_d,
            min_residual_dof: FORECAST.grid.min_residual_dof,
            max_iterations_per_parameter: FORECAST.optimiser.max_iterations_per_parameter,
            max_fit_time: Duration::from_millis(FORECAST.optimiser.max_fit_millis),
            tolerance: FORECAST.optimiser.tolerance,
            ljung_box_lags: FORECAST.diagnostics.ljung_box_lags,
            diagnostic_significance: FORECAST.diagnostics.significance,
            correlogram_lags: FORECAST.diagnostics.correlogram_lags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_criterion_from_cli_text() {
        assert_eq!(InformationCriterion::from_str("aic").unwrap(), InformationCriterion::Aic);
        assert_eq!(InformationCriterion::from_str("BIC").unwrap(), InformationCriterion::Bic);
        assert!(InformationCriterion::from_str("hqic").is_err());
    }

    #[test]
    fn test_time_cap_is_only_a_backstop() {
        // The largest grid order gets its full iteration budget even at 10 ms per iteration
        let settings = ForecastSettings::default();
        let params = settings.max_p + settings.max_q + settings.max_seasonal_p + settings.max_seasonal_q + 2;
        let budget = (settings.max_iterations_per_parameter * params) as u128;
        assert!(settings.max_fit_time.as_millis() >= 10 * budget);
    }
}
