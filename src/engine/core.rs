use std::collections::BTreeSet;

use statrs::distribution::{ContinuousCDF, Normal};

use crate::config::{DEBUG_FLAGS, ForecastSettings, InformationCriterion, OrderSelection};
use crate::engine::arima::{ArimaFit, FitSettings, ModelOrder, fit};
use crate::engine::diagnostics::diagnose;
use crate::engine::identification::{Correlogram, candidate_orders, fallback_chain, seasonal_period_to_search};
use crate::engine::result::{
    CandidateOutcome, ForecastPoint, ForecastQuality, ForecastResult, QualityIssue, SelectedModel,
};
use crate::engine::stationarity::{DifferencingDecision, choose_differencing};
use crate::error::FatalConfigError;
use crate::models::{Completeness, CurrentSeries};

// Relative gap under which two criterion values count as a tie
const CRITERION_TIE: f64 = 1e-9;

/// Identifies, fits, checks and runs a univariate model over a current series.
///
/// Stateless apart from its settings: every call works on its own snapshot and
/// returns a fresh `ForecastResult`.
pub struct ForecastEngine {
    settings: ForecastSettings,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new(ForecastSettings::default())
    }
}

impl ForecastEngine {
    pub fn new(settings: ForecastSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    fn fit_settings(&self) -> FitSettings {
        FitSettings {
            max_iterations_per_parameter: self.settings.max_iterations_per_parameter,
            max_fit_time: self.settings.max_fit_time,
            tolerance: self.settings.tolerance,
        }
    }

    fn criterion_of(&self, fit: &ArimaFit) -> f64 {
        match self.settings.criterion {
            InformationCriterion::Aic => fit.aic(),
            InformationCriterion::Bic => fit.bic(),
        }
    }

    pub fn forecast(
        &self,
        series: &CurrentSeries,
        horizon: usize,
    ) -> Result<ForecastResult, FatalConfigError> {
        // 0. Validate the request
        if horizon == 0 {
            return Err(FatalConfigError::InvalidHorizon(horizon));
        }
        let confidence = self.settings.confidence_level;
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(FatalConfigError::InvalidConfidenceLevel(confidence));
        }
        if series.is_empty() {
            return Err(FatalConfigError::EmptySeries);
        }

        let mut issues = Vec::new();

        // 1. Only an unbroken history can be modelled
        let history = series.contiguous_tail();
        if history.len() < series.len() {
            let dropped = series.len() - history.len();
            log::warn!(
                "⚠️  Series has {} missing periods; modelling the last {} contiguous points ({} dropped)",
                series.gap_count(),
                history.len(),
                dropped
            );
            issues.push(QualityIssue::TruncatedHistory {
                dropped_periods: dropped,
            });
        }
        let values = history.values();
        let n = values.len();

        // 2. Stationarity: pick d
        let stationarity = choose_differencing(&values, self.settings.significance, self.settings.max_d);
        let mut d = stationarity.d.min(n.saturating_sub(1));
        match stationarity.decision {
            DifferencingDecision::Stationary => {}
            DifferencingDecision::MaxDifferencing => {
                issues.push(QualityIssue::MaxDifferencing { d: stationarity.d })
            }
            DifferencingDecision::Inconclusive => {
                issues.push(QualityIssue::InconclusiveStationarity { d: stationarity.d })
            }
        }
        if let OrderSelection::Fixed(order) = self.settings.selection {
            d = order.d.min(n.saturating_sub(1));
        }

        // 3. Identification
        let w = ModelOrder::baseline(d).difference(&values);
        let correlogram = Correlogram::compute(&w, self.settings.correlogram_lags);
        if DEBUG_FLAGS.print_correlogram {
            log::info!("ACF:  {:?}", correlogram.acf);
            log::info!("PACF: {:?}", correlogram.pacf);
        }
        let period = series.periodicity.seasonal_period();
        let seasonal = seasonal_period_to_search(&correlogram, w.len(), period);
        if seasonal.is_some() {
            log::info!("Seasonal correlation at lag {}: adding seasonal candidates", period);
        }

        let (orders, stop_at_first) = match self.settings.selection {
            OrderSelection::Auto => (candidate_orders(d, seasonal, n, &self.settings), false),
            OrderSelection::Fixed(order) => (fallback_chain(ModelOrder { d, ..order }), true),
        };

        // 4. Fit the candidates
        let fit_settings = self.fit_settings();
        let mut candidates = Vec::with_capacity(orders.len());
        let mut fits: Vec<ArimaFit> = Vec::new();
        for order in &orders {
            match fit(&values, order, &fit_settings) {
                Ok(model) => {
                    if DEBUG_FLAGS.print_candidate_fits {
                        log::info!("{}: AIC {:.3}, BIC {:.3}", order, model.aic(), model.bic());
                    }
                    candidates.push(CandidateOutcome::Fitted {
                        order: *order,
                        aic: model.aic(),
                        bic: model.bic(),
                        log_likelihood: model.log_likelihood,
                    });
                    fits.push(model);
                    if stop_at_first {
                        break;
                    }
                }
                Err(error) => {
                    if DEBUG_FLAGS.print_candidate_fits {
                        log::info!("{}: {}", order, error);
                    }
                    candidates.push(CandidateOutcome::Failed {
                        order: *order,
                        error,
                    });
                }
            }
        }
        let failed = candidates.len() - fits.len();
        if failed > 0 {
            log::warn!("⚠️  {} of {} candidate orders could not be fitted", failed, candidates.len());
        }

        let chosen = self
            .select(&fits)
            .ok_or(FatalConfigError::NoFittableModel {
                attempted: candidates.len(),
            })?;
        let criterion_value = self.criterion_of(chosen);
        log::info!(
            "Selected {} ({} = {:.3}, {} candidates)",
            chosen.order,
            self.settings.criterion,
            criterion_value,
            candidates.len()
        );
        if let OrderSelection::Fixed(requested) = self.settings.selection {
            let requested = ModelOrder { d, ..requested };
            if chosen.order != requested {
                issues.push(QualityIssue::OrderFallback {
                    requested,
                    used: chosen.order,
                });
            }
        }

        // 5. Diagnose residuals
        let diagnostics = diagnose(
            &chosen.residuals,
            self.settings.ljung_box_lags,
            chosen.order.arma_params(),
            self.settings.diagnostic_significance,
        );
        if chosen.has_zero_variance() {
            issues.push(QualityIssue::ZeroVariance);
        } else {
            if let Some(lb) = diagnostics.ljung_box.filter(|lb| lb.outcome.rejected) {
                issues.push(QualityIssue::ResidualAutocorrelation {
                    p_value: lb.outcome.p_value,
                });
            }
            if let Some(jb) = diagnostics.jarque_bera.filter(|jb| jb.rejected) {
                issues.push(QualityIssue::NonNormalResiduals {
                    p_value: jb.p_value,
                });
            }
        }
        let quality = ForecastQuality::from_issues(issues);
        if !quality.conforming {
            log::warn!("⚠️  Forecast is non-conforming: {:?}", quality.issues);
        }

        // 6. Forecast with intervals from the model's error variance
        let z = Normal::standard().inverse_cdf(1.0 - (1.0 - confidence) / 2.0);
        let last = history
            .last_period()
            .ok_or(FatalConfigError::EmptySeries)?;
        let points: Vec<ForecastPoint> = chosen
            .forecast(&values, horizon)
            .into_iter()
            .enumerate()
            .map(|(h, step)| {
                let std_error = step.variance.max(0.0).sqrt();
                ForecastPoint {
                    period: last.offset(h as i64 + 1),
                    point: step.point,
                    lower: step.point - z * std_error,
                    upper: step.point + z * std_error,
                    std_error,
                }
            })
            .collect();

        let vintages_used = series
            .points()
            .iter()
            .filter_map(|p| p.vintage)
            .collect::<BTreeSet<_>>()
            .len();
        let completeness = Completeness {
            vintages_requested: vintages_used,
            vintages_used,
            periods_available: series.len(),
            periods_used: n,
        };

        Ok(ForecastResult {
            points,
            confidence_level: confidence,
            model: SelectedModel {
                order: chosen.order,
                criterion: self.settings.criterion,
                criterion_value,
                aic: chosen.aic(),
                bic: chosen.bic(),
                log_likelihood: chosen.log_likelihood,
                sigma2: chosen.sigma2,
                nobs: chosen.nobs,
                parameters: chosen.parameters.clone(),
            },
            stationarity,
            correlogram,
            candidates,
            diagnostics,
            quality,
            completeness,
        })
    }

    /// Lowest criterion wins; near-ties go to the model with fewer parameters.
    fn select<'a>(&self, fits: &'a [ArimaFit]) -> Option<&'a ArimaFit> {
        let best = fits
            .iter()
            .map(|f| self.criterion_of(f))
            .filter(|v| v.is_finite())
            .min_by(f64::total_cmp);

        let Some(best) = best else {
            // Only degenerate fits (e.g. a flat series): take the simplest
            return fits.iter().min_by_key(|f| f.order.n_params());
        };
        let tolerance = CRITERION_TIE * (1.0 + best.abs());
        fits.iter()
            .filter(|f| (self.criterion_of(f) - best).abs() <= tolerance)
            .min_by_key(|f| f.order.n_params())
    }
}

/// Forecast with the given settings (convenience over `ForecastEngine`).
pub fn forecast(
    series: &CurrentSeries,
    horizon: usize,
    settings: &ForecastSettings,
) -> Result<ForecastResult, FatalConfigError> {
    ForecastEngine::new(settings.clone()).forecast(series, horizon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReferencePeriod;

    fn jan_2024() -> ReferencePeriod {
        ReferencePeriod::monthly(2024, 1).unwrap()
    }

    fn walk(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut level = 800.0;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                level += ((state >> 33) as f64 / (1u64 << 31) as f64 - 0.5) * 20.0;
                level
            })
            .collect()
    }

    #[test]
    fn test_six_point_scenario() {
        let series = CurrentSeries::from_values(jan_2024(), &[100.0, 102.0, 101.0, 105.0, 108.0, 107.0]);
        let result = ForecastEngine::default().forecast(&series, 3).unwrap();

        assert_eq!(result.horizon(), 3);
        let mut expected = series.last_period().unwrap();
        for point in &result.points {
            assert!(point.lower < point.point, "{:?}", point);
            assert!(point.point < point.upper, "{:?}", point);
            assert!(expected.is_followed_by(&point.period));
            expected = point.period;
        }
        assert_eq!(result.points[0].period, ReferencePeriod::monthly(2024, 7).unwrap());
        assert_eq!(result.completeness.periods_used, 6);
    }

    #[test]
    fn test_width_never_shrinks_with_horizon() {
        let series = CurrentSeries::from_values(jan_2024(), &walk(80, 3));
        let result = ForecastEngine::default().forecast(&series, 12).unwrap();

        for pair in result.points.windows(2) {
            assert!(pair[1].width() >= pair[0].width() - 1e-9);
        }
    }

    #[test]
    fn test_quarterly_periods_continue_quarterly() {
        let start = ReferencePeriod::quarterly(2022, 3).unwrap();
        let series = CurrentSeries::from_values(start, &walk(12, 5));
        let result = ForecastEngine::default().forecast(&series, 2).unwrap();
        assert_eq!(result.points[0].period, ReferencePeriod::quarterly(2025, 3).unwrap());
        assert_eq!(result.points[1].period, ReferencePeriod::quarterly(2025, 4).unwrap());
    }

    #[test]
    fn test_fixed_order_is_used_or_simplified() {
        let settings = ForecastSettings {
            selection: OrderSelection::Fixed(ModelOrder::new(1, 1, 1)),
            ..Default::default()
        };
        let series = CurrentSeries::from_values(jan_2024(), &walk(60, 9));
        let result = forecast(&series, 4, &settings).unwrap();

        assert_eq!(result.model.order.d, 1);
        assert!(result.model.order.p <= 1 && result.model.order.q <= 1);
        assert_eq!(result.candidates.iter().filter(|c| c.is_fitted()).count(), 1);
        if result.model.order != ModelOrder::new(1, 1, 1) {
            assert!(result.quality.issues.iter().any(|i| matches!(i, QualityIssue::OrderFallback { .. })));
        }
    }

    #[test]
    fn test_gaps_truncate_history() {
        let full = CurrentSeries::from_values(jan_2024(), &walk(30, 1));
        let mut points = full.points().to_vec();
        points.remove(5);
        let gappy = CurrentSeries::new(full.periodicity, points);

        let result = ForecastEngine::default().forecast(&gappy, 2).unwrap();
        assert_eq!(result.completeness.periods_available, 29);
        assert_eq!(result.completeness.periods_used, 24);
        assert!(result.quality.issues.contains(&QualityIssue::TruncatedHistory { dropped_periods: 5 }));
    }

    #[test]
    fn test_flat_series_forecasts_flat_and_flags_it() {
        let series = CurrentSeries::from_values(jan_2024(), &[950.0; 12]);
        let result = ForecastEngine::default().forecast(&series, 3).unwrap();
        assert!(result.points.iter().all(|p| p.point == 950.0 && p.width() == 0.0));
        assert!(!result.quality.conforming);
        assert!(result.quality.issues.contains(&QualityIssue::ZeroVariance));
    }

    #[test]
    fn test_invalid_requests() {
        let series = CurrentSeries::from_values(jan_2024(), &[1.0, 2.0, 3.0]);
        let engine = ForecastEngine::default();
        assert_eq!(engine.forecast(&series, 0).unwrap_err(), FatalConfigError::InvalidHorizon(0));

        let empty = CurrentSeries::new(crate::domain::Periodicity::Monthly, Vec::new());
        assert_eq!(engine.forecast(&empty, 3).unwrap_err(), FatalConfigError::EmptySeries);

        let bad = ForecastSettings {
            confidence_level: 1.0,
            ..Default::default()
        };
        assert_eq!(
            forecast(&series, 3, &bad).unwrap_err(),
            FatalConfigError::InvalidConfidenceLevel(1.0)
        );
    }
}
