//! Unit-root testing and the choice of the differencing order.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::utils::maths_utils::{difference, ols};

// MacKinnon (1994) approximate p-value surface, constant-only regression, one series
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

// MacKinnon (2010) finite-sample critical values: [τ∞, c1, c2, c3] in 1/T
const CRITICAL_1: [f64; 4] = [-3.43035, -6.5393, -16.786, -79.433];
const CRITICAL_5: [f64; 4] = [-2.86154, -2.8903, -4.234, -40.040];
const CRITICAL_10: [f64; 4] = [-2.56677, -1.5384, -2.809, 0.0];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    pub one_percent: f64,
    pub five_percent: f64,
    pub ten_percent: f64,
}

/// Augmented Dickey-Fuller regression with a constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdfTest {
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub nobs: usize,
    pub critical_values: CriticalValues,
}

/// Approximate p-value of an ADF statistic (constant, no trend).
pub fn mackinnon_p_value(tau: f64) -> f64 {
    if tau > TAU_MAX {
        return 1.0;
    }
    if tau < TAU_MIN {
        return 0.0;
    }
    let coefficients: &[f64] = if tau <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    let z = coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * tau + c);
    Normal::standard().cdf(z)
}

fn critical_values(nobs: usize) -> CriticalValues {
    let inv = 1.0 / nobs as f64;
    let eval = |c: &[f64; 4]| c[0] + c[1] * inv + c[2] * inv.powi(2) + c[3] * inv.powi(3);
    CriticalValues {
        one_percent: eval(&CRITICAL_1),
        five_percent: eval(&CRITICAL_5),
        ten_percent: eval(&CRITICAL_10),
    }
}

/// Rows of the ADF regression `Δx_t = α + γ x_{t-1} + Σ β_i Δx_{t-i}` for
/// `t` running over `dx[start..]`.
fn design(x: &[f64], dx: &[f64], lag: usize, start: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
    let y: Vec<f64> = dx[start..].to_vec();
    let rows = (start..dx.len())
        .map(|t| {
            let mut row = Vec::with_capacity(lag + 2);
            row.push(1.0);
            // dx[t] = x[t + 1] - x[t], so the lagged level is x[t]
            row.push(x[t]);
            row.extend((1..=lag).map(|i| dx[t - i]));
            row
        })
        .collect();
    (y, rows)
}

/// Run the ADF test with the lag picked by AIC on a common sample.
/// `None` when the series is too short or the regression is degenerate.
pub fn adf_test(x: &[f64]) -> Option<AdfTest> {
    let n = x.len();
    if n < 4 {
        return None;
    }
    let dx = difference(x, 1);
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
    let mut max_lag = schwert.min((n / 2).saturating_sub(2));
    // Keep at least one residual degree of freedom beyond the regressors
    while max_lag > 0 && dx.len() - max_lag < max_lag + 3 {
        max_lag -= 1;
    }
    if dx.len() < 3 {
        return None;
    }

    let best_lag = (0..=max_lag)
        .filter_map(|lag| {
            let (y, rows) = design(x, &dx, lag, max_lag);
            ols(&y, &rows).map(|fit| (lag, fit.aic()))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(lag, _)| lag)?;

    // Refit on the longest sample the chosen lag allows
    let (y, rows) = design(x, &dx, best_lag, best_lag);
    let fit = ols(&y, &rows)?;
    let statistic = fit.t_stat(1);
    if !statistic.is_finite() {
        return None;
    }

    Some(AdfTest {
        statistic,
        p_value: mackinnon_p_value(statistic),
        used_lag: best_lag,
        nobs: fit.nobs,
        critical_values: critical_values(fit.nobs),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifferencingDecision {
    /// Stationarity accepted at the chosen order
    Stationary,
    /// No order up to the cap was accepted; the cap was used
    MaxDifferencing,
    /// The test could not run at the chosen order
    Inconclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelTest {
    pub d: usize,
    pub test: Option<AdfTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityReport {
    pub levels: Vec<LevelTest>,
    pub d: usize,
    pub decision: DifferencingDecision,
}

/// Smallest `d <= max_d` whose differenced series rejects a unit root at `significance`.
pub fn choose_differencing(values: &[f64], significance: f64, max_d: usize) -> StationarityReport {
    let mut levels = Vec::new();
    let mut series = values.to_vec();

    for d in 0..=max_d {
        if d > 0 {
            series = difference(&series, 1);
        }
        let test = adf_test(&series);
        levels.push(LevelTest { d, test });

        match test {
            None => {
                log::warn!("⚠️  ADF test cannot run at d={} ({} points)", d, series.len());
                return StationarityReport {
                    levels,
                    d,
                    decision: DifferencingDecision::Inconclusive,
                };
            }
            Some(t) => {
                log::info!(
                    "ADF d={}: statistic {:.4}, p-value {:.4} (lag {}, {} obs)",
                    d,
                    t.statistic,
                    t.p_value,
                    t.used_lag,
                    t.nobs
                );
                if t.p_value < significance {
                    return StationarityReport {
                        levels,
                        d,
                        decision: DifferencingDecision::Stationary,
                    };
                }
            }
        }
    }

    log::warn!("⚠️  No differencing order up to {} passed the ADF test", max_d);
    StationarityReport {
        levels,
        d: max_d,
        decision: DifferencingDecision::MaxDifferencing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random shocks in [-0.5, 0.5)
    fn shocks(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5
            })
            .collect()
    }

    #[test]
    fn test_p_value_surface() {
        // Continuous at the switch point
        let below = mackinnon_p_value(TAU_STAR - 1e-9);
        let above = mackinnon_p_value(TAU_STAR + 1e-9);
        assert!((below - above).abs() < 1e-3);
        // 5% critical value maps to ~5%
        assert!((mackinnon_p_value(-2.8615) - 0.05).abs() < 0.005);
        assert_eq!(mackinnon_p_value(3.0), 1.0);
        assert_eq!(mackinnon_p_value(-20.0), 0.0);
    }

    #[test]
    fn test_white_noise_is_stationary() {
        let x = shocks(120, 7);
        let test = adf_test(&x).unwrap();
        assert!(test.p_value < 0.05);
        assert!(test.statistic < test.critical_values.five_percent);
    }

    #[test]
    fn test_drifting_walk_needs_one_difference() {
        let walk: Vec<f64> = shocks(150, 11)
            .iter()
            .scan(100.0, |level, e| {
                *level += 0.3 + e;
                Some(*level)
            })
            .collect();
        let report = choose_differencing(&walk, 0.05, 2);
        assert_eq!(report.d, 1);
        assert_eq!(report.decision, DifferencingDecision::Stationary);
        assert_eq!(report.levels.len(), 2);
    }

    #[test]
    fn test_constant_series_is_inconclusive() {
        let report = choose_differencing(&[5.0; 30], 0.05, 2);
        assert_eq!(report.d, 0);
        assert_eq!(report.decision, DifferencingDecision::Inconclusive);
    }

    #[test]
    fn test_too_short() {
        assert!(adf_test(&[1.0, 2.0, 3.0]).is_none());
    }
}
