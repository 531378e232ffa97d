//! Residual checks run on the selected model.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::utils::maths_utils::{acf, mean};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
    pub degrees_of_freedom: f64,
    /// Null hypothesis rejected at the configured significance
    pub rejected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LjungBox {
    pub lags: usize,
    pub outcome: TestOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ResidualDiagnostics {
    /// No residual autocorrelation (None when too few residuals)
    pub ljung_box: Option<LjungBox>,
    /// Residuals normally distributed (None when the residuals have no spread)
    pub jarque_bera: Option<TestOutcome>,
}

impl ResidualDiagnostics {
    pub fn autocorrelated(&self) -> bool {
        self.ljung_box.is_some_and(|lb| lb.outcome.rejected)
    }

    pub fn non_normal(&self) -> bool {
        self.jarque_bera.is_some_and(|jb| jb.rejected)
    }
}

fn chi_square_survival(statistic: f64, df: f64) -> Option<f64> {
    if !statistic.is_finite() {
        return None;
    }
    let distribution = ChiSquared::new(df).ok()?;
    Some((1.0 - distribution.cdf(statistic)).clamp(0.0, 1.0))
}

/// Ljung-Box portmanteau test over `min(max_lags, n - 1)` lags, with the
/// degrees of freedom reduced by the number of ARMA parameters (at least 1 left).
pub fn ljung_box(residuals: &[f64], max_lags: usize, model_df: usize, significance: f64) -> Option<LjungBox> {
    let n = residuals.len();
    if n < 3 {
        return None;
    }
    let lags = max_lags.min(n - 1);
    if lags == 0 {
        return None;
    }
    let r = acf(residuals, lags);
    let nf = n as f64;
    let statistic = nf
        * (nf + 2.0)
        * (1..=lags)
            .map(|k| r[k] * r[k] / (nf - k as f64))
            .sum::<f64>();
    let df = lags.saturating_sub(model_df).max(1) as f64;
    let p_value = chi_square_survival(statistic, df)?;

    Some(LjungBox {
        lags,
        outcome: TestOutcome {
            statistic,
            p_value,
            degrees_of_freedom: df,
            rejected: p_value < significance,
        },
    })
}

/// Jarque-Bera normality test from sample skewness and kurtosis.
pub fn jarque_bera(residuals: &[f64], significance: f64) -> Option<TestOutcome> {
    let n = residuals.len();
    if n < 3 {
        return None;
    }
    let m = mean(residuals);
    let moment = |k: i32| residuals.iter().map(|x| (x - m).powi(k)).sum::<f64>() / n as f64;
    let m2 = moment(2);
    if m2 <= f64::EPSILON {
        return None;
    }
    let skewness = moment(3) / m2.powf(1.5);
    let kurtosis = moment(4) / (m2 * m2);
    let statistic = n as f64 / 6.0 * (skewness.powi(2) + (kurtosis - 3.0).powi(2) / 4.0);
    let p_value = chi_square_survival(statistic, 2.0)?;

    Some(TestOutcome {
        statistic,
        p_value,
        degrees_of_freedom: 2.0,
        rejected: p_value < significance,
    })
}

/// Run both checks.
pub fn diagnose(residuals: &[f64], max_lags: usize, model_df: usize, significance: f64) -> ResidualDiagnostics {
    let diagnostics = ResidualDiagnostics {
        ljung_box: ljung_box(residuals, max_lags, model_df, significance),
        jarque_bera: jarque_bera(residuals, significance),
    };
    match diagnostics.ljung_box {
        Some(lb) => log::info!(
            "Ljung-Box({}): Q = {:.3}, p = {:.4}",
            lb.lags,
            lb.outcome.statistic,
            lb.outcome.p_value
        ),
        None => log::info!("Ljung-Box skipped: {} residuals", residuals.len()),
    }
    if let Some(jb) = diagnostics.jarque_bera {
        log::info!("Jarque-Bera: JB = {:.3}, p = {:.4}", jb.statistic, jb.p_value);
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ljung_box_flags_autocorrelation() {
        // Strongly alternating residuals
        let residuals: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let lb = ljung_box(&residuals, 10, 0, 0.05).unwrap();
        assert_eq!(lb.lags, 10);
        assert!(lb.outcome.rejected);
        assert!(lb.outcome.p_value < 1e-6);
    }

    #[test]
    fn test_ljung_box_lags_and_df() {
        let residuals = [0.3, -0.2, 0.5, -0.4, 0.1];
        let lb = ljung_box(&residuals, 10, 2, 0.05).unwrap();
        assert_eq!(lb.lags, 4);
        assert_eq!(lb.outcome.degrees_of_freedom, 2.0);

        let lb = ljung_box(&residuals, 10, 9, 0.05).unwrap();
        assert_eq!(lb.outcome.degrees_of_freedom, 1.0);
    }

    #[test]
    fn test_jarque_bera() {
        // Symmetric, light tails: small statistic
        let flat: Vec<f64> = (0..50).map(|i| (i as f64 * 0.7).sin()).collect();
        let jb = jarque_bera(&flat, 0.05).unwrap();
        assert!(jb.statistic >= 0.0);

        // One enormous outlier
        let mut spiky = vec![0.0; 49];
        spiky.iter_mut().enumerate().for_each(|(i, x)| *x = if i % 2 == 0 { 0.1 } else { -0.1 });
        spiky.push(25.0);
        let jb = jarque_bera(&spiky, 0.05).unwrap();
        assert!(jb.rejected);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(ljung_box(&[1.0, 2.0], 10, 0, 0.05).is_none());
        assert!(jarque_bera(&[2.0; 10], 0.05).is_none());
    }
}
