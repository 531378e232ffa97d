//! Order identification: correlogram of the differenced series and the
//! candidate orders worth fitting.

use serde::{Deserialize, Serialize};

use crate::config::ForecastSettings;
use crate::engine::arima::{ModelOrder, SeasonalOrder};
use crate::utils::maths_utils::{acf, pacf};

// Seasonal terms need this many full seasons of differenced data
const MIN_SEASONS_FOR_SEASONAL_TERMS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlogram {
    pub lags: usize,
    /// Index 0 is lag 0
    pub acf: Vec<f64>,
    pub pacf: Vec<f64>,
    /// Approximate 95% band, `1.96 / sqrt(n)`
    pub band: f64,
}

impl Correlogram {
    pub fn compute(w: &[f64], max_lags: usize) -> Self {
        let lags = max_lags.min(w.len().saturating_sub(1));
        let band = if w.is_empty() {
            f64::INFINITY
        } else {
            1.96 / (w.len() as f64).sqrt()
        };
        Self {
            lags,
            acf: acf(w, lags),
            pacf: pacf(w, lags),
            band,
        }
    }

    pub fn significant_acf_lags(&self) -> Vec<usize> {
        significant(&self.acf, self.band)
    }

    pub fn significant_pacf_lags(&self) -> Vec<usize> {
        significant(&self.pacf, self.band)
    }

    /// `|ACF(s)|` outside the band.
    pub fn has_seasonal_signal(&self, period: usize) -> bool {
        period > 1 && self.acf.get(period).is_some_and(|r| r.abs() > self.band)
    }
}

fn significant(values: &[f64], band: f64) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, r)| r.abs() > band)
        .map(|(lag, _)| lag)
        .collect()
}

/// Seasonal candidates are only worth fitting when the correlogram shows a
/// seasonal spike and there are enough seasons to estimate it.
pub fn seasonal_period_to_search(correlogram: &Correlogram, n_w: usize, period: usize) -> Option<usize> {
    (correlogram.has_seasonal_signal(period) && n_w >= MIN_SEASONS_FOR_SEASONAL_TERMS * period)
        .then_some(period)
}

/// Differenced length of `n` observations under `order`.
fn differenced_len(n: usize, order: &ModelOrder) -> usize {
    n.saturating_sub(order.differencing_span())
}

/// Enough observations for every parameter plus the residual margin.
/// The baseline is always admissible as long as something is left after differencing.
pub fn admissible(order: &ModelOrder, n: usize, min_residual_dof: usize) -> bool {
    let n_w = differenced_len(n, order);
    if order.is_baseline() {
        return n_w >= 1;
    }
    n_w >= order.n_params() + min_residual_dof
}

/// Grid of admissible orders for automatic selection, simplest first.
/// The `(0, d, 0)` baseline is always included.
pub fn candidate_orders(
    d: usize,
    seasonal_period: Option<usize>,
    n: usize,
    settings: &ForecastSettings,
) -> Vec<ModelOrder> {
    let (max_sp, max_sq) = match seasonal_period {
        Some(_) => (settings.max_seasonal_p, settings.max_seasonal_q),
        None => (0, 0),
    };

    let mut orders = Vec::new();
    for p in 0..=settings.max_p {
        for q in 0..=settings.max_q {
            for sp in 0..=max_sp {
                for sq in 0..=max_sq {
                    let mut order = ModelOrder::new(p, d, q);
                    if let Some(s) = seasonal_period {
                        order = order.with_seasonal(SeasonalOrder {
                            p: sp,
                            d: settings.seasonal_d,
                            q: sq,
                            s,
                        });
                    }
                    if admissible(&order, n, settings.min_residual_dof) {
                        orders.push(order);
                    }
                }
            }
        }
    }
    orders.sort_by_key(|o| (o.n_params(), o.p + o.seasonal_ar(), o.q + o.seasonal_ma()));
    if !orders.iter().any(ModelOrder::is_baseline) {
        orders.insert(0, ModelOrder::baseline(d));
    }
    orders
}

/// A fixed order followed by progressively simpler ones, ending with the baseline.
pub fn fallback_chain(order: ModelOrder) -> Vec<ModelOrder> {
    let (sp, sq) = (order.seasonal_ar(), order.seasonal_ma());
    let mut chain = Vec::new();
    for p in (0..=order.p).rev() {
        for q in (0..=order.q).rev() {
            for a in (0..=sp).rev() {
                for b in (0..=sq).rev() {
                    let mut candidate = ModelOrder::new(p, order.d, q);
                    if let Some(seasonal) = order.seasonal {
                        candidate = candidate.with_seasonal(SeasonalOrder {
                            p: a,
                            q: b,
                            ..seasonal
                        });
                    }
                    chain.push(candidate);
                }
            }
        }
    }
    // Most complex first; ties keep the AR-heavy order first
    chain.sort_by_key(|o| std::cmp::Reverse(o.arma_params()));
    chain.dedup();
    let baseline = ModelOrder {
        seasonal: order.seasonal.filter(|s| s.d > 0).map(|s| SeasonalOrder { p: 0, q: 0, ..s }),
        ..ModelOrder::baseline(order.d)
    };
    chain.retain(|o| !o.is_baseline());
    chain.push(baseline);
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlogram_band_and_lags() {
        let w: Vec<f64> = (0..100).map(|i| if i % 12 < 6 { 1.0 } else { -1.0 }).collect();
        let c = Correlogram::compute(&w, 20);
        assert_eq!(c.lags, 20);
        assert!((c.band - 0.196).abs() < 1e-12);
        assert!(c.has_seasonal_signal(12));
        assert!(c.significant_acf_lags().contains(&12));
        assert_eq!(seasonal_period_to_search(&c, 100, 12), Some(12));
        assert_eq!(seasonal_period_to_search(&c, 30, 12), None);
    }

    #[test]
    fn test_grid_respects_sample_size() {
        let settings = ForecastSettings::default();
        // 10 points, d = 1: 9 differenced, at most 6 parameters
        let orders = candidate_orders(1, None, 10, &settings);
        assert!(orders.iter().all(|o| o.is_baseline() || 9 >= o.n_params() + 3));
        assert!(orders.contains(&ModelOrder::new(3, 1, 2)));
        assert!(!orders.contains(&ModelOrder::new(3, 1, 3)));
        assert_eq!(orders[0], ModelOrder::baseline(1));

        let full = candidate_orders(0, None, 500, &settings);
        assert_eq!(full.len(), 16);
        let seasonal = candidate_orders(0, Some(12), 500, &settings);
        assert_eq!(seasonal.len(), 64);
    }

    #[test]
    fn test_tiny_sample_keeps_baseline_only() {
        let orders = candidate_orders(2, None, 6, &ForecastSettings::default());
        assert_eq!(orders, vec![ModelOrder::baseline(2)]);
    }

    #[test]
    fn test_fallback_chain_ends_with_baseline() {
        let chain = fallback_chain(ModelOrder::new(1, 1, 1));
        assert_eq!(
            chain,
            vec![
                ModelOrder::new(1, 1, 1),
                ModelOrder::new(1, 1, 0),
                ModelOrder::new(0, 1, 1),
                ModelOrder::baseline(1),
            ]
        );
    }
}
