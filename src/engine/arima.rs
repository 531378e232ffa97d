//! Seasonal ARIMA: orders, parameter constraints, maximum-likelihood fit and
//! forecasts.
//!
//! The model is fitted on the differenced series `w = Δ^d Δ_s^D y` after
//! rescaling it to unit spread, so the optimiser sees a well-conditioned
//! surface whatever the level of the data. A mean is estimated only when the
//! series is not differenced at all.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::optimizer::{
    Minimum, NelderMeadSettings, StopReason, nelder_mead, numerical_hessian, numerical_jacobian,
};
use crate::engine::state_space::{
    ArmaStateSpace, FilterOutput, covariance_from_hessian, sandwich,
};
use crate::error::FitError;
use crate::utils::maths_utils::{difference, mean, pacf, poly_mul};

// ============================================================================
// Orders
// ============================================================================

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonalOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub s: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal: Option<SeasonalOrder>,
}

impl ModelOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self {
            p,
            d,
            q,
            seasonal: None,
        }
    }

    pub fn with_seasonal(mut self, seasonal: SeasonalOrder) -> Self {
        self.seasonal = Some(seasonal).filter(|s| s.s > 1 && (s.p + s.d + s.q) > 0);
        self
    }

    /// `(0, d, 0)`: random walk when differenced, mean model otherwise.
    pub fn baseline(d: usize) -> Self {
        Self::new(0, d, 0)
    }

    pub fn is_baseline(&self) -> bool {
        self.p == 0 && self.q == 0 && self.seasonal_ar() == 0 && self.seasonal_ma() == 0
    }

    pub fn seasonal_ar(&self) -> usize {
        self.seasonal.map_or(0, |s| s.p)
    }

    pub fn seasonal_ma(&self) -> usize {
        self.seasonal.map_or(0, |s| s.q)
    }

    pub fn seasonal_d(&self) -> usize {
        self.seasonal.map_or(0, |s| s.d)
    }

    pub fn period(&self) -> usize {
        self.seasonal.map_or(0, |s| s.s)
    }

    pub fn estimates_mean(&self) -> bool {
        self.d + self.seasonal_d() == 0
    }

    /// AR and MA coefficients (seasonal included).
    pub fn arma_params(&self) -> usize {
        self.p + self.q + self.seasonal_ar() + self.seasonal_ma()
    }

    /// Everything estimated: ARMA coefficients, the mean if any, and the innovation variance.
    pub fn n_params(&self) -> usize {
        self.arma_params() + usize::from(self.estimates_mean()) + 1
    }

    /// Observations lost to differencing.
    pub fn differencing_span(&self) -> usize {
        self.d + self.seasonal_d() * self.period()
    }

    /// `Δ(B) = (1 - B)^d (1 - B^s)^D` as coefficients, constant term first.
    pub fn differencing_polynomial(&self) -> Vec<f64> {
        let mut poly = vec![1.0];
        for _ in 0..self.d {
            poly = poly_mul(&poly, &[1.0, -1.0]);
        }
        if let Some(seasonal) = self.seasonal {
            let mut lag_s = vec![0.0; seasonal.s + 1];
            lag_s[0] = 1.0;
            lag_s[seasonal.s] = -1.0;
            for _ in 0..seasonal.d {
                poly = poly_mul(&poly, &lag_s);
            }
        }
        poly
    }

    /// Apply the differencing of this order to `values`.
    pub fn difference(&self, values: &[f64]) -> Vec<f64> {
        let mut w = values.to_vec();
        for _ in 0..self.d {
            w = difference(&w, 1);
        }
        if let Some(seasonal) = self.seasonal {
            for _ in 0..seasonal.d {
                w = difference(&w, seasonal.s);
            }
        }
        w
    }
}

impl fmt::Display for ModelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)?;
        if let Some(s) = self.seasonal {
            write!(f, "({},{},{})[{}]", s.p, s.d, s.q, s.s)?;
        }
        Ok(())
    }
}

// ============================================================================
// Parameter constraints
// ============================================================================

/// Map unconstrained reals to the coefficients of a stationary AR polynomial
/// (`1 - Σ φ_i B^i`): each value becomes a partial autocorrelation in (-1, 1)
/// and the Durbin-Levinson recursion turns those into coefficients.
pub fn constrain_stationary(unconstrained: &[f64]) -> Vec<f64> {
    let partials: Vec<f64> = unconstrained
        .iter()
        .map(|x| x / (1.0 + x * x).sqrt())
        .collect();
    let mut phi: Vec<f64> = Vec::with_capacity(partials.len());
    for (k, r) in partials.iter().enumerate() {
        let previous = phi.clone();
        for j in 0..k {
            phi[j] = previous[j] - r * previous[k - 1 - j];
        }
        phi.push(*r);
    }
    phi
}

/// Inverse of `constrain_stationary` (for starting values).
pub fn unconstrain_stationary(phi: &[f64]) -> Vec<f64> {
    let mut current = phi.to_vec();
    let mut partials = vec![0.0; phi.len()];
    for k in (0..phi.len()).rev() {
        let r = current[k].clamp(-0.99, 0.99);
        partials[k] = r;
        let denominator = 1.0 - r * r;
        let previous: Vec<f64> = (0..k)
            .map(|j| (current[j] + r * current[k - 1 - j]) / denominator)
            .collect();
        current = previous;
    }
    partials.iter().map(|r| r / (1.0 - r * r).sqrt()).collect()
}

/// Coefficients of an invertible MA polynomial (`1 + Σ θ_j B^j`).
pub fn constrain_invertible(unconstrained: &[f64]) -> Vec<f64> {
    constrain_stationary(unconstrained)
        .iter()
        .map(|c| -c)
        .collect()
}

/// Constrained parameters of one fit, in model units (mean in data units).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmaCoefficients {
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub seasonal_ar: Vec<f64>,
    pub seasonal_ma: Vec<f64>,
}

impl ArmaCoefficients {
    fn from_unconstrained(order: &ModelOrder, x: &[f64]) -> Self {
        let (p, q, sp, sq) = (order.p, order.q, order.seasonal_ar(), order.seasonal_ma());
        Self {
            ar: constrain_stationary(&x[..p]),
            ma: constrain_invertible(&x[p..p + q]),
            seasonal_ar: constrain_stationary(&x[p + q..p + q + sp]),
            seasonal_ma: constrain_invertible(&x[p + q + sp..p + q + sp + sq]),
        }
    }

    /// Expanded AR coefficients of `φ(B) Φ(B^s)` (sign convention `1 - Σ`).
    pub fn expanded_ar(&self, period: usize) -> Vec<f64> {
        let regular = lag_polynomial(&self.ar, 1, -1.0);
        let seasonal = lag_polynomial(&self.seasonal_ar, period, -1.0);
        poly_mul(&regular, &seasonal)
            .iter()
            .skip(1)
            .map(|c| -c)
            .collect()
    }

    /// Expanded MA coefficients of `θ(B) Θ(B^s)` (sign convention `1 + Σ`).
    pub fn expanded_ma(&self, period: usize) -> Vec<f64> {
        let regular = lag_polynomial(&self.ma, 1, 1.0);
        let seasonal = lag_polynomial(&self.seasonal_ma, period, 1.0);
        poly_mul(&regular, &seasonal).into_iter().skip(1).collect()
    }
}

/// `1 + sign·Σ c_i B^(i·step)` as coefficients.
fn lag_polynomial(coefficients: &[f64], step: usize, sign: f64) -> Vec<f64> {
    let mut poly = vec![0.0; coefficients.len() * step.max(1) + 1];
    poly[0] = 1.0;
    for (i, c) in coefficients.iter().enumerate() {
        poly[(i + 1) * step.max(1)] = sign * c;
    }
    poly
}

// ============================================================================
// Fit
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct FitSettings {
    pub max_iterations_per_parameter: usize,
    pub max_fit_time: Duration,
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEstimate {
    pub name: String,
    pub value: f64,
    pub std_error: Option<f64>,
}

/// An estimated model. Immutable; forecasting reads it, nothing updates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaFit {
    pub order: ModelOrder,
    pub coefficients: ArmaCoefficients,
    /// Mean of the (undifferenced) series, when estimated
    pub mean: Option<f64>,
    pub sigma2: f64,
    pub log_likelihood: f64,
    /// Observations the likelihood was computed on (after differencing)
    pub nobs: usize,
    pub parameters: Vec<ParameterEstimate>,
    pub iterations: usize,
    /// Residuals scaled to unit variance
    pub residuals: Vec<f64>,
    /// Predicted state after the sample, in rescaled units
    next_state: Vec<f64>,
    /// `w = center + scale · z`
    center: f64,
    scale: f64,
}

impl ArimaFit {
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * self.order.n_params() as f64
    }

    pub fn bic(&self) -> f64 {
        -2.0 * self.log_likelihood + self.order.n_params() as f64 * (self.nobs as f64).ln()
    }

    pub fn has_zero_variance(&self) -> bool {
        self.sigma2 <= 0.0
    }
}

/// Names in the order they appear in the unconstrained vector.
fn parameter_names(order: &ModelOrder) -> Vec<String> {
    let s = order.period();
    let mut names = Vec::with_capacity(order.arma_params() + 1);
    names.extend((1..=order.p).map(|i| format!("ar.L{}", i)));
    names.extend((1..=order.q).map(|i| format!("ma.L{}", i)));
    names.extend((1..=order.seasonal_ar()).map(|i| format!("ar.S.L{}", i * s)));
    names.extend((1..=order.seasonal_ma()).map(|i| format!("ma.S.L{}", i * s)));
    if order.estimates_mean() {
        names.push("const".to_string());
    }
    names
}

/// Unconstrained starting point: AR terms from the sample partial
/// autocorrelations, everything else at zero.
fn starting_values(order: &ModelOrder, z: &[f64]) -> Vec<f64> {
    let mut start = vec![0.0; order.arma_params() + usize::from(order.estimates_mean())];
    if order.p > 0 && z.len() > order.p + 1 {
        let partial = pacf(z, order.p);
        for (slot, r) in start.iter_mut().zip(partial.iter().skip(1)) {
            let r = r.clamp(-0.9, 0.9);
            *slot = r / (1.0 - r * r).sqrt();
        }
    }
    start
}

struct Objective<'a> {
    order: &'a ModelOrder,
    z: &'a [f64],
}

impl Objective<'_> {
    fn filter(&self, x: &[f64]) -> Option<FilterOutput> {
        let coefficients = ArmaCoefficients::from_unconstrained(self.order, x);
        let period = self.order.period();
        let model = ArmaStateSpace::new(
            &coefficients.expanded_ar(period),
            &coefficients.expanded_ma(period),
        );
        let shift = if self.order.estimates_mean() {
            x[self.order.arma_params()]
        } else {
            0.0
        };
        let demeaned: Vec<f64> = self.z.iter().map(|v| v - shift).collect();
        model.filter(&demeaned)
    }

    fn negative_log_likelihood(&self, x: &[f64]) -> f64 {
        self.filter(x)
            .map(|out| -out.concentrated_log_likelihood())
            .unwrap_or(f64::INFINITY)
    }
}

/// Maximum-likelihood fit of `order` on `values` (undifferenced, contiguous).
pub fn fit(values: &[f64], order: &ModelOrder, settings: &FitSettings) -> Result<ArimaFit, FitError> {
    let w = order.difference(values);
    let needed = if order.is_baseline() { 1 } else { order.n_params() };
    if w.len() < needed {
        return Err(FitError::InsufficientData {
            needed: needed + order.differencing_span(),
            available: values.len(),
        });
    }

    let center = if order.estimates_mean() { mean(&w) } else { 0.0 };
    let spread = (w.iter().map(|v| (v - center).powi(2)).sum::<f64>() / w.len() as f64).sqrt();
    if !spread.is_finite() {
        return Err(FitError::NonFinite);
    }
    if spread <= 1e-12 * (1.0 + center.abs()) {
        return if order.is_baseline() {
            Ok(zero_variance_fit(order, &w, center))
        } else {
            Err(FitError::DegenerateVariance)
        };
    }
    let z: Vec<f64> = w.iter().map(|v| (v - center) / spread).collect();

    let objective = Objective { order, z: &z };
    let start = starting_values(order, &z);
    let nm_settings = NelderMeadSettings {
        max_iterations: settings.max_iterations_per_parameter * start.len().max(1),
        max_time: settings.max_fit_time,
        tolerance: settings.tolerance,
        initial_step: 0.5,
    };
    // The baseline's only free parameter (the mean) is already at its optimum:
    // the sample mean of the rescaled series is zero
    let minimum = if order.is_baseline() {
        Minimum {
            value: objective.negative_log_likelihood(&start),
            point: start,
            iterations: 0,
            reason: StopReason::Converged,
        }
    } else {
        nelder_mead(|x| objective.negative_log_likelihood(x), &start, &nm_settings)
    };
    match minimum.reason {
        StopReason::Converged => {}
        StopReason::TimeCap => {
            log::warn!(
                "⚠️  {} hit the {:?} wall-clock backstop after {} iterations",
                order,
                settings.max_fit_time,
                minimum.iterations
            );
            return Err(FitError::NotConverged {
                iterations: minimum.iterations,
            });
        }
        StopReason::IterationCap => {
            return Err(FitError::NotConverged {
                iterations: minimum.iterations,
            });
        }
    }

    let x = minimum.point;
    let output = objective.filter(&x).ok_or(FitError::NonFinite)?;
    let sigma2_z = output.sigma2();
    if !sigma2_z.is_finite() {
        return Err(FitError::NonFinite);
    }
    if sigma2_z <= 1e-10 {
        return Err(FitError::DegenerateVariance);
    }
    let log_likelihood = output.concentrated_log_likelihood() - w.len() as f64 * spread.ln();
    if !log_likelihood.is_finite() {
        return Err(FitError::NonFinite);
    }

    // Standard errors: invert the Hessian in unconstrained space, then carry
    // the covariance to the reported parameters with the delta method
    let std_errors = if x.is_empty() {
        Vec::new()
    } else {
        let hessian = numerical_hessian(|p| objective.negative_log_likelihood(p), &x);
        let covariance = covariance_from_hessian(&hessian).ok_or(FitError::SingularCovariance)?;
        let reported = |p: &[f64]| reported_values(order, p, center, spread);
        let jacobian = numerical_jacobian(reported, &x);
        let delta = sandwich(&jacobian, &covariance);
        (0..delta.len())
            .map(|i| Some(delta[i][i]).filter(|v| v.is_finite() && *v >= 0.0).map(f64::sqrt))
            .collect()
    };

    let coefficients = ArmaCoefficients::from_unconstrained(order, &x);
    let mean_value = order
        .estimates_mean()
        .then(|| center + spread * x[order.arma_params()]);
    let sigma2 = sigma2_z * spread * spread;

    let mut parameters: Vec<ParameterEstimate> = parameter_names(order)
        .into_iter()
        .zip(reported_values(order, &x, center, spread))
        .zip(std_errors)
        .map(|((name, value), std_error)| ParameterEstimate {
            name,
            value,
            std_error,
        })
        .collect();
    parameters.push(ParameterEstimate {
        name: "sigma2".to_string(),
        value: sigma2,
        std_error: None,
    });

    Ok(ArimaFit {
        order: *order,
        coefficients,
        mean: mean_value,
        sigma2,
        log_likelihood,
        nobs: w.len(),
        parameters,
        iterations: minimum.iterations,
        residuals: output.standardized_residuals(),
        next_state: output.next_state,
        center: mean_value.unwrap_or(center),
        scale: spread,
    })
}

/// Constrained coefficients followed by the mean (data units), matching `parameter_names`.
fn reported_values(order: &ModelOrder, x: &[f64], center: f64, spread: f64) -> Vec<f64> {
    let c = ArmaCoefficients::from_unconstrained(order, x);
    let mut values: Vec<f64> = c
        .ar
        .into_iter()
        .chain(c.ma)
        .chain(c.seasonal_ar)
        .chain(c.seasonal_ma)
        .collect();
    if order.estimates_mean() {
        values.push(center + spread * x[order.arma_params()]);
    }
    values
}

/// A flat differenced series: the baseline reproduces it exactly.
fn zero_variance_fit(order: &ModelOrder, w: &[f64], center: f64) -> ArimaFit {
    let mean = order.estimates_mean().then_some(center);
    let mut parameters = Vec::new();
    if let Some(m) = mean {
        parameters.push(ParameterEstimate {
            name: "const".to_string(),
            value: m,
            std_error: None,
        });
    }
    parameters.push(ParameterEstimate {
        name: "sigma2".to_string(),
        value: 0.0,
        std_error: None,
    });
    ArimaFit {
        order: *order,
        coefficients: ArmaCoefficients::default(),
        mean,
        sigma2: 0.0,
        log_likelihood: f64::NAN,
        nobs: w.len(),
        parameters,
        iterations: 0,
        residuals: vec![0.0; w.len()],
        next_state: vec![0.0],
        // A flat differenced series equals its first value
        center: w.first().copied().unwrap_or(center),
        scale: 0.0,
    }
}

// ============================================================================
// Forecast
// ============================================================================

/// One forecast step: point value and forecast-error variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepForecast {
    pub point: f64,
    pub variance: f64,
}

/// ψ weights of `θ(B) / (φ(B) Δ(B))`, i.e. the MA(∞) form of the
/// undifferenced series. `psi[0] = 1`.
pub fn psi_weights(ar: &[f64], ma: &[f64], differencing: &[f64], count: usize) -> Vec<f64> {
    let ar_poly: Vec<f64> = std::iter::once(1.0).chain(ar.iter().map(|c| -c)).collect();
    let full = poly_mul(&ar_poly, differencing);
    // y_t = Σ a_i y_{t-i} + ...  with a_i = -full[i]
    let a: Vec<f64> = full.iter().skip(1).map(|c| -c).collect();

    let mut psi = Vec::with_capacity(count);
    for j in 0..count {
        let mut value = if j == 0 {
            1.0
        } else {
            ma.get(j - 1).copied().unwrap_or(0.0)
        };
        for i in 1..=j.min(a.len()) {
            value += a[i - 1] * psi[j - i];
        }
        psi.push(value);
    }
    psi
}

impl ArimaFit {
    /// Forecast `horizon` steps after the end of `history` (the series the
    /// model was fitted on). Variances grow with the cumulated ψ weights.
    pub fn forecast(&self, history: &[f64], horizon: usize) -> Vec<StepForecast> {
        let period = self.order.period();
        let ar = self.coefficients.expanded_ar(period);
        let ma = self.coefficients.expanded_ma(period);
        let model = ArmaStateSpace::new(&ar, &ma);

        // Differenced-scale point forecasts from the final filtered state
        let mut state = self.next_state.clone();
        state.resize(model.dimension(), 0.0);
        let mut w_forecasts = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            w_forecasts.push(self.center + self.scale * state[0]);
            state = model.transition(&state);
        }

        // Undo the differencing: y_t = w_t - Σ δ_i y_{t-i}
        let delta = self.order.differencing_polynomial();
        let mut path = history.to_vec();
        for w in &w_forecasts {
            let t = path.len();
            let carried: f64 = delta
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, c)| c * t.checked_sub(i).map_or(0.0, |idx| path[idx]))
                .sum();
            path.push(w - carried);
        }

        let psi = psi_weights(&ar, &ma, &delta, horizon);
        let mut cumulative = 0.0;
        path[history.len()..]
            .iter()
            .zip(&psi)
            .map(|(point, weight)| {
                cumulative += weight * weight;
                StepForecast {
                    point: *point,
                    variance: self.sigma2 * cumulative,
                }
            })
            .collect()
    }
}
