//! ARMA in state-space form and its exact Gaussian likelihood.
//!
//! Harvey representation with state dimension `r = max(p, q + 1)`:
//! transition `T` has the AR coefficients in its first column and ones on the
//! superdiagonal, the disturbance loading is `R = [1, θ1, .., θ(r-1)]` and the
//! observation picks the first state. The innovation variance is concentrated
//! out, so the filter runs with unit variance.

use crate::utils::maths_utils::invert;

const MAX_DOUBLING_STEPS: usize = 60;
const STEADY_STATE_TOLERANCE: f64 = 1e-11;

#[derive(Debug, Clone)]
pub struct ArmaStateSpace {
    /// AR coefficients, zero-padded to `r`
    phi: Vec<f64>,
    /// `R` vector: 1 followed by the MA coefficients, zero-padded to `r`
    loading: Vec<f64>,
}

/// Filter output on a (demeaned) series.
#[derive(Debug, Clone)]
pub struct FilterOutput {
    /// One-step prediction errors `v_t`
    pub innovations: Vec<f64>,
    /// Their variances `F_t` (unit innovation variance)
    pub variances: Vec<f64>,
    /// `Σ v_t² / F_t`
    pub sum_squares: f64,
    /// `Σ ln F_t`
    pub sum_log_variances: f64,
    /// Predicted state for the first period after the sample
    pub next_state: Vec<f64>,
}

impl FilterOutput {
    pub fn nobs(&self) -> usize {
        self.innovations.len()
    }

    /// Maximum-likelihood innovation variance.
    pub fn sigma2(&self) -> f64 {
        self.sum_squares / self.nobs().max(1) as f64
    }

    /// Gaussian log-likelihood with the variance concentrated out.
    pub fn concentrated_log_likelihood(&self) -> f64 {
        let n = self.nobs() as f64;
        -0.5 * n * ((2.0 * std::f64::consts::PI).ln() + self.sigma2().ln() + 1.0)
            - 0.5 * self.sum_log_variances
    }

    /// Innovations scaled to unit variance, used for residual diagnostics.
    pub fn standardized_residuals(&self) -> Vec<f64> {
        let sigma = self.sigma2().sqrt();
        self.innovations
            .iter()
            .zip(&self.variances)
            .map(|(v, f)| v / (f.sqrt() * sigma))
            .collect()
    }
}

impl ArmaStateSpace {
    /// `ar` and `ma` in the sign convention `φ(B) = 1 - Σ φ_i B^i`, `θ(B) = 1 + Σ θ_j B^j`.
    pub fn new(ar: &[f64], ma: &[f64]) -> Self {
        let r = ar.len().max(ma.len() + 1);
        let mut phi = vec![0.0; r];
        phi[..ar.len()].copy_from_slice(ar);
        let mut loading = vec![0.0; r];
        loading[0] = 1.0;
        loading[1..=ma.len()].copy_from_slice(ma);
        Self { phi, loading }
    }

    pub fn dimension(&self) -> usize {
        self.phi.len()
    }

    /// `T a`
    pub fn transition(&self, state: &[f64]) -> Vec<f64> {
        let r = self.dimension();
        (0..r)
            .map(|i| self.phi[i] * state[0] + if i + 1 < r { state[i + 1] } else { 0.0 })
            .collect()
    }

    /// `T P Tᵀ` using the sparsity of `T`.
    fn propagate(&self, p: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let r = self.dimension();
        // TP
        let tp: Vec<Vec<f64>> = (0..r)
            .map(|i| {
                (0..r)
                    .map(|j| self.phi[i] * p[0][j] + if i + 1 < r { p[i + 1][j] } else { 0.0 })
                    .collect()
            })
            .collect();
        // (TP)Tᵀ
        (0..r)
            .map(|i| {
                (0..r)
                    .map(|j| tp[i][0] * self.phi[j] + if j + 1 < r { tp[i][j + 1] } else { 0.0 })
                    .collect()
            })
            .collect()
    }

    fn dense_transition(&self) -> Vec<Vec<f64>> {
        let r = self.dimension();
        (0..r)
            .map(|i| {
                (0..r)
                    .map(|j| {
                        if j == 0 {
                            self.phi[i]
                        } else if j == i + 1 {
                            1.0
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Unconditional state covariance: the solution of `P = T P Tᵀ + R Rᵀ`,
    /// computed by the doubling algorithm. `None` if it does not settle
    /// (non-stationary AR part).
    pub fn stationary_covariance(&self) -> Option<Vec<Vec<f64>>> {
        let r = self.dimension();
        let mut a = self.dense_transition();
        let mut p: Vec<Vec<f64>> = (0..r)
            .map(|i| (0..r).map(|j| self.loading[i] * self.loading[j]).collect())
            .collect();

        for _ in 0..MAX_DOUBLING_STEPS {
            // P <- P + A P Aᵀ ; A <- A A
            let ap = mat_mul(&a, &p);
            let apa = mat_mul_transpose(&ap, &a);
            let mut change = 0.0_f64;
            let mut scale = 0.0_f64;
            for i in 0..r {
                for j in 0..r {
                    p[i][j] += apa[i][j];
                    change = change.max(apa[i][j].abs());
                    scale = scale.max(p[i][j].abs());
                }
            }
            if !scale.is_finite() {
                return None;
            }
            if change <= 1e-13 * scale.max(1.0) {
                return Some(p);
            }
            a = mat_mul(&a, &a);
        }
        None
    }

    /// Run the Kalman filter over `y` (already demeaned), starting from the
    /// unconditional distribution of the state.
    pub fn filter(&self, y: &[f64]) -> Option<FilterOutput> {
        let r = self.dimension();
        let rr: Vec<Vec<f64>> = (0..r)
            .map(|i| (0..r).map(|j| self.loading[i] * self.loading[j]).collect())
            .collect();

        let mut state = vec![0.0; r];
        let mut p = self.stationary_covariance()?;
        let mut steady = false;

        let mut out = FilterOutput {
            innovations: Vec::with_capacity(y.len()),
            variances: Vec::with_capacity(y.len()),
            sum_squares: 0.0,
            sum_log_variances: 0.0,
            next_state: Vec::new(),
        };

        for &obs in y {
            let f = p[0][0];
            if !f.is_finite() || f <= 0.0 {
                return None;
            }
            let v = obs - state[0];
            out.innovations.push(v);
            out.variances.push(f);
            out.sum_squares += v * v / f;
            out.sum_log_variances += f.ln();

            // Gain K = T P Zᵀ / F
            let pz: Vec<f64> = (0..r).map(|i| p[i][0]).collect();
            let gain: Vec<f64> = self.transition(&pz).iter().map(|k| k / f).collect();

            let predicted = self.transition(&state);
            state = predicted.iter().zip(&gain).map(|(a, k)| a + k * v).collect();

            if !steady {
                let mut next = self.propagate(&p);
                let mut change = 0.0_f64;
                for i in 0..r {
                    for j in 0..r {
                        next[i][j] += rr[i][j] - gain[i] * gain[j] * f;
                        change = change.max((next[i][j] - p[i][j]).abs());
                    }
                }
                steady = change <= STEADY_STATE_TOLERANCE;
                p = next;
            }
        }

        out.next_state = state;
        Some(out)
    }
}

fn mat_mul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = a.len();
    let m = b.first().map_or(0, Vec::len);
    let inner = b.len();
    let mut out = vec![vec![0.0; m]; n];
    for i in 0..n {
        for k in 0..inner {
            let aik = a[i][k];
            if aik == 0.0 {
                continue;
            }
            for j in 0..m {
                out[i][j] += aik * b[k][j];
            }
        }
    }
    out
}

/// `A Bᵀ`
fn mat_mul_transpose(a: &[Vec<f64>], b: &[Vec<f64>]) -> Vec<Vec<f64>> {
    a.iter()
        .map(|row| {
            b.iter()
                .map(|other| row.iter().zip(other).map(|(x, y)| x * y).sum())
                .collect()
        })
        .collect()
}

/// `J Σ Jᵀ`, used to carry a covariance through a reparameterisation.
pub fn sandwich(jacobian: &[Vec<f64>], covariance: &[Vec<f64>]) -> Vec<Vec<f64>> {
    mat_mul_transpose(&mat_mul(jacobian, covariance), jacobian)
}

/// Inverse of a symmetric positive-definite matrix, `None` when singular or indefinite.
pub fn covariance_from_hessian(hessian: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let inverse = invert(hessian)?;
    let positive = inverse
        .iter()
        .enumerate()
        .all(|(i, row)| row[i].is_finite() && row[i] > 0.0);
    positive.then_some(inverse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ar1_stationary_variance() {
        // Var = 1 / (1 - φ²)
        let ss = ArmaStateSpace::new(&[0.5], &[]);
        let p = ss.stationary_covariance().unwrap();
        assert!((p[0][0] - 1.0 / 0.75).abs() < 1e-10);
    }

    #[test]
    fn test_ma1_stationary_variance() {
        // Var(y) = 1 + θ²
        let ss = ArmaStateSpace::new(&[], &[0.4]);
        assert_eq!(ss.dimension(), 2);
        let p = ss.stationary_covariance().unwrap();
        assert!((p[0][0] - 1.16).abs() < 1e-10);
    }

    #[test]
    fn test_unit_root_has_no_stationary_covariance() {
        let ss = ArmaStateSpace::new(&[1.0], &[]);
        assert!(ss.stationary_covariance().is_none());
    }

    #[test]
    fn test_white_noise_likelihood() {
        let y = [0.5, -1.0, 0.25, 1.5];
        let ss = ArmaStateSpace::new(&[], &[]);
        let out = ss.filter(&y).unwrap();
        assert_eq!(out.innovations, y.to_vec());
        let sigma2 = y.iter().map(|v| v * v).sum::<f64>() / 4.0;
        assert!((out.sigma2() - sigma2).abs() < 1e-12);
        let expected = -2.0 * ((2.0 * std::f64::consts::PI).ln() + sigma2.ln() + 1.0);
        assert!((out.concentrated_log_likelihood() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ar1_prediction_errors() {
        // After the first point, the AR(1) predictor is φ·y[t-1]
        let y = [1.0, 2.0, -1.0];
        let ss = ArmaStateSpace::new(&[0.5], &[]);
        let out = ss.filter(&y).unwrap();
        assert!((out.innovations[1] - 1.5).abs() < 1e-12);
        assert!((out.innovations[2] + 2.0).abs() < 1e-12);
        assert!((out.variances[1] - 1.0).abs() < 1e-12);
        assert!((out.next_state[0] + 0.5).abs() < 1e-12);
    }
}
