pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Lag-`lag` difference: `x[t] - x[t - lag]`. Output is `lag` shorter.
pub fn difference(values: &[f64], lag: usize) -> Vec<f64> {
    if lag == 0 || values.len() <= lag {
        return if lag == 0 { values.to_vec() } else { Vec::new() };
    }
    (lag..values.len()).map(|t| values[t] - values[t - lag]).collect()
}

/// Multiply two polynomials given as coefficient vectors (constant term first).
pub fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Sample autocorrelation for lags `0..=nlags` (biased denominator, as in the
/// usual correlogram). A constant series yields `[1, 0, 0, ...]`.
pub fn acf(values: &[f64], nlags: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![0.0; nlags + 1];
    if n == 0 {
        return out;
    }
    out[0] = 1.0;
    let m = mean(values);
    let centered: Vec<f64> = values.iter().map(|x| x - m).collect();
    let c0: f64 = centered.iter().map(|x| x * x).sum::<f64>() / n as f64;
    if c0 <= f64::EPSILON {
        return out;
    }
    for (k, slot) in out.iter_mut().enumerate().skip(1) {
        if k >= n {
            break;
        }
        let ck: f64 = (k..n).map(|t| centered[t] * centered[t - k]).sum::<f64>() / n as f64;
        *slot = ck / c0;
    }
    out
}

/// Levinson-Durbin recursion on autocorrelations `r[0..=order]`.
///
/// Returns the AR(order) Yule-Walker coefficients and the partial
/// autocorrelations for lags `1..=order`. Stops early (zero-filled) if the
/// recursion becomes degenerate.
pub fn levinson_durbin(r: &[f64], order: usize) -> (Vec<f64>, Vec<f64>) {
    let mut phi = vec![0.0; order];
    let mut partial = vec![0.0; order];
    if order == 0 || r.len() <= order || r[0].abs() <= f64::EPSILON {
        return (phi, partial);
    }

    let mut error = r[0];
    for k in 0..order {
        let mut acc = r[k + 1];
        for j in 0..k {
            acc -= phi[j] * r[k - j];
        }
        if error.abs() <= f64::EPSILON {
            break;
        }
        let reflection = acc / error;
        let previous = phi.clone();
        phi[k] = reflection;
        for j in 0..k {
            phi[j] = previous[j] - reflection * previous[k - 1 - j];
        }
        partial[k] = reflection;
        error *= 1.0 - reflection * reflection;
    }
    (phi, partial)
}

/// Partial autocorrelation for lags `0..=nlags` (lag 0 is 1 by convention).
pub fn pacf(values: &[f64], nlags: usize) -> Vec<f64> {
    let r = acf(values, nlags);
    let (_, partial) = levinson_durbin(&r, nlags);
    let mut out = Vec::with_capacity(nlags + 1);
    out.push(1.0);
    out.extend(partial);
    out
}

/// Invert a small dense matrix with Gauss-Jordan elimination and partial pivoting.
/// Returns `None` when the matrix is (numerically) singular.
pub fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    if n == 0 {
        return Some(Vec::new());
    }
    let scale = matrix
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, x| acc.max(x.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }

    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot_row][col].abs() <= 1e-12 * scale {
            return None;
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in 0..n {
            a[col][j] /= pivot;
            inv[col][j] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }
    Some(inv)
}

/// Ordinary least squares fit.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub ssr: f64,
    pub nobs: usize,
    pub log_likelihood: f64,
}

impl OlsFit {
    pub fn t_stat(&self, idx: usize) -> f64 {
        self.coefficients[idx] / self.std_errors[idx]
    }

    /// Akaike criterion from the Gaussian log-likelihood.
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * self.coefficients.len() as f64
    }
}

/// Regress `y` on the columns of `rows` (one row per observation).
/// Returns `None` for singular designs, perfect fits or too few observations.
pub fn ols(y: &[f64], rows: &[Vec<f64>]) -> Option<OlsFit> {
    let n = y.len();
    let k = rows.first().map(|r| r.len())?;
    if n != rows.len() || n <= k || k == 0 {
        return None;
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, yi) in rows.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * yi;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    let xtx_inv = invert(&xtx)?;
    let coefficients: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| xtx_inv[i][j] * xty[j]).sum())
        .collect();

    let ssr: f64 = rows
        .iter()
        .zip(y)
        .map(|(row, yi)| {
            let fitted: f64 = row.iter().zip(&coefficients).map(|(x, b)| x * b).sum();
            (yi - fitted).powi(2)
        })
        .sum();
    if ssr <= f64::EPSILON {
        return None;
    }

    let sigma2 = ssr / (n - k) as f64;
    let std_errors: Vec<f64> = (0..k).map(|i| (sigma2 * xtx_inv[i][i]).sqrt()).collect();
    if std_errors.iter().any(|s| !s.is_finite() || *s <= 0.0) {
        return None;
    }
    let nf = n as f64;
    let log_likelihood =
        -nf / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (ssr / nf).ln() + 1.0);

    Some(OlsFit {
        coefficients,
        std_errors,
        ssr,
        nobs: n,
        log_likelihood,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difference() {
        assert_eq!(difference(&[1.0, 3.0, 6.0, 10.0], 1), vec![2.0, 3.0, 4.0]);
        assert_eq!(difference(&[1.0, 3.0, 6.0, 10.0], 2), vec![5.0, 7.0]);
        assert!(difference(&[1.0], 1).is_empty());
    }

    #[test]
    fn test_poly_mul() {
        // (1 - 0.5B)(1 - B) = 1 - 1.5B + 0.5B^2
        assert_eq!(poly_mul(&[1.0, -0.5], &[1.0, -1.0]), vec![1.0, -1.5, 0.5]);
    }

    #[test]
    fn test_acf_of_alternating_series() {
        let x = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let r = acf(&x, 2);
        assert_eq!(r[0], 1.0);
        assert!(r[1] < -0.8);
        assert!(r[2] > 0.6);
    }

    #[test]
    fn test_levinson_matches_ar1() {
        // AR(1) with phi = 0.6 has r_k = 0.6^k
        let r = [1.0, 0.6, 0.36, 0.216];
        let (phi, partial) = levinson_durbin(&r, 3);
        assert!((phi[0] - 0.6).abs() < 1e-12);
        assert!(phi[1].abs() < 1e-12);
        assert!((partial[0] - 0.6).abs() < 1e-12);
        assert!(partial[2].abs() < 1e-12);
    }

    #[test]
    fn test_invert_and_singular() {
        let m = vec![vec![4.0, 7.0], vec![2.0, 6.0]];
        let inv = invert(&m).unwrap();
        assert!((inv[0][0] - 0.6).abs() < 1e-12);
        assert!((inv[0][1] + 0.7).abs() < 1e-12);
        assert!((inv[1][0] + 0.2).abs() < 1e-12);
        assert!((inv[1][1] - 0.4).abs() < 1e-12);

        assert!(invert(&[vec![1.0, 2.0], vec![2.0, 4.0]]).is_none());
    }

    #[test]
    fn test_ols_recovers_line() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let noise = [0.1, -0.1, 0.05, -0.05, 0.02, -0.02];
        let y: Vec<f64> = xs.iter().zip(noise).map(|(x, e)| 2.0 + 3.0 * x + e).collect();
        let rows: Vec<Vec<f64>> = xs.iter().map(|x| vec![1.0, *x]).collect();
        let fit = ols(&y, &rows).unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < 0.2);
        assert!((fit.coefficients[1] - 3.0).abs() < 0.1);
        assert_eq!(fit.nobs, 6);
    }
}
