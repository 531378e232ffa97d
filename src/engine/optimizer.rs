//! Derivative-free minimisation (Nelder–Mead) with iteration and wall-clock caps.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct NelderMeadSettings {
    pub max_iterations: usize,
    pub max_time: Duration,
    /// Stop when the simplex values agree to this relative tolerance
    pub tolerance: f64,
    /// Edge length of the starting simplex
    pub initial_step: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Converged,
    IterationCap,
    TimeCap,
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub reason: StopReason,
}

impl Minimum {
    pub fn converged(&self) -> bool {
        self.reason == StopReason::Converged
    }
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimise `objective` from `start`. Non-finite values count as `+inf`,
/// so infeasible regions are simply walked away from.
pub fn nelder_mead<F>(mut objective: F, start: &[f64], settings: &NelderMeadSettings) -> Minimum
where
    F: FnMut(&[f64]) -> f64,
{
    let mut eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_nan() || v == f64::INFINITY { f64::INFINITY } else { v }
    };

    let dim = start.len();
    if dim == 0 {
        return Minimum {
            point: Vec::new(),
            value: eval(start),
            iterations: 0,
            reason: StopReason::Converged,
        };
    }

    let started = Instant::now();
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    simplex.push(start.to_vec());
    for i in 0..dim {
        let mut vertex = start.to_vec();
        vertex[i] += settings.initial_step;
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let reason = loop {
        // Order best to worst
        let mut order: Vec<usize> = (0..=dim).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let (best, worst) = (values[0], values[dim]);
        let spread = (worst - best).abs();
        let size = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        if best.is_finite()
            && spread <= settings.tolerance * (1.0 + best.abs())
            && size <= settings.tolerance.sqrt()
        {
            break StopReason::Converged;
        }
        if iterations >= settings.max_iterations {
            break StopReason::IterationCap;
        }
        if started.elapsed() >= settings.max_time {
            break StopReason::TimeCap;
        }
        iterations += 1;

        let centroid: Vec<f64> = (0..dim)
            .map(|j| simplex[..dim].iter().map(|v| v[j]).sum::<f64>() / dim as f64)
            .collect();
        let towards = |coef: f64, from: &[f64]| -> Vec<f64> {
            centroid
                .iter()
                .zip(from)
                .map(|(c, x)| c + coef * (c - x))
                .collect()
        };

        let reflected = towards(REFLECTION, &simplex[dim]);
        let f_reflected = eval(&reflected);

        if f_reflected < values[0] {
            let expanded = towards(EXPANSION, &simplex[dim]);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[dim] = expanded;
                values[dim] = f_expanded;
            } else {
                simplex[dim] = reflected;
                values[dim] = f_reflected;
            }
            continue;
        }
        if f_reflected < values[dim - 1] {
            simplex[dim] = reflected;
            values[dim] = f_reflected;
            continue;
        }

        // Contraction: outside if the reflection improved on the worst, inside otherwise
        let (contracted, f_contracted) = if f_reflected < values[dim] {
            let point = towards(CONTRACTION, &simplex[dim]);
            let f = eval(&point);
            (point, f)
        } else {
            let point = towards(-CONTRACTION, &simplex[dim]);
            let f = eval(&point);
            (point, f)
        };
        if f_contracted < values[dim].min(f_reflected) {
            simplex[dim] = contracted;
            values[dim] = f_contracted;
            continue;
        }

        let best_vertex = simplex[0].clone();
        for i in 1..=dim {
            simplex[i] = best_vertex
                .iter()
                .zip(&simplex[i])
                .map(|(b, x)| b + SHRINK * (x - b))
                .collect();
            values[i] = eval(&simplex[i]);
        }
    };

    let best = (0..=dim)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    Minimum {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        reason,
    }
}

/// Central-difference Hessian of `f` at `x`.
pub fn numerical_hessian<F>(mut f: F, x: &[f64]) -> Vec<Vec<f64>>
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x.len();
    let steps: Vec<f64> = x.iter().map(|xi| 5e-4 * xi.abs().max(1.0)).collect();
    let f0 = f(x);
    let mut hessian = vec![vec![0.0; n]; n];
    let mut probe = x.to_vec();

    for i in 0..n {
        let hi = steps[i];
        probe[i] = x[i] + hi;
        let up = f(&probe);
        probe[i] = x[i] - hi;
        let down = f(&probe);
        probe[i] = x[i];
        hessian[i][i] = (up - 2.0 * f0 + down) / (hi * hi);

        for j in 0..i {
            let hj = steps[j];
            let mut corner = |si: f64, sj: f64| {
                probe[i] = x[i] + si * hi;
                probe[j] = x[j] + sj * hj;
                let v = f(&probe);
                probe[i] = x[i];
                probe[j] = x[j];
                v
            };
            let value = (corner(1.0, 1.0) - corner(1.0, -1.0) - corner(-1.0, 1.0)
                + corner(-1.0, -1.0))
                / (4.0 * hi * hj);
            hessian[i][j] = value;
            hessian[j][i] = value;
        }
    }
    hessian
}

/// Central-difference Jacobian of a vector-valued `f` at `x` (rows = outputs).
pub fn numerical_jacobian<F>(mut f: F, x: &[f64]) -> Vec<Vec<f64>>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let outputs = f(x).len();
    let mut jacobian = vec![vec![0.0; x.len()]; outputs];
    let mut probe = x.to_vec();
    for j in 0..x.len() {
        let h = 1e-6 * x[j].abs().max(1.0);
        probe[j] = x[j] + h;
        let up = f(&probe);
        probe[j] = x[j] - h;
        let down = f(&probe);
        probe[j] = x[j];
        for i in 0..outputs {
            jacobian[i][j] = (up[i] - down[i]) / (2.0 * h);
        }
    }
    jacobian
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> NelderMeadSettings {
        NelderMeadSettings {
            max_iterations: 2_000,
            max_time: Duration::from_secs(5),
            tolerance: 1e-10,
            initial_step: 0.5,
        }
    }

    #[test]
    fn test_minimises_quadratic() {
        let min = nelder_mead(
            |x| (x[0] - 1.0).powi(2) + 2.0 * (x[1] + 0.5).powi(2),
            &[0.0, 0.0],
            &settings(),
        );
        assert!(min.converged());
        assert!((min.point[0] - 1.0).abs() < 1e-4);
        assert!((min.point[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_rosenbrock() {
        let min = nelder_mead(
            |x| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2),
            &[-1.2, 1.0],
            &settings(),
        );
        assert!(min.value < 1e-6);
    }

    #[test]
    fn test_iteration_cap_reported() {
        let capped = NelderMeadSettings {
            max_iterations: 3,
            ..settings()
        };
        let min = nelder_mead(|x| (x[0] - 10.0).powi(2), &[0.0], &capped);
        assert_eq!(min.reason, StopReason::IterationCap);
        assert_eq!(min.iterations, 3);
    }

    #[test]
    fn test_iteration_cap_is_reproducible() {
        let capped = NelderMeadSettings {
            max_iterations: 50,
            ..settings()
        };
        let rosenbrock = |x: &[f64]| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2);
        let first = nelder_mead(rosenbrock, &[-1.2, 1.0], &capped);
        let second = nelder_mead(rosenbrock, &[-1.2, 1.0], &capped);

        assert_eq!(first.reason, StopReason::IterationCap);
        assert_eq!(first.iterations, second.iterations);
        assert_eq!(first.point, second.point);
    }

    #[test]
    fn test_nan_region_avoided() {
        let min = nelder_mead(
            |x| if x[0] < 0.0 { f64::NAN } else { (x[0] - 2.0).powi(2) },
            &[1.0],
            &settings(),
        );
        assert!((min.point[0] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_hessian_of_quadratic() {
        let h = numerical_hessian(|x| 3.0 * x[0] * x[0] + x[0] * x[1] + 2.0 * x[1] * x[1], &[0.3, -0.2]);
        assert!((h[0][0] - 6.0).abs() < 1e-4);
        assert!((h[0][1] - 1.0).abs() < 1e-4);
        assert!((h[1][1] - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_jacobian() {
        let j = numerical_jacobian(|x| vec![x[0] * x[1], x[0].sin()], &[2.0, 3.0]);
        assert!((j[0][0] - 3.0).abs() < 1e-6);
        assert!((j[0][1] - 2.0).abs() < 1e-6);
        assert!((j[1][0] - 2.0_f64.cos()).abs() < 1e-6);
    }
}
