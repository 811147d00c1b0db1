//! Gaussian-process regression on the unit hypercube
//!
//! Small, dense implementation: squared-exponential kernel with a fixed length
//! scale, targets standardized before fitting, Cholesky factorization of the
//! kernel matrix. Trial counts are tiny (tens of points) so O(n^3) is fine.

use crate::error::{AppError, Result};

/// Jitter added to the diagonal when factorization fails
const JITTER_STEPS: [f64; 4] = [1e-8, 1e-6, 1e-4, 1e-2];

/// Fitted Gaussian process
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    points: Vec<Vec<f64>>,
    /// Lower-triangular Cholesky factor of K + noise*I
    chol: Vec<Vec<f64>>,
    /// (K + noise*I)^-1 * y_standardized
    alpha: Vec<f64>,
    y_mean: f64,
    y_scale: f64,
    length_scale: f64,
}

impl GaussianProcess {
    /// Fit to `points` (each in [0,1]^d) with targets `targets`
    pub fn fit(points: &[Vec<f64>], targets: &[f64], length_scale: f64, noise: f64) -> Result<Self> {
        if points.is_empty() {
            return Err(AppError::search("Cannot fit a surrogate without observations"));
        }
        if points.len() != targets.len() {
            return Err(AppError::search("Observation and target counts differ"));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(AppError::search("Observed scores must be finite"));
        }
        if length_scale <= 0.0 {
            return Err(AppError::search("Kernel length scale must be positive"));
        }

        let n = targets.len();
        let y_mean = targets.iter().sum::<f64>() / n as f64;
        let variance = targets.iter().map(|t| (t - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_scale = if variance.sqrt() > 1e-12 { variance.sqrt() } else { 1.0 };
        let standardized: Vec<f64> = targets.iter().map(|t| (t - y_mean) / y_scale).collect();

        let mut kernel = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let k = rbf(&points[i], &points[j], length_scale);
                kernel[i][j] = k;
                kernel[j][i] = k;
            }
            kernel[i][i] += noise.max(0.0);
        }

        let chol = cholesky_with_jitter(&kernel)?;
        let forward = solve_lower(&chol, &standardized);
        let alpha = solve_upper_transposed(&chol, &forward);

        Ok(Self {
            points: points.to_vec(),
            chol,
            alpha,
            y_mean,
            y_scale,
            length_scale,
        })
    }

    /// Posterior mean and standard deviation at `x`
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star: Vec<f64> = self.points.iter().map(|p| rbf(p, x, self.length_scale)).collect();
        let mean_std: f64 = k_star.iter().zip(&self.alpha).map(|(k, a)| k * a).sum();
        let v = solve_lower(&self.chol, &k_star);
        let variance = (1.0 - v.iter().map(|x| x * x).sum::<f64>()).max(1e-12);

        (mean_std * self.y_scale + self.y_mean, variance.sqrt() * self.y_scale)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Expected improvement below `best` for a minimization problem
pub fn expected_improvement(mean: f64, std_dev: f64, best: f64, xi: f64) -> f64 {
    let improvement = best - mean - xi;
    if std_dev <= 1e-12 {
        return improvement.max(0.0);
    }
    let z = improvement / std_dev;
    improvement * normal_cdf(z) + std_dev * normal_pdf(z)
}

fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-sq / (2.0 * length_scale * length_scale)).exp()
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz and Stegun 7.1.26, max error 1.5e-7
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t * (0.254829592 + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

fn cholesky_with_jitter(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    if let Some(l) = cholesky(matrix) {
        return Ok(l);
    }
    for jitter in JITTER_STEPS {
        let mut adjusted = matrix.to_vec();
        for (i, row) in adjusted.iter_mut().enumerate() {
            row[i] += jitter;
        }
        if let Some(l) = cholesky(&adjusted) {
            return Ok(l);
        }
    }
    Err(AppError::search("Kernel matrix is not positive definite"))
}

fn cholesky(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let diag = matrix[i][i] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[i][j] = diag.sqrt();
            } else {
                l[i][j] = (matrix[i][j] - sum) / l[j][j];
            }
        }
    }
    Some(l)
}

/// Solve L x = b
fn solve_lower(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|k| l[i][k] * x[k]).sum();
        x[i] = (b[i] - sum) / l[i][i];
    }
    x
}

/// Solve L^T x = b
fn solve_upper_transposed(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (b[i] - sum) / l[i][i];
    }
    x
}
