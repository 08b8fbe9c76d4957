//! Least-squares and IRLS fits on a full-rank design.

use biobin_linalg::decomposition::{inverse_spd, solve_spd, QrDecomp};
use biobin_linalg::{DenseMatrix, LinalgError};
use tracing::debug;

use super::collinear::{detect_collinear, ColumnPermutation};
use super::link::{Family, LinkFunction, LogitLink};
use super::RegressionResult;

/// IRLS iteration cap.
pub const MAX_IRLS_ITER: usize = 30;
/// Relative deviance change below which IRLS stops.
pub const IRLS_TOL: f64 = 1e-8;

/// Fit `y ~ x` for the given family.
///
/// Collinear columns are detected and moved out of the way; the reduced
/// full-rank design is fitted and the result mapped back to the input
/// column order.
pub fn fit(x: &DenseMatrix, y: &[f64], family: Family) -> Result<RegressionResult, LinalgError> {
    if x.nrows() != y.len() {
        return Err(LinalgError::DimensionMismatch {
            expected: x.nrows(),
            got: y.len(),
        });
    }
    let dropped = detect_collinear(x)?;
    if !dropped.is_empty() {
        debug!("Dropping collinear columns {:?}", dropped);
    }
    let perm = ColumnPermutation::new(x.ncols(), &dropped);
    Ok(fit_permuted(x, y, family, &perm))
}

/// Fit the retained columns of `perm` and un-permute the result.
pub fn fit_permuted(
    x: &DenseMatrix,
    y: &[f64],
    family: Family,
    perm: &ColumnPermutation,
) -> RegressionResult {
    let reduced = x.select_columns(perm.kept());
    let raw = match family {
        Family::Gaussian => fit_linear(&reduced, y),
        Family::Binomial => fit_logistic(&reduced, y),
    };
    let dropped: Vec<usize> = perm.order()[perm.rank()..].to_vec();
    RegressionResult {
        family,
        coefficients: perm.unpermute_coefficients(&raw.beta),
        covariance: perm.unpermute_covariance(&raw.cov),
        fitted: raw.fitted,
        residuals: raw.residuals,
        deviance: raw.deviance,
        iterations: raw.iterations,
        converged: raw.converged,
        dropped,
        rank: perm.rank(),
    }
}

struct RawFit {
    beta: Vec<f64>,
    cov: DenseMatrix,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    deviance: f64,
    iterations: usize,
    converged: bool,
}

impl RawFit {
    fn failed(x: &DenseMatrix, y: &[f64]) -> Self {
        let p = x.ncols();
        Self {
            beta: vec![f64::NAN; p],
            cov: DenseMatrix::zeros(p, p),
            fitted: vec![f64::NAN; y.len()],
            residuals: vec![f64::NAN; y.len()],
            deviance: f64::NAN,
            iterations: 0,
            converged: false,
        }
    }
}

fn fit_linear(x: &DenseMatrix, y: &[f64]) -> RawFit {
    let n = x.nrows();
    let p = x.ncols();
    let qr = match QrDecomp::new(x) {
        Ok(qr) => qr,
        Err(e) => {
            debug!("QR failed: {}", e);
            return RawFit::failed(x, y);
        }
    };
    let beta = qr.solve(y);
    let fitted = x.mat_vec(&beta);
    let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| a - b).collect();
    let rss = DenseMatrix::dot(&residuals, &residuals);
    let sigma2 = if n > p { rss / (n - p) as f64 } else { f64::NAN };
    let cov = qr.unscaled_covariance().scale(sigma2);
    let converged = beta.iter().all(|b| b.is_finite());
    RawFit {
        beta,
        cov,
        fitted,
        residuals,
        deviance: rss,
        iterations: 1,
        converged,
    }
}

fn binomial_deviance(y: &[f64], mu: &[f64]) -> f64 {
    let term = |obs: f64, m: f64| if obs > 0.0 { obs * (obs / m).ln() } else { 0.0 };
    2.0 * y
        .iter()
        .zip(mu)
        .map(|(&yi, &mi)| term(yi, mi) + term(1.0 - yi, 1.0 - mi))
        .sum::<f64>()
}

fn fit_logistic(x: &DenseMatrix, y: &[f64]) -> RawFit {
    let link = LogitLink;
    let n = y.len();
    let ybar = y.iter().sum::<f64>() / n.max(1) as f64;

    // Start at the intercept-only fit, i.e. beta = 0 with eta = logit(ybar).
    let start = link.link(ybar.clamp(f64::EPSILON, 1.0 - f64::EPSILON));
    let mut eta = vec![start; n];
    let mut mu: Vec<f64> = eta.iter().map(|&e| link.inv_link(e)).collect();
    let mut beta = vec![0.0; x.ncols()];
    let mut dev = binomial_deviance(y, &mu);
    let mut converged = false;
    let mut iterations = 0;

    while iterations < MAX_IRLS_ITER {
        iterations += 1;
        let w: Vec<f64> = mu.iter().map(|&m| link.variance(m)).collect();
        let z: Vec<f64> = (0..n).map(|i| eta[i] + (y[i] - mu[i]) / w[i]).collect();
        let xtwx = x.xtwx(&w);
        let xtwz = x.xtwv(&w, &z);
        beta = match solve_spd(&xtwx, &xtwz) {
            Ok(b) => b,
            Err(e) => {
                debug!("IRLS step {} failed: {}", iterations, e);
                break;
            }
        };
        if beta.iter().any(|b| !b.is_finite()) {
            break;
        }
        eta = x.mat_vec(&beta);
        mu = eta.iter().map(|&e| link.inv_link(e)).collect();
        let new_dev = binomial_deviance(y, &mu);
        if !new_dev.is_finite() {
            break;
        }
        let delta = (new_dev - dev).abs();
        dev = new_dev;
        if delta < IRLS_TOL * (dev.abs() + 0.1) {
            converged = true;
            break;
        }
    }

    if !converged {
        debug!("IRLS stopped after {} iterations without converging", iterations);
    }

    let w: Vec<f64> = mu.iter().map(|&m| link.variance(m)).collect();
    let cov = match inverse_spd(&x.xtwx(&w)) {
        Ok(c) => c,
        Err(_) => {
            converged = false;
            DenseMatrix::zeros(x.ncols(), x.ncols())
        }
    };
    let residuals: Vec<f64> = y.iter().zip(&mu).map(|(a, b)| a - b).collect();
    RawFit {
        beta,
        cov,
        fitted: mu,
        residuals,
        deviance: dev,
        iterations,
        converged,
    }
}
