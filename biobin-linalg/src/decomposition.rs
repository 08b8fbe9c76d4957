#![allow(clippy::needless_range_loop)]
//! Matrix decompositions and solvers.
//!
//! Cholesky and QR for full-rank least-squares fits, a faer-backed SVD
//! for rank detection, and the symmetric eigen-decomposition behind the
//! kernel eigenvalues of the variance-component test.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Singular matrix encountered")]
    SingularMatrix,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Matrix contains non-finite entries")]
    NonFinite,
}

/// Cholesky factor L such that A = L * L'.
#[derive(Debug)]
pub struct CholeskyDecomp {
    pub l: DenseMatrix,
}

impl CholeskyDecomp {
    /// Factor a symmetric positive definite matrix.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        if !a.is_finite() {
            return Err(LinalgError::NonFinite);
        }
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let sum: f64 = (0..j).map(|k| l.get(j, k) * l.get(j, k)).sum();
            let diag = a.get(j, j) - sum;
            if diag <= 0.0 {
                return Err(LinalgError::NotPositiveDefinite);
            }
            l.set(j, j, diag.sqrt());

            for i in (j + 1)..n {
                let sum: f64 = (0..j).map(|k| l.get(i, k) * l.get(j, k)).sum();
                l.set(i, j, (a.get(i, j) - sum) / l.get(j, j));
            }
        }

        Ok(CholeskyDecomp { l })
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.l.nrows();
        assert_eq!(b.len(), n);

        let mut y = vec![0.0; n];
        for i in 0..n {
            let sum: f64 = (0..i).map(|j| self.l.get(i, j) * y[j]).sum();
            y[i] = (b[i] - sum) / self.l.get(i, i);
        }

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let sum: f64 = ((i + 1)..n).map(|j| self.l.get(j, i) * x[j]).sum();
            x[i] = (y[i] - sum) / self.l.get(i, i);
        }
        x
    }

    /// Solve A * X = B column by column.
    pub fn solve_matrix(&self, b: &DenseMatrix) -> DenseMatrix {
        let mut out = DenseMatrix::zeros(b.nrows(), b.ncols());
        for j in 0..b.ncols() {
            out.set_col(j, &self.solve(&b.col(j)));
        }
        out
    }

    /// A^{-1} = (L L')^{-1}.
    pub fn inverse(&self) -> DenseMatrix {
        self.solve_matrix(&DenseMatrix::identity(self.l.nrows()))
    }
}

/// Thin QR decomposition A = Q * R by modified Gram-Schmidt.
pub struct QrDecomp {
    pub q: DenseMatrix,
    pub r: DenseMatrix,
}

impl QrDecomp {
    /// Decompose an m x n matrix with m >= n and full column rank.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let m = a.nrows();
        let n = a.ncols();
        if m < n {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: m,
            });
        }
        if !a.is_finite() {
            return Err(LinalgError::NonFinite);
        }

        let mut q = DenseMatrix::zeros(m, n);
        let mut r = DenseMatrix::zeros(n, n);
        let mut cols: Vec<Vec<f64>> = (0..n).map(|j| a.col(j)).collect();
        let scale = cols
            .iter()
            .map(|c| DenseMatrix::dot(c, c).sqrt())
            .fold(0.0_f64, f64::max)
            .max(1.0);

        for j in 0..n {
            for i in 0..j {
                let q_col = q.col(i);
                let rij = DenseMatrix::dot(&q_col, &cols[j]);
                r.set(i, j, rij);
                for k in 0..m {
                    cols[j][k] -= rij * q_col[k];
                }
            }

            let norm = DenseMatrix::dot(&cols[j], &cols[j]).sqrt();
            if norm < 1e-12 * scale {
                return Err(LinalgError::SingularMatrix);
            }
            r.set(j, j, norm);
            for k in 0..m {
                q.set(k, j, cols[j][k] / norm);
            }
        }

        Ok(QrDecomp { q, r })
    }

    /// Least-squares solution of A x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.r.nrows();
        let qtb = self.q.tr_mat_vec(b);

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let sum: f64 = ((i + 1)..n).map(|j| self.r.get(i, j) * x[j]).sum();
            x[i] = (qtb[i] - sum) / self.r.get(i, i);
        }
        x
    }

    /// (A'A)^{-1} = R^{-1} R^{-T}.
    pub fn unscaled_covariance(&self) -> DenseMatrix {
        let n = self.r.nrows();
        let mut r_inv = DenseMatrix::zeros(n, n);
        for j in 0..n {
            // Back-substitute R x = e_j.
            for i in (0..=j).rev() {
                let rhs = if i == j { 1.0 } else { 0.0 };
                let sum: f64 = ((i + 1)..=j).map(|k| self.r.get(i, k) * r_inv.get(k, j)).sum();
                r_inv.set(i, j, (rhs - sum) / self.r.get(i, i));
            }
        }
        r_inv.mat_mul(&r_inv.transpose())
    }
}

/// Eigen-decomposition of a symmetric matrix, eigenvalues descending.
pub struct SymmetricEigen {
    pub values: Vec<f64>,
    /// Eigenvectors as columns, aligned with `values`.
    pub vectors: DenseMatrix,
}

impl SymmetricEigen {
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        if !a.is_finite() {
            return Err(LinalgError::NonFinite);
        }

        let evd = a.as_faer().selfadjoint_eigendecomposition(faer::Side::Lower);
        let s = evd.s();
        let u = evd.u();

        // faer returns ascending order.
        let order: Vec<usize> = (0..n).rev().collect();
        let values: Vec<f64> = order.iter().map(|&k| s.column_vector().read(k)).collect();
        let mut vectors = DenseMatrix::zeros(n, n);
        for (dst, &src) in order.iter().enumerate() {
            for i in 0..n {
                vectors.set(i, dst, u.read(i, src));
            }
        }
        Ok(Self { values, vectors })
    }
}

/// Eigenvalues of a symmetric matrix in descending order.
pub fn symmetric_eigenvalues(a: &DenseMatrix) -> Result<Vec<f64>, LinalgError> {
    Ok(SymmetricEigen::new(a)?.values)
}

/// Singular values and right singular vectors of X, descending.
///
/// Taken from an SVD of X itself rather than from X'X, so small singular
/// values keep their full relative precision. `v` is always p x p; when X
/// has fewer rows than columns the missing singular values are zero.
pub struct RightSingular {
    pub values: Vec<f64>,
    pub v: DenseMatrix,
}

impl RightSingular {
    pub fn new(x: &DenseMatrix) -> Result<Self, LinalgError> {
        if !x.is_finite() {
            return Err(LinalgError::NonFinite);
        }
        let (n, p) = (x.nrows(), x.ncols());
        let k = n.min(p);

        // Thin V is p x k; only a short-wide X needs the full p x p basis.
        let (s, v) = if n >= p {
            let svd = x.as_faer().thin_svd();
            let s: Vec<f64> = (0..k).map(|i| svd.s_diagonal().read(i)).collect();
            (s, svd.v().to_owned())
        } else {
            let svd = x.as_faer().svd();
            let s: Vec<f64> = (0..k).map(|i| svd.s_diagonal().read(i)).collect();
            (s, svd.v().to_owned())
        };

        let mut values: Vec<f64> = s.iter().map(|&sv| sv.max(0.0)).collect();
        values.resize(p, 0.0);
        let mut order: Vec<usize> = (0..p).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));

        let mut sorted = Vec::with_capacity(p);
        let mut vectors = DenseMatrix::zeros(p, p);
        for (dst, &src) in order.iter().enumerate() {
            sorted.push(values[src]);
            for i in 0..p {
                vectors.set(i, dst, v.read(i, src));
            }
        }
        Ok(Self {
            values: sorted,
            v: vectors,
        })
    }
}

/// Solve a symmetric positive definite system A*x = b using Cholesky.
pub fn solve_spd(a: &DenseMatrix, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
    let chol = CholeskyDecomp::new(a)?;
    Ok(chol.solve(b))
}

/// Inverse of a symmetric positive definite matrix.
pub fn inverse_spd(a: &DenseMatrix) -> Result<DenseMatrix, LinalgError> {
    let chol = CholeskyDecomp::new(a)?;
    Ok(chol.inverse())
}
