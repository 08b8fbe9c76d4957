//! Rank-deficiency detection and the column permutation that isolates
//! dependent columns at the end of a design matrix.

use biobin_linalg::decomposition::{LinalgError, RightSingular};
use biobin_linalg::DenseMatrix;

/// Singular values below this fraction of the largest are treated as zero.
pub const RANK_TOLERANCE: f64 = f32::EPSILON as f64;

/// Tolerance when comparing singular-vector coefficient magnitudes.
const TIE_TOLERANCE: f64 = 1e-9;

/// Columns of `x` that are linearly dependent on the others, in the order
/// they were detected.
///
/// Columns are scaled to unit norm first so the test does not depend on
/// covariate units. For each negligible singular value, the not yet
/// marked column with the largest |coefficient| in the matching right
/// singular vector is marked; near-ties go to the higher column index.
pub fn detect_collinear(x: &DenseMatrix) -> Result<Vec<usize>, LinalgError> {
    let p = x.ncols();
    if p == 0 {
        return Ok(Vec::new());
    }
    let norms: Vec<f64> = (0..p)
        .map(|j| {
            let c = x.col(j);
            let n = DenseMatrix::dot(&c, &c).sqrt();
            if n > 0.0 {
                1.0 / n
            } else {
                1.0
            }
        })
        .collect();
    let svd = RightSingular::new(&x.scale_columns(&norms))?;
    let s_max = svd.values.first().copied().unwrap_or(0.0);
    let threshold = RANK_TOLERANCE * s_max.max(f64::MIN_POSITIVE);

    let mut marked: Vec<usize> = Vec::new();
    // Values are descending; walk from the smallest up.
    for k in (0..p).rev() {
        if svd.values[k] >= threshold {
            break;
        }
        let best = (0..p)
            .filter(|j| !marked.contains(j))
            .map(|j| svd.v.get(j, k).abs())
            .fold(0.0_f64, f64::max);
        let pick = (0..p)
            .rev()
            .filter(|j| !marked.contains(j))
            .find(|&j| svd.v.get(j, k).abs() >= best - TIE_TOLERANCE);
        if let Some(j) = pick {
            marked.push(j);
        }
    }
    Ok(marked)
}

/// Column order that moves dropped columns to the end.
///
/// The i-th dropped column is swapped into position `n - 1 - i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPermutation {
    order: Vec<usize>,
    n_dropped: usize,
}

impl ColumnPermutation {
    pub fn new(n_cols: usize, dropped: &[usize]) -> Self {
        let mut order: Vec<usize> = (0..n_cols).collect();
        for (i, &d) in dropped.iter().enumerate() {
            if let Some(pos) = order.iter().position(|&c| c == d) {
                order.swap(pos, n_cols - 1 - i);
            }
        }
        Self {
            order,
            n_dropped: dropped.len(),
        }
    }

    /// Original column index at each permuted position.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Original indices of the retained columns, in permuted order.
    pub fn kept(&self) -> &[usize] {
        &self.order[..self.order.len() - self.n_dropped]
    }

    pub fn rank(&self) -> usize {
        self.order.len() - self.n_dropped
    }

    /// Reorder the columns of `x`.
    pub fn apply(&self, x: &DenseMatrix) -> DenseMatrix {
        x.select_columns(&self.order)
    }

    /// Map coefficients of the retained columns back to original order.
    /// Dropped columns get NaN.
    pub fn unpermute_coefficients(&self, reduced: &[f64]) -> Vec<f64> {
        assert_eq!(reduced.len(), self.rank());
        let mut out = vec![f64::NAN; self.order.len()];
        for (pos, &col) in self.kept().iter().enumerate() {
            out[col] = reduced[pos];
        }
        out
    }

    /// Map a covariance of the retained columns back to original order,
    /// rows and columns alike. Dropped rows and columns are zero.
    pub fn unpermute_covariance(&self, reduced: &DenseMatrix) -> DenseMatrix {
        let n = self.order.len();
        let kept = self.kept();
        assert_eq!(reduced.nrows(), kept.len());
        let mut out = DenseMatrix::zeros(n, n);
        for (a, &ra) in kept.iter().enumerate() {
            for (b, &rb) in kept.iter().enumerate() {
                out.set(ra, rb, reduced.get(a, b));
            }
        }
        out
    }
}
