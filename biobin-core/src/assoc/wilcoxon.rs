//! Wilcoxon rank-sum test of per-sample bin burden, cases vs controls.

use statrs::distribution::{ContinuousCDF, Normal};
use tracing::warn;

use crate::bins::Bin;

use super::{AssocTest, TestContext, TestKind};

/// Mid-ranks (1-based) of `values`, and the tie correction sum(t^3 - t).
fn mid_ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut ties = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j + 1) as f64 / 2.0;
        for &k in &order[i..j] {
            ranks[k] = rank;
        }
        let t = (j - i) as f64;
        ties += t * t * t - t;
        i = j;
    }
    (ranks, ties)
}

/// Two-sided normal-approximation p-value of the rank-sum statistic.
///
/// Returns 1 when either group is empty or every value is tied.
pub fn rank_sum_p_value(controls: &[f64], cases: &[f64]) -> f64 {
    let n0 = controls.len() as f64;
    let n1 = cases.len() as f64;
    if controls.is_empty() || cases.is_empty() {
        return 1.0;
    }
    let n = n0 + n1;
    let all: Vec<f64> = cases.iter().chain(controls).copied().collect();
    let (ranks, ties) = mid_ranks(&all);
    let w: f64 = ranks[..cases.len()].iter().sum();

    let mean = n1 * (n + 1.0) / 2.0;
    let var = n0 * n1 / 12.0 * ((n + 1.0) - ties / (n * (n - 1.0)));
    if !(var > 0.0) {
        return 1.0;
    }
    let z = (w - mean) / var.sqrt();
    match Normal::new(0.0, 1.0) {
        Ok(d) => (2.0 * d.cdf(-z.abs())).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

pub struct WilcoxonTest {
    controls: Vec<usize>,
    cases: Vec<usize>,
}

impl WilcoxonTest {
    pub fn new() -> Self {
        Self {
            controls: Vec::new(),
            cases: Vec::new(),
        }
    }
}

impl Default for WilcoxonTest {
    fn default() -> Self {
        Self::new()
    }
}

impl AssocTest for WilcoxonTest {
    fn name(&self) -> &'static str {
        TestKind::Wilcoxon.key()
    }

    fn init(&mut self, ctx: &TestContext<'_>) {
        if ctx.covariates.is_some_and(|c| c.n_columns() > 0) {
            warn!(
                "Phenotype '{}': the Wilcoxon rank-sum test ignores covariates",
                ctx.phenotype.name
            );
        }
        self.controls = ctx.phenotype.controls.iter().collect();
        self.cases = ctx.phenotype.cases.iter().collect();
    }

    fn run_test(&self, ctx: &TestContext<'_>, bin: &Bin) -> f64 {
        let controls = ctx.store.burden(bin.loci(), ctx.phenotype, &self.controls);
        let cases = ctx.store.burden(bin.loci(), ctx.phenotype, &self.cases);
        rank_sum_p_value(&controls, &cases)
    }
}
