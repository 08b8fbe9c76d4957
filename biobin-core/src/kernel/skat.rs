//! SKAT: weighted linear-kernel variance-component test.
//!
//! Q = r' G W G' r / 2 (scaled by the residual variance for quantitative
//! traits) is compared to the mixture of chi-squared variables given by
//! the eigenvalues of the projected kernel, using Davies' method.

use std::sync::Arc;

use tracing::{debug, warn};

use biobin_geno::{GenotypeStore, LocusId, Phenotype};
use biobin_linalg::decomposition::{symmetric_eigenvalues, CholeskyDecomp};
use biobin_linalg::DenseMatrix;

use super::davies::{chisq_mixture_upper, DaviesFault};
use crate::regression::{EngineState, Family, NullModel};

/// Largest fraction of missing calls a locus may have and still be used.
pub const MAX_MISSING_FRACTION: f64 = 0.15;
/// Entries and eigenvalues below this are treated as zero.
const KERNEL_EPS: f64 = f32::EPSILON as f64;
const DAVIES_LIMIT: usize = 10_000;
const DAVIES_ACC: f64 = 1e-6;

/// Genotype matrix of a bin, restricted to usable loci.
#[derive(Debug)]
pub struct BinGenotypes {
    /// Included samples x kept loci, missing calls imputed.
    pub g: DenseMatrix,
    pub loci: Vec<LocusId>,
    pub weights: Vec<f64>,
}

/// Build the imputed genotype matrix of `loci` over `samples`.
///
/// A locus is skipped when more than [`MAX_MISSING_FRACTION`] of its calls
/// are missing or when it shows fewer than two distinct genotypes.
/// Returns `None` when no locus survives.
pub fn bin_genotypes(
    store: &GenotypeStore,
    pheno: &Phenotype,
    loci: &[LocusId],
    samples: &[usize],
) -> Option<BinGenotypes> {
    let n = samples.len();
    let max_missing = MAX_MISSING_FRACTION * n as f64;
    let mut columns = Vec::new();
    let mut kept = Vec::new();
    let mut weights = Vec::new();

    for &id in loci {
        let Some(avg) = store.average_genotype(id, samples) else {
            continue;
        };
        let mut missing = 0usize;
        let mut seen = 0u8;
        let col: Vec<f64> = samples
            .iter()
            .map(|&i| match store.individual_genotype(id, i) {
                Some(g) => {
                    seen |= 1 << g;
                    f64::from(g)
                }
                None => {
                    missing += 1;
                    avg
                }
            })
            .collect();
        if missing as f64 > max_missing || seen.count_ones() < 2 {
            debug!("Skipping locus {} in kernel test", store.locus(id));
            continue;
        }
        columns.push(col);
        kept.push(id);
        weights.push(store.locus_weight(id, pheno));
    }

    if kept.is_empty() {
        return None;
    }
    Some(BinGenotypes {
        g: DenseMatrix::from_columns(n, &columns),
        loci: kept,
        weights,
    })
}

/// Kernel association test against a fitted null model.
#[derive(Debug)]
pub struct KernelTestEngine {
    family: Family,
    state: EngineState,
    null: Option<Arc<NullModel>>,
    /// Diagonal of V.
    v: Vec<f64>,
    /// Residual variance (Gaussian only).
    sigma2: f64,
    xvx: Option<CholeskyDecomp>,
}

impl KernelTestEngine {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            state: EngineState::NotSetUp,
            null: None,
            v: Vec::new(),
            sigma2: f64::NAN,
            xvx: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Cache V and the factorization of X'VX from the phenotype's null
    /// model. A missing null model, or one of another family, leaves the
    /// engine `Failed`.
    pub fn init(&mut self, pheno: &Phenotype, null: Option<Arc<NullModel>>) -> EngineState {
        self.null = None;
        self.xvx = None;
        self.state = EngineState::Failed;

        let Some(null) = null else {
            warn!(
                "Phenotype '{}': no null model, SKAT will report p = 1 for every bin",
                pheno.name
            );
            return self.state;
        };
        if null.family != self.family {
            warn!(
                "Phenotype '{}': null model is {:?}, SKAT needs {:?}",
                pheno.name, null.family, self.family
            );
            return self.state;
        }

        self.v = null.variance_weights();
        self.sigma2 = null.residual_variance();
        if self.family == Family::Gaussian && !(self.sigma2 > 0.0) {
            warn!(
                "Phenotype '{}': residual variance is {}, SKAT disabled",
                pheno.name, self.sigma2
            );
            return self.state;
        }
        match CholeskyDecomp::new(&null.x.xtwx(&self.v)) {
            Ok(chol) => self.xvx = Some(chol),
            Err(e) => {
                warn!("Phenotype '{}': X'VX is not invertible: {}", pheno.name, e);
                return self.state;
            }
        }
        self.null = Some(null);
        self.state = EngineState::Ready;
        self.state
    }

    /// SKAT p-value of `loci`; 1 when nothing testable remains.
    pub fn run_test(&self, store: &GenotypeStore, pheno: &Phenotype, loci: &[LocusId]) -> f64 {
        let (Some(null), Some(chol)) = (&self.null, &self.xvx) else {
            return 1.0;
        };
        if self.state != EngineState::Ready {
            return 1.0;
        }

        let Some(bg) = bin_genotypes(store, pheno, loci, &null.included) else {
            return 1.0;
        };
        let scale: Vec<f64> = bg.weights.iter().map(|w| w.max(0.0).sqrt()).collect();
        let gw = bg.g.scale_columns(&scale);

        let score = gw.tr_mat_vec(&null.residuals);
        let mut q = 0.5 * DenseMatrix::dot(&score, &score);
        if self.family == Family::Gaussian {
            q /= self.sigma2;
        }

        // W = GW'V GW - GW'V X (X'VX)^-1 X'V GW
        let gvg = gw.xtwx(&self.v);
        let xvg = null.x.xtwz(&self.v, &gw);
        let proj = xvg.transpose().mat_mul(&chol.solve_matrix(&xvg));
        let w = gvg.sub(&proj);

        let keep: Vec<usize> = w
            .abs_col_sums()
            .iter()
            .enumerate()
            .filter(|(_, &s)| s >= KERNEL_EPS)
            .map(|(j, _)| j)
            .collect();
        if keep.is_empty() {
            return 1.0;
        }
        let w = w.select_square(&keep).scale(0.5);

        let lambda: Vec<f64> = match symmetric_eigenvalues(&w) {
            Ok(ev) => ev.into_iter().filter(|&l| l > KERNEL_EPS).collect(),
            Err(e) => {
                warn!("Phenotype '{}': kernel eigen-decomposition failed: {}", pheno.name, e);
                return 1.0;
            }
        };
        if lambda.is_empty() {
            return 1.0;
        }

        let res = chisq_mixture_upper(&lambda, q, DAVIES_LIMIT, DAVIES_ACC);
        if let Some(fault) = res.fault {
            warn!(
                "Phenotype '{}': Davies fault {} ({:?}) at Q = {:.4}",
                pheno.name,
                fault.code(),
                fault,
                q
            );
            if fault != DaviesFault::RoundOff && res.cdf < 0.0 {
                return 1.0;
            }
        }
        if !(0.0..=1.0).contains(&res.cdf) {
            warn!(
                "Phenotype '{}': Davies p-value {} clamped to [0, 1]",
                pheno.name, res.cdf
            );
        }
        let p = res.cdf.clamp(0.0, 1.0);
        debug!("Q = {:.4}, {} eigenvalues, p = {:.4e}", q, lambda.len(), p);
        p
    }
}
