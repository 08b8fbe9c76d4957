//! Burden regression: one null model per phenotype, one refit per bin.

use std::sync::Arc;

use tracing::{debug, warn};

use biobin_geno::{GenotypeStore, LocusId, Phenotype, TraitTable};
use biobin_linalg::DenseMatrix;

use super::fit::fit;
use super::link::Family;
use super::null_model::NullModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotSetUp,
    /// Null model available; burden tests not yet prepared.
    NullFitted,
    Ready,
    /// Every test of the phenotype reports 1.
    Failed,
}

/// Regression of the outcome on covariates plus the weighted bin burden.
#[derive(Debug, Clone)]
pub struct RegressionEngine {
    family: Family,
    state: EngineState,
    null: Option<Arc<NullModel>>,
    /// Null design with a trailing burden column.
    design: Option<DenseMatrix>,
}

impl RegressionEngine {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            state: EngineState::NotSetUp,
            null: None,
            design: None,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The fitted null model, shared with kernel tests of the same phenotype.
    pub fn null_model(&self) -> Option<Arc<NullModel>> {
        self.null.clone()
    }

    /// Fit the null model and prepare burden tests for `pheno`.
    pub fn setup(&mut self, pheno: &Phenotype, covariates: Option<&TraitTable>) -> EngineState {
        self.fit_null(pheno, covariates);
        self.prepare()
    }

    /// Fit only the null model for `pheno`. Replaces any previous setup.
    pub fn fit_null(&mut self, pheno: &Phenotype, covariates: Option<&TraitTable>) -> EngineState {
        self.null = None;
        self.design = None;
        self.state = match NullModel::fit(self.family, pheno, covariates) {
            Ok(null) => {
                self.null = Some(Arc::new(null));
                EngineState::NullFitted
            }
            Err(e) => {
                warn!(
                    "Phenotype '{}': {} regression will report p = 1 for every bin: {}",
                    pheno.name,
                    family_label(self.family),
                    e
                );
                EngineState::Failed
            }
        };
        self.state
    }

    /// Build the burden design from the null model. Only moves a
    /// `NullFitted` engine forward.
    pub fn prepare(&mut self) -> EngineState {
        if self.state != EngineState::NullFitted {
            return self.state;
        }
        let Some(null) = &self.null else {
            return self.state;
        };
        let n = null.n_samples();
        let p = null.x.ncols();
        let mut design = DenseMatrix::zeros(n, p + 1);
        for j in 0..p {
            design.set_col(j, &null.x.col(j));
        }
        self.design = Some(design);
        self.state = EngineState::Ready;
        self.state
    }

    /// Wald p-value of the burden of `loci`, or 1 when it is not estimable.
    pub fn run_test(&self, store: &GenotypeStore, pheno: &Phenotype, loci: &[LocusId]) -> f64 {
        let (Some(null), Some(template)) = (&self.null, &self.design) else {
            return 1.0;
        };
        if self.state != EngineState::Ready {
            return 1.0;
        }

        let burden = store.burden(loci, pheno, &null.included);
        let last = template.ncols() - 1;
        let mut x = template.clone();
        x.set_col(last, &burden);

        let result = match fit(&x, &null.y, self.family) {
            Ok(r) => r,
            Err(e) => {
                warn!("Phenotype '{}': burden fit failed: {}", pheno.name, e);
                return 1.0;
            }
        };
        if !result.converged {
            warn!(
                "Phenotype '{}': burden fit did not converge after {} iterations",
                pheno.name, result.iterations
            );
            return 1.0;
        }
        if result.coefficients[last].is_nan() {
            warn!(
                "Phenotype '{}': burden is not estimable (collinear with covariates)",
                pheno.name
            );
            return 1.0;
        }
        let p = result.wald_p_value(last);
        debug!(
            "beta = {:.4}, se = {:.4}, p = {:.4e}",
            result.coefficients[last],
            result.std_error(last),
            p
        );
        p
    }
}

fn family_label(family: Family) -> &'static str {
    match family {
        Family::Gaussian => "linear",
        Family::Binomial => "logistic",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biobin_geno::{Call, MemorySource, PhenotypeConfig, PhenotypeSet, StoreConfig};
    use biobin_geno::{Locus, LocusRecord};

    fn store_with(calls: Vec<Vec<Call>>) -> GenotypeStore {
        let n = calls[0].len();
        let samples = (0..n).map(|i| format!("s{}", i)).collect();
        let records = calls
            .into_iter()
            .enumerate()
            .map(|(k, calls)| LocusRecord {
                locus: Locus::new("1", 1000 + k as u64, format!("rs{}", k)),
                calls,
            })
            .collect();
        let mut src = MemorySource::new(samples, records);
        GenotypeStore::load(&mut src, StoreConfig::default(), None).unwrap()
    }

    fn pheno(values: &[f64]) -> Phenotype {
        let traits = TraitTable::new(
            vec!["y".into()],
            values.iter().map(|&v| vec![v]).collect(),
        )
        .unwrap();
        PhenotypeSet::from_traits(&traits, &PhenotypeConfig::default(), 0.5, false)
            .phenotypes
            .remove(0)
    }

    #[test]
    fn test_failed_engine_reports_one() {
        let store = store_with(vec![vec![Call::new(0, 0), Call::new(0, 1), Call::new(0, 0)]]);
        let p = pheno(&[0.0, 0.0, 0.0]);
        let mut engine = RegressionEngine::new(Family::Binomial);
        assert_eq!(engine.state(), EngineState::NotSetUp);
        assert_eq!(engine.setup(&p, None), EngineState::Failed);
        assert_eq!(engine.run_test(&store, &p, &[LocusId(0)]), 1.0);
    }

    #[test]
    fn test_null_fitted_until_prepared() {
        let calls = vec![Call::new(0, 0), Call::new(0, 1), Call::new(0, 0), Call::new(0, 0)];
        let store = store_with(vec![calls]);
        let p = pheno(&[0.1, 0.7, 1.5, 2.0]);
        let mut engine = RegressionEngine::new(Family::Gaussian);
        assert_eq!(engine.fit_null(&p, None), EngineState::NullFitted);
        assert!(engine.null_model().is_some());
        assert_eq!(engine.run_test(&store, &p, &[LocusId(0)]), 1.0);

        assert_eq!(engine.prepare(), EngineState::Ready);
        assert_eq!(engine.prepare(), EngineState::Ready);
        assert!(engine.run_test(&store, &p, &[LocusId(0)]) < 1.0);
    }

    #[test]
    fn test_prepare_without_null_is_noop() {
        let mut engine = RegressionEngine::new(Family::Binomial);
        assert_eq!(engine.prepare(), EngineState::NotSetUp);

        let p = pheno(&[0.0, 0.0, 0.0]);
        assert_eq!(engine.fit_null(&p, None), EngineState::Failed);
        assert!(engine.null_model().is_none());
        assert_eq!(engine.prepare(), EngineState::Failed);
    }

    #[test]
    fn test_linear_burden_signal() {
        // Carriers of the minor allele have a higher trait value.
        let n = 30;
        let calls: Vec<Call> = (0..n)
            .map(|i| if i % 3 == 0 { Call::new(0, 1) } else { Call::new(0, 0) })
            .collect();
        let store = store_with(vec![calls]);
        let values: Vec<f64> = (0..n)
            .map(|i| if i % 3 == 0 { 5.0 + (i % 4) as f64 * 0.1 } else { 1.0 + (i % 5) as f64 * 0.1 })
            .collect();
        let p = pheno(&values);
        let mut engine = RegressionEngine::new(Family::Gaussian);
        assert_eq!(engine.setup(&p, None), EngineState::Ready);
        let pval = engine.run_test(&store, &p, &[LocusId(0)]);
        assert!(pval < 1e-6, "p = {}", pval);
    }

    #[test]
    fn test_empty_burden_not_estimable() {
        let calls = vec![Call::new(0, 0), Call::new(0, 1), Call::new(0, 0), Call::new(0, 0)];
        let store = store_with(vec![calls]);
        let p = pheno(&[0.1, 0.7, 1.5, 2.0]);
        let mut engine = RegressionEngine::new(Family::Gaussian);
        engine.setup(&p, None);
        // No loci: the burden column is all zero.
        assert_eq!(engine.run_test(&store, &p, &[]), 1.0);
    }
}
