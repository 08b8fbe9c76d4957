//! SKAT tests for quantitative and case/control traits.

use crate::bins::Bin;
use crate::kernel::KernelTestEngine;
use crate::regression::{Family, RegressionEngine};

use super::{AssocTest, TestContext, TestKind};

pub struct SkatTest {
    kind: TestKind,
    /// Supplies the null model; its burden tests are never prepared.
    regression: RegressionEngine,
    engine: KernelTestEngine,
}

impl SkatTest {
    fn with_family(kind: TestKind, family: Family) -> Self {
        Self {
            kind,
            regression: RegressionEngine::new(family),
            engine: KernelTestEngine::new(family),
        }
    }

    pub fn linear() -> Self {
        Self::with_family(TestKind::SkatLinear, Family::Gaussian)
    }

    pub fn logistic() -> Self {
        Self::with_family(TestKind::SkatLogistic, Family::Binomial)
    }

    pub fn engine(&self) -> &KernelTestEngine {
        &self.engine
    }
}

impl AssocTest for SkatTest {
    fn name(&self) -> &'static str {
        self.kind.key()
    }

    fn init(&mut self, ctx: &TestContext<'_>) {
        self.regression.fit_null(ctx.phenotype, ctx.covariates);
        self.engine.init(ctx.phenotype, self.regression.null_model());
    }

    fn run_test(&self, ctx: &TestContext<'_>, bin: &Bin) -> f64 {
        self.engine.run_test(ctx.store, ctx.phenotype, bin.loci())
    }
}
