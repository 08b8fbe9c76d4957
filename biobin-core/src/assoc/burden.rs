//! Linear and logistic burden regression tests.

use crate::bins::Bin;
use crate::regression::{Family, RegressionEngine};

use super::{AssocTest, TestContext, TestKind};

pub struct BurdenRegressionTest {
    kind: TestKind,
    engine: RegressionEngine,
}

impl BurdenRegressionTest {
    pub fn linear() -> Self {
        Self {
            kind: TestKind::Linear,
            engine: RegressionEngine::new(Family::Gaussian),
        }
    }

    pub fn logistic() -> Self {
        Self {
            kind: TestKind::Logistic,
            engine: RegressionEngine::new(Family::Binomial),
        }
    }

    pub fn engine(&self) -> &RegressionEngine {
        &self.engine
    }
}

impl AssocTest for BurdenRegressionTest {
    fn name(&self) -> &'static str {
        self.kind.key()
    }

    fn init(&mut self, ctx: &TestContext<'_>) {
        self.engine.setup(ctx.phenotype, ctx.covariates);
    }

    fn run_test(&self, ctx: &TestContext<'_>, bin: &Bin) -> f64 {
        self.engine.run_test(ctx.store, ctx.phenotype, bin.loci())
    }
}
