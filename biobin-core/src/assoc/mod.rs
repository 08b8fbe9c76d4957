//! Association tests and the registry that builds them by name.
//!
//! Every test follows the same lifecycle per phenotype: `init` once with
//! the phenotype and covariates, then `run_test` for each bin. A test
//! whose `init` failed reports 1 for every bin.

pub mod burden;
pub mod kernel;
pub mod wilcoxon;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use biobin_geno::{GenotypeStore, Phenotype, TraitTable};

use crate::bins::{Bin, BinHierarchy};
use crate::config::ConfigError;

pub use burden::BurdenRegressionTest;
pub use kernel::SkatTest;
pub use wilcoxon::{rank_sum_p_value, WilcoxonTest};

/// Shared, read-only inputs of one phenotype's tests.
#[derive(Debug, Clone, Copy)]
pub struct TestContext<'a> {
    pub store: &'a GenotypeStore,
    pub phenotype: &'a Phenotype,
    pub covariates: Option<&'a TraitTable>,
}

/// A per-bin association test.
pub trait AssocTest: Send {
    /// Registry key of the test.
    fn name(&self) -> &'static str;

    /// Prepare for the phenotype of `ctx`. Failures are logged and make
    /// every later `run_test` return 1.
    fn init(&mut self, ctx: &TestContext<'_>);

    /// p-value of `bin`.
    fn run_test(&self, ctx: &TestContext<'_>, bin: &Bin) -> f64;

    /// p-values of every bin, in bin order.
    fn run_all(&self, ctx: &TestContext<'_>, bins: &BinHierarchy) -> Vec<f64> {
        bins.bins().iter().map(|b| self.run_test(ctx, b)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TestKind {
    Linear,
    Logistic,
    SkatLinear,
    SkatLogistic,
    Wilcoxon,
}

impl TestKind {
    pub const ALL: [TestKind; 5] = [
        TestKind::Linear,
        TestKind::Logistic,
        TestKind::SkatLinear,
        TestKind::SkatLogistic,
        TestKind::Wilcoxon,
    ];

    pub fn key(self) -> &'static str {
        match self {
            TestKind::Linear => "linear",
            TestKind::Logistic => "logistic",
            TestKind::SkatLinear => "SKAT-linear",
            TestKind::SkatLogistic => "SKAT-logistic",
            TestKind::Wilcoxon => "wilcoxon",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            TestKind::Linear => "Wald test of the bin burden in a linear regression",
            TestKind::Logistic => "Wald test of the bin burden in a logistic regression",
            TestKind::SkatLinear => "SKAT variance-component test, quantitative trait",
            TestKind::SkatLogistic => "SKAT variance-component test, case/control",
            TestKind::Wilcoxon => "Rank-sum test of bin burden, cases vs controls",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for TestKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestKind::ALL
            .into_iter()
            .find(|k| k.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownTest(s.to_string()))
    }
}

type Factory = fn() -> Box<dyn AssocTest>;

/// Name to constructor lookup for association tests.
pub struct TestRegistry {
    factories: BTreeMap<TestKind, Factory>,
}

impl TestRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, kind: TestKind, factory: Factory) {
        self.factories.insert(kind, factory);
    }

    pub fn kinds(&self) -> impl Iterator<Item = TestKind> + '_ {
        self.factories.keys().copied()
    }

    pub fn create_kind(&self, kind: TestKind) -> Result<Box<dyn AssocTest>, ConfigError> {
        self.factories
            .get(&kind)
            .map(|f| f())
            .ok_or_else(|| ConfigError::UnknownTest(kind.key().to_string()))
    }

    /// Build a test from its (case-insensitive) name.
    pub fn create(&self, name: &str) -> Result<Box<dyn AssocTest>, ConfigError> {
        self.create_kind(name.parse()?)
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.register(TestKind::Linear, || Box::new(BurdenRegressionTest::linear()));
        reg.register(TestKind::Logistic, || Box::new(BurdenRegressionTest::logistic()));
        reg.register(TestKind::SkatLinear, || Box::new(SkatTest::linear()));
        reg.register(TestKind::SkatLogistic, || Box::new(SkatTest::logistic()));
        reg.register(TestKind::Wilcoxon, || Box::new(WilcoxonTest::new()));
        reg
    }
}
