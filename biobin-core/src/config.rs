//! Analysis configuration.
//!
//! Built once before any computation and passed by reference to the
//! store, the bin hierarchy and each test. `validate` reports every
//! fatal configuration problem up front.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use biobin_geno::{PhenotypeConfig, StoreConfig};

use crate::assoc::TestKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Pathway, gene and intergenic binning are all disabled; no bins can be built")]
    NoBinningStrategy,

    #[error("Unknown test '{0}'")]
    UnknownTest(String),

    #[error("No tests selected")]
    NoTests,

    #[error("Invalid MAF range [{min}, {max}]")]
    InvalidMafRange { min: f64, max: f64 },

    #[error("Intergenic window width and step must be positive (width {width}, step {step})")]
    InvalidWindow { width: u64, step: u64 },

    #[error("Thread count must be at least 1")]
    ZeroThreads,

    #[error("Minimum control fraction {0} is outside [0, 1]")]
    InvalidControlFraction(f64),
}

/// How loci are grouped into bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinConfig {
    /// Lower bound on overall MAF for a locus to be binned.
    pub min_maf: f64,
    /// Upper bound on overall MAF for a locus to be binned.
    pub max_maf: f64,
    /// Nodes with more loci than this are split into their children.
    pub expand_threshold: usize,
    /// Bins with fewer loci than this are dropped.
    pub min_bin_size: usize,
    pub use_pathways: bool,
    pub expand_by_genes: bool,
    pub include_intergenic: bool,
    pub intergenic_width: u64,
    pub intergenic_step: u64,
}

impl Default for BinConfig {
    fn default() -> Self {
        Self {
            min_maf: 0.0,
            max_maf: 0.05,
            expand_threshold: 50,
            min_bin_size: 1,
            use_pathways: true,
            expand_by_genes: true,
            include_intergenic: true,
            intergenic_width: 50_000,
            intergenic_step: 50_000,
        }
    }
}

impl BinConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.use_pathways || self.expand_by_genes || self.include_intergenic) {
            return Err(ConfigError::NoBinningStrategy);
        }
        if !(0.0..=0.5).contains(&self.min_maf)
            || !(0.0..=0.5).contains(&self.max_maf)
            || self.min_maf > self.max_maf
        {
            return Err(ConfigError::InvalidMafRange {
                min: self.min_maf,
                max: self.max_maf,
            });
        }
        if self.include_intergenic && (self.intergenic_width == 0 || self.intergenic_step == 0) {
            return Err(ConfigError::InvalidWindow {
                width: self.intergenic_width,
                step: self.intergenic_step,
            });
        }
        Ok(())
    }
}

/// Everything a run needs, in one immutable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub store: StoreConfig,
    pub bins: BinConfig,
    pub phenotype: PhenotypeConfig,
    /// Test names, looked up in the test registry.
    pub tests: Vec<String>,
    pub n_threads: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            bins: BinConfig::default(),
            phenotype: PhenotypeConfig::default(),
            tests: vec!["wilcoxon".to_string()],
            n_threads: 1,
        }
    }
}

impl AnalysisConfig {
    /// Check every setting and resolve the selected tests.
    pub fn validate(&self) -> Result<Vec<TestKind>, ConfigError> {
        self.bins.validate()?;
        if self.n_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        let frac = self.phenotype.min_control_fraction;
        if !(0.0..=1.0).contains(&frac) {
            return Err(ConfigError::InvalidControlFraction(frac));
        }
        if self.tests.is_empty() {
            return Err(ConfigError::NoTests);
        }
        self.tests.iter().map(|t| t.parse::<TestKind>()).collect()
    }
}
