//! biobin-core: Binning and association testing for BioBin-RS
//!
//! Collapses rare loci into bins (pathways, genes, intergenic windows),
//! fits per-phenotype null models, and tests every bin with burden
//! regression, SKAT or a rank-sum test.

pub mod assoc;
pub mod bins;
pub mod config;
pub mod kernel;
pub mod regression;
pub mod report;
pub mod runner;

pub use assoc::{AssocTest, TestContext, TestKind, TestRegistry};
pub use bins::{Bin, BinHierarchy, BinId, BinKind};
pub use config::{AnalysisConfig, BinConfig, ConfigError};
pub use runner::{Outputs, PhenotypeRunner};
