//! biobin-geno: Genotype storage for BioBin-RS
//!
//! Encodes every sample's call at every locus as two bit-vectors,
//! derives case/control status per phenotype, and answers the
//! per-locus frequency, contribution and weight queries used by
//! binning and the association tests.

pub mod encoding;
pub mod locus;
pub mod model;
pub mod phenotype;
pub mod region_tree;
pub mod sample_set;
pub mod store;
pub mod traits;

use thiserror::Error;

pub use locus::{Locus, LocusId};
pub use model::{DiseaseModel, WeightPolicy};
pub use phenotype::{Phenotype, PhenotypeConfig, PhenotypeSet, TraitTable};
pub use region_tree::{NodeId, NodeKind, RegionTree};
pub use sample_set::SampleSet;
pub use store::{GenotypeStore, StoreConfig};
pub use traits::{Call, GenotypeSource, LocusRecord, LocusWeightLookup, MemorySource};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenoError {
    #[error("Unknown {kind} '{value}'")]
    UnknownOption { kind: &'static str, value: String },
}
