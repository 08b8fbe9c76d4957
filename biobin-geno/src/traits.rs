//! Interfaces consumed from the genotype-parsing and annotation layers.

use std::collections::HashMap;

use anyhow::Result;

use crate::locus::Locus;

/// One sample's call at one locus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    /// Allele codes of the two haplotypes, `None` for a no-call.
    pub alleles: Option<(u8, u8)>,
    /// Call-level filter flag; failed calls are treated as missing.
    pub pass: bool,
}

impl Call {
    pub fn new(a: u8, b: u8) -> Self {
        Self {
            alleles: Some((a, b)),
            pass: true,
        }
    }

    pub fn missing() -> Self {
        Self {
            alleles: None,
            pass: true,
        }
    }

    pub fn filtered(a: u8, b: u8) -> Self {
        Self {
            alleles: Some((a, b)),
            pass: false,
        }
    }

    /// The allele pair if this call is usable.
    pub fn usable(&self) -> Option<(u8, u8)> {
        if self.pass {
            self.alleles
        } else {
            None
        }
    }
}

/// A locus with the calls of every sample, in sample order.
#[derive(Debug, Clone)]
pub struct LocusRecord {
    pub locus: Locus,
    pub calls: Vec<Call>,
}

/// Source of locus records, e.g. a VCF reader.
///
/// Implementations yield records in file order; all records carry one
/// call per sample in `sample_ids()`.
pub trait GenotypeSource {
    fn sample_ids(&self) -> &[String];

    /// Next record, or `None` once exhausted.
    fn next_record(&mut self) -> Result<Option<LocusRecord>>;

    fn n_samples(&self) -> usize {
        self.sample_ids().len()
    }
}

/// An in-memory source, used by the simulator and tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    samples: Vec<String>,
    records: std::collections::VecDeque<LocusRecord>,
}

impl MemorySource {
    pub fn new(samples: Vec<String>, records: Vec<LocusRecord>) -> Self {
        Self {
            samples,
            records: records.into(),
        }
    }
}

impl GenotypeSource for MemorySource {
    fn sample_ids(&self) -> &[String] {
        &self.samples
    }

    fn next_record(&mut self) -> Result<Option<LocusRecord>> {
        let Some(rec) = self.records.pop_front() else {
            return Ok(None);
        };
        anyhow::ensure!(
            rec.calls.len() == self.samples.len(),
            "locus {} has {} calls for {} samples",
            rec.locus,
            rec.calls.len(),
            self.samples.len()
        );
        Ok(Some(rec))
    }
}

/// Optional externally supplied per-locus weight.
pub trait LocusWeightLookup: Send + Sync {
    /// Weight for the locus, or `None` for no opinion.
    fn weight(&self, locus: &Locus) -> Option<f64>;
}

/// Weights keyed by variant identifier.
impl LocusWeightLookup for HashMap<String, f64> {
    fn weight(&self, locus: &Locus) -> Option<f64> {
        self.get(&locus.id).copied()
    }
}
