//! Locus identity and the arena index used to refer to loci.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable index of a locus inside a [`GenotypeStore`](crate::GenotypeStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocusId(pub u32);

impl LocusId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LocusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A genomic position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locus {
    /// Chromosome label without any "chr" prefix (e.g. "1", "X").
    pub chrom: String,
    /// 1-based position in base pairs.
    pub pos: u64,
    /// Variant identifier (e.g. rsID).
    pub id: String,
}

impl Locus {
    pub fn new(chrom: impl Into<String>, pos: u64, id: impl Into<String>) -> Self {
        let chrom = chrom.into();
        let chrom = chrom
            .strip_prefix("chr")
            .map(str::to_string)
            .unwrap_or(chrom);
        Self {
            chrom,
            pos,
            id: id.into(),
        }
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() || self.id == "." {
            write!(f, "chr{}:{}", self.chrom, self.pos)
        } else {
            f.write_str(&self.id)
        }
    }
}

/// Sort key for chromosome labels: autosomes numerically, then X, Y, XY, MT,
/// then anything else lexicographically.
fn chrom_rank(chrom: &str) -> (u32, &str) {
    if let Ok(n) = chrom.parse::<u32>() {
        return (n, "");
    }
    match chrom.to_ascii_uppercase().as_str() {
        "X" => (1001, ""),
        "Y" => (1002, ""),
        "XY" => (1003, ""),
        "M" | "MT" => (1004, ""),
        _ => (2000, chrom),
    }
}

pub fn chrom_cmp(a: &str, b: &str) -> Ordering {
    chrom_rank(a).cmp(&chrom_rank(b))
}
