//! A single testable bin.

use std::cmp::Ordering;
use std::sync::OnceLock;

use biobin_geno::locus::chrom_cmp;
use biobin_geno::{GenotypeStore, LocusId, NodeId};

/// What a bin was built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BinKind {
    Group(NodeId),
    Region(NodeId),
    Intergenic { chrom: String, window: u64 },
}

impl BinKind {
    fn rank(&self) -> u8 {
        match self {
            BinKind::Group(_) => 0,
            BinKind::Region(_) => 1,
            BinKind::Intergenic { .. } => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BinKind::Group(_) => "group",
            BinKind::Region(_) => "region",
            BinKind::Intergenic { .. } => "intergenic",
        }
    }
}

impl Ord for BinKind {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (BinKind::Group(a), BinKind::Group(b)) | (BinKind::Region(a), BinKind::Region(b)) => {
                a.cmp(b)
            }
            (
                BinKind::Intergenic { chrom: ca, window: wa },
                BinKind::Intergenic { chrom: cb, window: wb },
            ) => chrom_cmp(ca, cb).then(wa.cmp(wb)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for BinKind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A named set of loci tested as one unit.
#[derive(Debug)]
pub struct Bin {
    name: String,
    kind: BinKind,
    loci: Vec<LocusId>,
    size: OnceLock<u64>,
}

impl Bin {
    /// `loci` is sorted and deduplicated on construction.
    pub fn new(name: impl Into<String>, kind: BinKind, mut loci: Vec<LocusId>) -> Self {
        loci.sort_unstable();
        loci.dedup();
        Self {
            name: name.into(),
            kind,
            loci,
            size: OnceLock::new(),
        }
    }

    /// Name of an intergenic window bin, e.g. `chr1:0K-50K`.
    pub fn intergenic_name(chrom: &str, window: u64, step: u64, width: u64) -> String {
        let start = window * step;
        format!("chr{}:{}K-{}K", chrom, start / 1000, (start + width) / 1000)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &BinKind {
        &self.kind
    }

    pub fn loci(&self) -> &[LocusId] {
        &self.loci
    }

    pub fn n_loci(&self) -> usize {
        self.loci.len()
    }

    /// Sum of the total contribution of every member locus, computed once.
    pub fn size(&self, store: &GenotypeStore) -> u64 {
        *self.size.get_or_init(|| {
            self.loci
                .iter()
                .map(|&l| u64::from(store.total_contribution(l)))
                .sum()
        })
    }
}

impl PartialEq for Bin {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name
    }
}

impl Eq for Bin {}

impl Ord for Bin {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind.cmp(&other.kind).then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for Bin {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_order() {
        let g = BinKind::Group(NodeId(5));
        let r = BinKind::Region(NodeId(0));
        let i1 = BinKind::Intergenic {
            chrom: "2".into(),
            window: 0,
        };
        let i2 = BinKind::Intergenic {
            chrom: "10".into(),
            window: 0,
        };
        let mut kinds = vec![i2.clone(), r.clone(), i1.clone(), g.clone()];
        kinds.sort();
        assert_eq!(kinds, vec![g, r, i1, i2]);
    }

    #[test]
    fn test_name_breaks_ties() {
        let a = Bin::new("A", BinKind::Region(NodeId(1)), vec![]);
        let b = Bin::new("B", BinKind::Region(NodeId(1)), vec![]);
        assert!(a < b);
    }

    #[test]
    fn test_intergenic_name() {
        assert_eq!(Bin::intergenic_name("1", 2, 50_000, 50_000), "chr1:100K-150K");
        assert_eq!(Bin::intergenic_name("X", 1, 25_000, 50_000), "chrX:25K-75K");
    }

    #[test]
    fn test_loci_deduplicated() {
        let b = Bin::new("x", BinKind::Group(NodeId(0)), vec![LocusId(3), LocusId(1), LocusId(3)]);
        assert_eq!(b.loci(), &[LocusId(1), LocusId(3)]);
    }
}
