//! Two-bit-vector genotype encoding.
//!
//! For sample i, `A[i] && B[i]` is missing, `A[i]` alone is homozygous for
//! a non-major allele, `B[i]` alone is heterozygous, and neither is
//! homozygous major.

use bitvec::prelude::*;

use crate::traits::Call;

/// Decoded state of one (locus, sample) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenotypeState {
    HomMajor,
    Het,
    HomMinor,
    Missing,
}

impl GenotypeState {
    /// Non-major allele copies, `None` when missing.
    pub fn copies(self) -> Option<u8> {
        match self {
            GenotypeState::HomMajor => Some(0),
            GenotypeState::Het => Some(1),
            GenotypeState::HomMinor => Some(2),
            GenotypeState::Missing => None,
        }
    }
}

/// Per-sample counts restricted to some sample subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlleleCounts {
    /// Samples with two non-major alleles.
    pub hom_minor: u32,
    /// Samples with one non-major allele.
    pub het: u32,
    /// Samples with an observed call.
    pub nonmissing: u32,
}

impl AlleleCounts {
    /// Observed non-major allele copies.
    pub fn minor_alleles(&self) -> u32 {
        2 * self.hom_minor + self.het
    }
}

/// Encoded genotypes of one locus.
#[derive(Debug, Clone)]
pub struct EncodedLocus {
    a: BitVec<u64, Lsb0>,
    b: BitVec<u64, Lsb0>,
    /// Allele code treated as major.
    pub major: u8,
    /// Number of distinct alleles seen among usable calls.
    pub n_alleles: usize,
}

impl EncodedLocus {
    /// Encode a row of calls against its most frequent allele.
    ///
    /// Ties go to the lowest allele code. Unusable calls become missing.
    pub fn encode(calls: &[Call]) -> Self {
        let mut counts: Vec<u32> = Vec::new();
        for (x, y) in calls.iter().filter_map(Call::usable) {
            let hi = x.max(y) as usize;
            if counts.len() <= hi {
                counts.resize(hi + 1, 0);
            }
            counts[x as usize] += 1;
            counts[y as usize] += 1;
        }

        let mut major = 0u8;
        let mut best = 0u32;
        for (allele, &c) in counts.iter().enumerate() {
            if c > best {
                best = c;
                major = allele as u8;
            }
        }
        let n_alleles = counts.iter().filter(|&&c| c > 0).count();

        let n = calls.len();
        let mut a = bitvec![u64, Lsb0; 0; n];
        let mut b = bitvec![u64, Lsb0; 0; n];
        for (i, call) in calls.iter().enumerate() {
            match call.usable() {
                None => {
                    a.set(i, true);
                    b.set(i, true);
                }
                Some((x, y)) if x != major && y != major => a.set(i, true),
                Some((x, y)) if x != major || y != major => b.set(i, true),
                Some(_) => {}
            }
        }

        Self {
            a,
            b,
            major,
            n_alleles,
        }
    }

    pub fn n_samples(&self) -> usize {
        self.a.len()
    }

    pub fn state(&self, i: usize) -> GenotypeState {
        match (self.a[i], self.b[i]) {
            (true, true) => GenotypeState::Missing,
            (true, false) => GenotypeState::HomMinor,
            (false, true) => GenotypeState::Het,
            (false, false) => GenotypeState::HomMajor,
        }
    }

    /// Counts over the samples whose bits are set in `subset` (raw words
    /// of a same-length sample set).
    pub fn counts(&self, subset: &[u64]) -> AlleleCounts {
        let mut out = AlleleCounts::default();
        let words = self.a.as_raw_slice().iter().zip(self.b.as_raw_slice());
        for ((&a, &b), &s) in words.zip(subset) {
            out.hom_minor += (a & !b & s).count_ones();
            out.het += (!a & b & s).count_ones();
            out.nonmissing += (!(a & b) & s).count_ones();
        }
        out
    }
}
