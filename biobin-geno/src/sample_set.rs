//! Fixed-universe sample sets backed by a packed bit-vector.
//!
//! Every set built here keeps the padding bits of its last storage
//! word cleared, so word-level popcounts over `words()` never see
//! samples beyond `universe()`.

use bitvec::prelude::*;

/// A subset of the samples `0..universe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSet {
    bits: BitVec<u64, Lsb0>,
}

impl SampleSet {
    /// Empty set over `n` samples.
    pub fn empty(n: usize) -> Self {
        Self {
            bits: bitvec![u64, Lsb0; 0; n],
        }
    }

    /// Set containing every sample in `0..n`.
    pub fn full(n: usize) -> Self {
        let mut s = Self::empty(n);
        s.bits.fill(true);
        s
    }

    pub fn from_indices<I: IntoIterator<Item = usize>>(n: usize, indices: I) -> Self {
        let mut s = Self::empty(n);
        for i in indices {
            s.insert(i);
        }
        s
    }

    /// Number of samples the set ranges over.
    pub fn universe(&self) -> usize {
        self.bits.len()
    }

    /// Number of members.
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    pub fn contains(&self, i: usize) -> bool {
        self.bits.get(i).map(|b| *b).unwrap_or(false)
    }

    pub fn insert(&mut self, i: usize) {
        self.bits.set(i, true);
    }

    pub fn remove(&mut self, i: usize) {
        self.bits.set(i, false);
    }

    /// Member indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &SampleSet) {
        self.zip_words(other, |a, b| a | b);
    }

    /// In-place intersection.
    pub fn intersect_with(&mut self, other: &SampleSet) {
        self.zip_words(other, |a, b| a & b);
    }

    pub fn union(&self, other: &SampleSet) -> SampleSet {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    pub fn intersection(&self, other: &SampleSet) -> SampleSet {
        let mut out = self.clone();
        out.intersect_with(other);
        out
    }

    pub fn is_disjoint(&self, other: &SampleSet) -> bool {
        self.words()
            .iter()
            .zip(other.words())
            .all(|(a, b)| a & b == 0)
    }

    /// Raw storage words, padding bits zero.
    pub fn words(&self) -> &[u64] {
        self.bits.as_raw_slice()
    }

    fn zip_words(&mut self, other: &SampleSet, f: impl Fn(u64, u64) -> u64) {
        assert_eq!(self.universe(), other.universe());
        let rhs = other.bits.as_raw_slice();
        for (a, &b) in self.bits.as_raw_mut_slice().iter_mut().zip(rhs) {
            *a = f(*a, b);
        }
    }
}
