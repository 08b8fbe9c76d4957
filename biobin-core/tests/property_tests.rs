//! Property-based tests using proptest.
//!
//! Invariants that must hold for any cohort:
//!   - frequency and p-value bounds
//!   - memoized bin sizes
//!   - disease-model ordering of burden contributions
//!   - regression fits under column reordering and duplication

use proptest::prelude::*;
use rand::{Rng, SeedableRng};

use biobin_core::assoc::rank_sum_p_value;
use biobin_core::bins::BinHierarchy;
use biobin_core::config::BinConfig;
use biobin_core::kernel::chisq_mixture_upper;
use biobin_core::regression::fit::fit_permuted;
use biobin_core::regression::{detect_collinear, fit, ColumnPermutation, Family};
use biobin_geno::{
    Call, DiseaseModel, GenotypeStore, Locus, LocusRecord, MemorySource, RegionTree, StoreConfig,
};
use biobin_linalg::DenseMatrix;

fn random_store(seed: u64, n: usize, n_loci: usize) -> GenotypeStore {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    let records = (0..n_loci)
        .map(|k| {
            let p = rng.gen::<f64>();
            let calls = (0..n)
                .map(|_| {
                    if rng.gen::<f64>() < 0.05 {
                        Call::missing()
                    } else {
                        Call::new((rng.gen::<f64>() < p) as u8, (rng.gen::<f64>() < p) as u8)
                    }
                })
                .collect();
            LocusRecord {
                locus: Locus::new("1", 1_000 + 100 * k as u64, format!("rs{}", k)),
                calls,
            }
        })
        .collect();
    let samples = (0..n).map(|i| format!("s{}", i)).collect();
    let mut src = MemorySource::new(samples, records);
    let config = StoreConfig {
        keep_monomorphic: true,
        ..StoreConfig::default()
    };
    GenotypeStore::load(&mut src, config, None).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Minor allele frequency lies in [0, 0.5]
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_maf_at_most_half(
        n in 2usize..60,
        seed in 0u64..1000,
    ) {
        let store = random_store(seed, n, 8);
        for id in store.locus_ids() {
            if let Some(maf) = store.minor_allele_freq(id, None) {
                prop_assert!((0.0..=0.5).contains(&maf), "maf {}", maf);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Bin size is the memoized sum of member contributions
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_bin_size_is_sum_of_contributions(
        n in 10usize..80,
        seed in 0u64..1000,
    ) {
        let store = random_store(seed, n, 12);
        let mut tree = RegionTree::new();
        let group = tree.add_group("G");
        let a = tree.add_region("A", "1", 1_000, 1_500);
        let b = tree.add_region("B", "1", 1_400, 2_100);
        tree.add_child(group, a).unwrap();
        tree.add_child(group, b).unwrap();
        tree.assign_loci(&store);

        let config = BinConfig { max_maf: 0.5, ..BinConfig::default() };
        let bins = BinHierarchy::build(&tree, &store, &config).unwrap();
        for (id, bin) in bins.iter() {
            let expected: u64 = bin
                .loci()
                .iter()
                .map(|&l| u64::from(store.total_contribution(l)))
                .sum();
            prop_assert_eq!(bins.size(id, &store), expected);
            // Second call hits the memo.
            prop_assert_eq!(bins.size(id, &store), expected);
        }
    }
}

// ---------------------------------------------------------------------------
// 3. RECESSIVE <= DOMINANT <= ADDITIVE per sample
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_disease_model_ordering(
        n in 2usize..40,
        seed in 0u64..1000,
    ) {
        let store = random_store(seed, n, 6);
        for id in store.locus_ids() {
            for s in 0..n {
                let rec = store.individual_contribution(id, s, DiseaseModel::Recessive);
                let dom = store.individual_contribution(id, s, DiseaseModel::Dominant);
                let add = store.individual_contribution(id, s, DiseaseModel::Additive);
                prop_assert!(rec <= dom && dom <= add);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 4. Regression fits survive collinear-column permutation and duplication
// ---------------------------------------------------------------------------

fn random_design(seed: u64, n: usize, p: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    let mut cols = vec![vec![1.0; n]];
    for _ in 1..p {
        cols.push((0..n).map(|_| rng.gen::<f64>() * 4.0 - 2.0).collect());
    }
    let y = (0..n)
        .map(|i| cols.iter().skip(1).map(|c| c[i]).sum::<f64>() + rng.gen::<f64>())
        .collect();
    (cols, y)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_permuted_fit_matches_reduced_design(
        n in 20usize..60,
        p in 3usize..6,
        source in 1usize..5,
        seed in 0u64..1000,
    ) {
        // Copy a column into position 1 so both copies sit before the last
        // column and dropping one of them really reorders the design.
        let (mut cols, y) = random_design(seed, n, p);
        let source = source.min(p - 2);
        cols.insert(1, cols[source].clone());
        let x = DenseMatrix::from_columns(n, &cols);

        let dropped = detect_collinear(&x).unwrap();
        prop_assert_eq!(dropped.len(), 1);
        prop_assert!(dropped[0] < p);
        let perm = ColumnPermutation::new(p + 1, &dropped);
        let identity: Vec<usize> = (0..=p).collect();
        prop_assert_ne!(perm.order(), identity.as_slice());

        let via = fit_permuted(&x, &y, Family::Gaussian, &perm);
        prop_assert_eq!(&via.dropped, &dropped);
        prop_assert!(via.coefficients[dropped[0]].is_nan());

        let kept: Vec<usize> = (0..=p).filter(|j| !dropped.contains(j)).collect();
        let reduced: Vec<Vec<f64>> = kept.iter().map(|&j| cols[j].clone()).collect();
        let direct = fit(&DenseMatrix::from_columns(n, &reduced), &y, Family::Gaussian).unwrap();
        prop_assert!(direct.dropped.is_empty());

        for (i, &j) in kept.iter().enumerate() {
            let a = direct.coefficients[i];
            let b = via.coefficients[j];
            prop_assert!((a - b).abs() < 1e-8 * (1.0 + a.abs()), "{} vs {}", a, b);
            let se_a = direct.covariance.get(i, i);
            let se_b = via.covariance.get(j, j);
            prop_assert!((se_a - se_b).abs() < 1e-8 * (1.0 + se_a.abs()));
        }
        for (a, b) in direct.fitted.iter().zip(&via.fitted) {
            prop_assert!((a - b).abs() < 1e-8 * (1.0 + a.abs()));
        }
    }

    #[test]
    fn prop_duplicate_column_dropped_once(
        n in 20usize..60,
        p in 2usize..5,
        dup in 1usize..4,
        seed in 0u64..1000,
    ) {
        let (mut cols, y) = random_design(seed, n, p);
        let source = dup.min(p - 1);
        cols.push(cols[source].clone());
        let x = DenseMatrix::from_columns(n, &cols);
        let r = fit(&x, &y, Family::Gaussian).unwrap();
        prop_assert!(r.converged);
        prop_assert_eq!(r.dropped.len(), 1);
        prop_assert_eq!(r.rank, p);
    }
}

// ---------------------------------------------------------------------------
// 5. p-values lie in [0, 1]
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_davies_upper_tail_in_unit_interval(
        lambda in prop::collection::vec(0.01f64..10.0, 1..8),
        q in 0.0f64..50.0,
    ) {
        let res = chisq_mixture_upper(&lambda, q, 10_000, 1e-6);
        if res.cdf >= 0.0 {
            prop_assert!(res.cdf >= -1e-4 && res.cdf <= 1.0 + 1e-4, "p {}", res.cdf);
        }
    }

    #[test]
    fn prop_rank_sum_in_unit_interval(
        controls in prop::collection::vec(0u8..6, 0..30),
        cases in prop::collection::vec(0u8..6, 0..30),
    ) {
        let controls: Vec<f64> = controls.into_iter().map(f64::from).collect();
        let cases: Vec<f64> = cases.into_iter().map(f64::from).collect();
        let p = rank_sum_p_value(&controls, &cases);
        prop_assert!((0.0..=1.0).contains(&p), "p {}", p);
    }
}
