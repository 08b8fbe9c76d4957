//! End-to-end tests over small synthetic cohorts.
//!
//! Each module builds its genotypes in memory, loads them through the
//! store and checks a whole pipeline stage against hand-computed values.

use biobin_geno::{
    Call, GenotypeStore, Locus, LocusId, LocusRecord, MemorySource, Phenotype, PhenotypeConfig,
    PhenotypeSet, RegionTree, StoreConfig, TraitTable,
};

/// Load `(chrom, pos, calls)` records into a store.
fn load(records: Vec<(&str, u64, Vec<Call>)>, config: StoreConfig) -> GenotypeStore {
    let n = records[0].2.len();
    let samples = (0..n).map(|i| format!("s{}", i)).collect();
    let records = records
        .into_iter()
        .map(|(chrom, pos, calls)| LocusRecord {
            locus: Locus::new(chrom, pos, format!("{}:{}", chrom, pos)),
            calls,
        })
        .collect();
    let mut src = MemorySource::new(samples, records);
    GenotypeStore::load(&mut src, config, None).expect("load failed")
}

fn phenotype(values: &[f64]) -> Phenotype {
    let traits = TraitTable::new(
        vec!["trait".into()],
        values.iter().map(|&v| vec![v]).collect(),
    )
    .unwrap();
    PhenotypeSet::from_traits(&traits, &PhenotypeConfig::default(), 0.05, true)
        .phenotypes
        .remove(0)
}

/// `n` calls, heterozygous at the listed samples.
fn het_at(n: usize, carriers: &[usize]) -> Vec<Call> {
    (0..n)
        .map(|i| {
            if carriers.contains(&i) {
                Call::new(0, 1)
            } else {
                Call::new(0, 0)
            }
        })
        .collect()
}

mod scenarios {
    use super::*;
    use std::sync::Arc;

    use biobin_core::assoc::{BurdenRegressionTest, SkatTest};
    use biobin_core::{AssocTest, TestContext};
    use biobin_core::kernel::KernelTestEngine;
    use biobin_core::regression::{EngineState, Family, RegressionEngine};
    use biobin_geno::model::madsen_browning;
    use biobin_geno::WeightPolicy;

    #[test]
    fn test_total_contribution_with_missing_call() {
        let calls = vec![Call::new(0, 0), Call::new(0, 1), Call::new(1, 1), Call::missing()];
        let store = load(vec![("1", 100, calls)], StoreConfig::default());
        assert_eq!(store.n_loci(), 1);
        assert_eq!(store.total_contribution(LocusId(0)), 3);
    }

    #[test]
    fn test_all_controls_phenotype_runs_without_error() {
        let pheno = phenotype(&[0.0; 10]);
        assert_eq!(pheno.controls.count(), 10);
        assert!(pheno.cases.is_empty());

        let store = load(
            vec![("1", 100, het_at(10, &[2]))],
            StoreConfig::default(),
        );
        let mut logistic = RegressionEngine::new(Family::Binomial);
        assert_eq!(logistic.setup(&pheno, None), EngineState::Failed);
        assert_eq!(logistic.run_test(&store, &pheno, &[LocusId(0)]), 1.0);

        // No trait table at all: one unnamed, all-control phenotype.
        let set = PhenotypeSet::all_controls(10);
        assert_eq!(set.len(), 1);
        assert_eq!(set.phenotypes[0].controls.count(), 10);
        assert!(set.phenotypes[0].cases.is_empty());
    }

    #[test]
    fn test_failed_null_model_fails_skat_too() {
        let pheno = phenotype(&[0.0; 12]);
        let store = load(
            vec![("1", 100, het_at(12, &[3, 7]))],
            StoreConfig::default(),
        );
        let mut logistic = RegressionEngine::new(Family::Binomial);
        assert_eq!(logistic.setup(&pheno, None), EngineState::Failed);
        assert!(logistic.null_model().is_none());

        let mut skat = KernelTestEngine::new(Family::Binomial);
        assert_eq!(skat.init(&pheno, logistic.null_model()), EngineState::Failed);
        assert_eq!(skat.run_test(&store, &pheno, &[LocusId(0)]), 1.0);

        // Same outcome through the registered tests.
        let ctx = TestContext {
            store: &store,
            phenotype: &pheno,
            covariates: None,
        };
        let mut burden = BurdenRegressionTest::logistic();
        let mut kernel = SkatTest::logistic();
        burden.init(&ctx);
        kernel.init(&ctx);
        assert_eq!(burden.engine().state(), EngineState::Failed);
        assert_eq!(kernel.engine().state(), EngineState::Failed);
    }

    #[test]
    fn test_shared_null_model_drives_both_engines() {
        let n = 40;
        let pheno = phenotype(&(0..n).map(|i| (i % 2) as f64).collect::<Vec<_>>());
        let store = load(
            vec![("1", 100, het_at(n, &[1, 3, 5, 8]))],
            StoreConfig::default(),
        );
        let mut logistic = RegressionEngine::new(Family::Binomial);
        assert_eq!(logistic.setup(&pheno, None), EngineState::Ready);
        let null = logistic.null_model().unwrap();

        let mut skat = KernelTestEngine::new(Family::Binomial);
        assert_eq!(skat.init(&pheno, Some(Arc::clone(&null))), EngineState::Ready);
        // Engine and kernel hold the same fit.
        assert_eq!(Arc::strong_count(&null), 3);
        let p = skat.run_test(&store, &pheno, &[LocusId(0)]);
        assert!(p > 0.0 && p <= 1.0);
    }

    #[test]
    fn test_one_case_in_ten_falls_back_to_all_controls() {
        // One control in ten is below the 0.125 control fraction.
        let mut values = vec![1.0; 9];
        values.push(0.0);
        let pheno = phenotype(&values);
        assert_eq!(pheno.controls.count(), 10);
        assert!(pheno.cases.is_empty());
    }

    #[test]
    fn test_skat_without_polymorphic_loci_is_exactly_one() {
        let n = 16;
        let config = StoreConfig {
            keep_monomorphic: true,
            ..StoreConfig::default()
        };
        let store = load(
            vec![
                ("1", 100, vec![Call::new(0, 0); n]),
                ("1", 200, vec![Call::new(1, 1); n]),
            ],
            config,
        );
        let pheno = phenotype(&(0..n).map(|i| (i % 2) as f64).collect::<Vec<_>>());
        let mut logistic = RegressionEngine::new(Family::Binomial);
        assert_eq!(logistic.setup(&pheno, None), EngineState::Ready);
        let mut skat = KernelTestEngine::new(Family::Binomial);
        assert_eq!(skat.init(&pheno, logistic.null_model()), EngineState::Ready);
        assert_eq!(skat.run_test(&store, &pheno, &[LocusId(0), LocusId(1)]), 1.0);
    }

    #[test]
    fn test_madsen_browning_literal() {
        let expected = 22.0 / (10.0_f64 * 3.0 * 19.0).sqrt();
        let w = madsen_browning(10, 2).unwrap();
        assert!((w - expected).abs() < 1e-6);
        assert!((w - 0.921_5).abs() < 1e-4);

        // Same value through the store: 10 controls, two of them carriers.
        let mut values = vec![0.0; 10];
        values.extend([1.0; 4]);
        let pheno = phenotype(&values);
        let store = load(
            vec![("1", 100, het_at(14, &[0, 1, 11]))],
            StoreConfig {
                weight_policy: WeightPolicy::Control,
                ..StoreConfig::default()
            },
        );
        assert!((store.calculated_weight(LocusId(0), &pheno) - expected).abs() < 1e-6);
    }
}

mod binning {
    use super::*;
    use biobin_core::bins::{BinHierarchy, BinKind};
    use biobin_core::config::BinConfig;

    const N: usize = 40;

    /// Pathway with two genes, plus loci outside any gene.
    fn cohort() -> (GenotypeStore, RegionTree) {
        let store = load(
            vec![
                ("1", 1_500, het_at(N, &[1])),
                ("1", 1_600, het_at(N, &[2])),
                ("1", 5_500, het_at(N, &[3])),
                ("1", 5_600, het_at(N, &(0..24).collect::<Vec<_>>())),
                ("1", 120_000, het_at(N, &[4])),
                ("chr2", 10, het_at(N, &[5])),
            ],
            StoreConfig::default(),
        );
        let mut tree = RegionTree::new();
        let path = tree.add_group("PATH");
        let g1 = tree.add_region("G1", "1", 1_000, 2_000);
        let g2 = tree.add_region("G2", "chr1", 5_000, 6_000);
        tree.add_child(path, g1).unwrap();
        tree.add_child(path, g2).unwrap();
        tree.assign_loci(&store);
        (store, tree)
    }

    #[test]
    fn test_bins_in_order() {
        let (store, tree) = cohort();
        let bins = BinHierarchy::build(&tree, &store, &BinConfig::default()).unwrap();
        let names: Vec<&str> = bins.bins().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["PATH", "G1", "G2", "chr1:100K-150K", "chr2:0K-50K"]);
        assert!(matches!(bins.bins()[0].kind(), BinKind::Group(_)));
        // The common locus (MAF 0.3) is in no bin.
        assert_eq!(bins.rare_loci().len(), 5);
        assert!(bins.locus_bins(LocusId(3)).is_empty());
        assert_eq!(bins.bins()[0].n_loci(), 3);
    }

    #[test]
    fn test_locus_bins_and_sizes() {
        let (store, tree) = cohort();
        let bins = BinHierarchy::build(&tree, &store, &BinConfig::default()).unwrap();
        let of_first: Vec<&str> = bins
            .locus_bins(LocusId(0))
            .iter()
            .map(|&b| bins.bin(b).name())
            .collect();
        assert_eq!(of_first, vec!["PATH", "G1"]);
        for (id, bin) in bins.iter() {
            let expected: u64 = bin
                .loci()
                .iter()
                .map(|&l| u64::from(store.total_contribution(l)))
                .sum();
            assert_eq!(bins.size(id, &store), expected);
            assert_eq!(bin.size(&store), expected);
        }
    }

    #[test]
    fn test_large_pathway_expands_into_genes() {
        let (store, tree) = cohort();
        let config = BinConfig {
            expand_threshold: 2,
            ..BinConfig::default()
        };
        let bins = BinHierarchy::build(&tree, &store, &config).unwrap();
        assert!(bins
            .bins()
            .iter()
            .all(|b| !matches!(b.kind(), BinKind::Group(_))));
        let names: Vec<&str> = bins.bins().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["G1", "G2", "chr1:100K-150K", "chr2:0K-50K"]);
    }

    #[test]
    fn test_min_bin_size_and_strategies() {
        let (store, tree) = cohort();
        let config = BinConfig {
            min_bin_size: 2,
            include_intergenic: false,
            ..BinConfig::default()
        };
        let bins = BinHierarchy::build(&tree, &store, &config).unwrap();
        let names: Vec<&str> = bins.bins().iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["PATH", "G1"]);
    }

    #[test]
    fn test_overlapping_intergenic_windows() {
        let (store, tree) = cohort();
        let config = BinConfig {
            use_pathways: false,
            expand_by_genes: false,
            intergenic_width: 100_000,
            intergenic_step: 50_000,
            ..BinConfig::default()
        };
        let bins = BinHierarchy::build(&tree, &store, &config).unwrap();
        let names: Vec<&str> = bins.bins().iter().map(|b| b.name()).collect();
        assert_eq!(
            names,
            vec!["chr1:50K-150K", "chr1:100K-200K", "chr2:0K-100K"]
        );
    }
}

mod regression {
    use biobin_core::regression::{fit, Family};
    use biobin_linalg::DenseMatrix;

    #[test]
    fn test_duplicate_covariate_drops_exactly_one() {
        let n = 30;
        let age: Vec<f64> = (0..n).map(|i| 20.0 + (i * 7 % 31) as f64).collect();
        let burden: Vec<f64> = (0..n).map(|i| (i % 4 == 0) as u8 as f64).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| 0.05 * age[i] + 1.5 * burden[i] + ((i * 13 % 7) as f64 - 3.0) * 0.2)
            .collect();
        let x = DenseMatrix::from_columns(
            n,
            &[vec![1.0; n], age.clone(), age, burden],
        );
        let r = fit(&x, &y, Family::Gaussian).unwrap();
        assert!(r.converged);
        assert_eq!(r.dropped.len(), 1);
        assert_eq!(r.dropped, vec![2]);
        assert!(r.coefficients[2].is_nan());
        assert!(r.coefficients[3].is_finite());
        assert!(r.wald_p_value(3) < 0.01);
    }

    #[test]
    fn test_logistic_duplicate_covariate() {
        let n = 60;
        let x1: Vec<f64> = (0..n).map(|i| ((i * 11) % 17) as f64 / 4.0).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| if x1[i] + ((i * 5) % 3) as f64 > 3.0 { 1.0 } else { 0.0 })
            .collect();
        let x = DenseMatrix::from_columns(n, &[vec![1.0; n], x1.clone(), x1]);
        let r = fit(&x, &y, Family::Binomial).unwrap();
        assert!(r.converged);
        assert_eq!(r.dropped.len(), 1);
    }
}

mod registry {
    use biobin_core::assoc::{TestKind, TestRegistry};
    use biobin_core::config::{AnalysisConfig, ConfigError};

    #[test]
    fn test_config_tests_resolve_through_registry() {
        let cfg = AnalysisConfig {
            tests: vec![
                "LINEAR".into(),
                "logistic".into(),
                "skat-linear".into(),
                "SKAT-logistic".into(),
                "Wilcoxon".into(),
            ],
            ..AnalysisConfig::default()
        };
        let kinds = cfg.validate().unwrap();
        assert_eq!(kinds, TestKind::ALL.to_vec());
        let reg = TestRegistry::default();
        for k in kinds {
            assert_eq!(reg.create_kind(k).unwrap().name(), k.key());
        }
    }

    #[test]
    fn test_unknown_name_is_fatal() {
        let reg = TestRegistry::default();
        assert_eq!(
            reg.create("SKAT-O").err(),
            Some(ConfigError::UnknownTest("SKAT-O".into()))
        );
    }
}

mod pipeline {
    use super::*;
    use biobin_core::assoc::{TestKind, TestRegistry};
    use biobin_core::bins::BinHierarchy;
    use biobin_core::config::BinConfig;
    use biobin_core::runner::{Outputs, PhenotypeRunner};
    use rand::{Rng, SeedableRng};

    struct Cohort {
        store: GenotypeStore,
        tree: RegionTree,
        phenotypes: PhenotypeSet,
        covariates: TraitTable,
    }

    fn cohort(seed: u64) -> Cohort {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        let n = 150;
        let n_loci = 24;
        let records: Vec<(&str, u64, Vec<Call>)> = (0..n_loci)
            .map(|k| {
                let maf = 0.005 + 0.03 * rng.gen::<f64>();
                let calls = (0..n)
                    .map(|_| {
                        if rng.gen::<f64>() < 0.01 {
                            return Call::missing();
                        }
                        let a = (rng.gen::<f64>() < maf) as u8;
                        let b = (rng.gen::<f64>() < maf) as u8;
                        Call::new(a, b)
                    })
                    .collect();
                ("1", 10_000 + 3_000 * k as u64, calls)
            })
            .collect();
        let store = load(records, StoreConfig::default());

        let mut tree = RegionTree::new();
        let path = tree.add_group("PATHWAY");
        for (g, start) in [("GENE_A", 10_000), ("GENE_B", 40_000)] {
            let id = tree.add_region(g, "1", start, start + 20_000);
            tree.add_child(path, id).unwrap();
        }
        tree.assign_loci(&store);

        let names = vec!["binary".to_string(), "quant".to_string(), "other".to_string()];
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                vec![
                    (i % 3 == 0) as u8 as f64,
                    rng.gen::<f64>() * 10.0,
                    if i % 17 == 0 { f64::NAN } else { (i % 2) as f64 },
                ]
            })
            .collect();
        let traits = TraitTable::new(names, rows).unwrap();
        let phenotypes =
            PhenotypeSet::from_traits(&traits, &PhenotypeConfig::default(), 0.05, true);
        let covariates = TraitTable::new(
            vec!["age".into()],
            (0..n).map(|_| vec![30.0 + 40.0 * rng.gen::<f64>()]).collect(),
        )
        .unwrap();
        Cohort {
            store,
            tree,
            phenotypes,
            covariates,
        }
    }

    fn run(c: &Cohort, bins: &BinHierarchy, n_threads: usize) -> (String, String, Vec<Vec<Vec<f64>>>) {
        let registry = TestRegistry::default();
        let runner = PhenotypeRunner {
            store: &c.store,
            bins,
            phenotypes: &c.phenotypes,
            covariates: Some(&c.covariates),
            registry: &registry,
            tests: TestKind::ALL.to_vec(),
            n_threads,
            maf_range: (0.0, 0.05),
        };
        let out = Outputs::new(Vec::new(), Some(Vec::new()));
        let reports = runner.run(&out).unwrap();
        let (summary, loci) = out.into_inner().unwrap();
        (
            String::from_utf8(summary).unwrap(),
            String::from_utf8(loci.unwrap()).unwrap(),
            reports.into_iter().map(|r| r.pvalues).collect(),
        )
    }

    #[test]
    fn test_every_test_every_bin() {
        let c = cohort(7);
        let bins = BinHierarchy::build(&c.tree, &c.store, &BinConfig::default()).unwrap();
        assert!(!bins.is_empty());
        let (summary, loci, pvalues) = run(&c, &bins, 1);

        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 1 + c.phenotypes.len() * bins.len());
        assert!(lines[0].ends_with(
            "p.linear\tp.logistic\tp.SKAT-linear\tp.SKAT-logistic\tp.wilcoxon"
        ));
        assert_eq!(
            loci.lines().count(),
            1 + c.phenotypes.len() * bins.rare_loci().len()
        );

        assert_eq!(pvalues.len(), 3);
        for per_pheno in &pvalues {
            assert_eq!(per_pheno.len(), 5);
            for per_test in per_pheno {
                assert_eq!(per_test.len(), bins.len());
                assert!(per_test.iter().all(|p| (0.0..=1.0).contains(p)));
            }
        }
    }

    #[test]
    fn test_thread_count_does_not_change_results() {
        let c = cohort(11);
        let bins = BinHierarchy::build(&c.tree, &c.store, &BinConfig::default()).unwrap();
        let (_, _, single) = run(&c, &bins, 1);
        let (_, _, multi) = run(&c, &bins, 3);
        assert_eq!(single, multi);
    }
}
