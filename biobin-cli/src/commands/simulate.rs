//! Run the full pipeline on a synthetic cohort.
//!
//! biobin simulate --output-prefix ... [--n-samples ...] [--tests linear,SKAT-logistic,...]

use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use clap::Args;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use biobin_core::runner::{Outputs, PhenotypeRunner};
use biobin_core::{AnalysisConfig, BinHierarchy, TestRegistry};
use biobin_geno::{
    Call, GenotypeStore, Locus, LocusRecord, MemorySource, PhenotypeSet, RegionTree, TraitTable,
};

#[derive(Args)]
pub struct SimulateArgs {
    /// Output file prefix (.bins.tsv, .loci.tsv, .config.json)
    #[arg(long)]
    output_prefix: String,

    /// Analysis configuration (JSON). Command-line options override it.
    #[arg(long)]
    config: Option<String>,

    /// Number of samples
    #[arg(long, default_value = "500")]
    n_samples: usize,

    /// Number of genes
    #[arg(long, default_value = "12")]
    n_genes: usize,

    /// Loci per gene
    #[arg(long, default_value = "8")]
    loci_per_gene: usize,

    /// Genes per pathway
    #[arg(long, default_value = "3")]
    genes_per_pathway: usize,

    /// Loci outside any gene
    #[arg(long, default_value = "20")]
    n_intergenic: usize,

    /// Log-odds (and trait shift) per allele carried in the first gene
    #[arg(long, default_value = "0.8")]
    effect: f64,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Tests to run (comma-separated)
    #[arg(long)]
    tests: Option<String>,

    /// Disease model: additive, dominant or recessive
    #[arg(long)]
    disease_model: Option<String>,

    /// Weight policy: max, min, control or overall
    #[arg(long)]
    weight_policy: Option<String>,

    /// Upper MAF bound for binning
    #[arg(long)]
    max_maf: Option<f64>,

    /// Split nodes with more loci than this
    #[arg(long)]
    expand_threshold: Option<usize>,

    /// Drop bins with fewer loci than this
    #[arg(long)]
    min_bin_size: Option<usize>,

    /// Skip the per-locus output
    #[arg(long, default_value = "false")]
    no_locus_output: bool,
}

/// In-memory cohort: genotypes, annotation, traits and covariates.
pub struct Cohort {
    pub source: MemorySource,
    pub tree: RegionTree,
    pub traits: TraitTable,
    pub covariates: TraitTable,
}

fn standard_normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn simulate_calls(rng: &mut ChaCha8Rng, n: usize, maf: f64) -> Vec<Call> {
    (0..n)
        .map(|_| {
            if rng.gen::<f64>() < 0.01 {
                Call::missing()
            } else {
                Call::new((rng.gen::<f64>() < maf) as u8, (rng.gen::<f64>() < maf) as u8)
            }
        })
        .collect()
}

fn carried(calls: &[Call], i: usize) -> f64 {
    calls[i].alleles.map_or(0.0, |(a, b)| f64::from(a + b))
}

/// Genes on chromosome 1 grouped into pathways, intergenic loci on
/// chromosome 2, a binary and a quantitative trait driven by the first gene.
pub fn simulate_cohort(args: &SimulateArgs) -> Result<Cohort> {
    anyhow::ensure!(args.n_samples >= 10, "need at least 10 samples");
    anyhow::ensure!(args.genes_per_pathway > 0, "genes per pathway must be positive");

    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let n = args.n_samples;
    let mut records = Vec::new();
    let mut tree = RegionTree::new();
    let mut causal = vec![0.0; n];

    let mut pathway = None;
    for g in 0..args.n_genes {
        if g % args.genes_per_pathway == 0 {
            pathway = Some(tree.add_group(format!("PATHWAY{}", g / args.genes_per_pathway + 1)));
        }
        let start = 100_000 * (g as u64 + 1);
        let gene = tree.add_region(format!("GENE{}", g + 1), "1", start, start + 10_000);
        if let Some(p) = pathway {
            tree.add_child(p, gene)?;
        }
        for k in 0..args.loci_per_gene {
            let pos = start + 500 * (k as u64 + 1);
            let maf = rng.gen_range(0.002..0.04);
            let calls = simulate_calls(&mut rng, n, maf);
            if g == 0 {
                for (i, c) in causal.iter_mut().enumerate() {
                    *c += carried(&calls, i);
                }
            }
            records.push(LocusRecord {
                locus: Locus::new("1", pos, format!("1:{}", pos)),
                calls,
            });
        }
    }
    for k in 0..args.n_intergenic {
        let pos = 20_000 * k as u64 + 7_000;
        let maf = rng.gen_range(0.002..0.04);
        let calls = simulate_calls(&mut rng, n, maf);
        records.push(LocusRecord {
            locus: Locus::new("2", pos, format!("2:{}", pos)),
            calls,
        });
    }

    let ages: Vec<f64> = (0..n).map(|_| rng.gen_range(20.0..80.0)).collect();
    let trait_rows = (0..n)
        .map(|i| {
            let eta = -1.0 + args.effect * causal[i] + 0.01 * (ages[i] - 50.0);
            let p = 1.0 / (1.0 + (-eta).exp());
            let status = (rng.gen::<f64>() < p) as u8 as f64;
            let score = 0.02 * ages[i] + args.effect * causal[i] + standard_normal(&mut rng);
            vec![status, score]
        })
        .collect();
    let traits = TraitTable::new(vec!["status".into(), "score".into()], trait_rows)?;
    let covariates = TraitTable::new(
        vec!["age".into()],
        ages.into_iter().map(|a| vec![a]).collect(),
    )?;

    let samples = (0..n).map(|i| format!("sample{}", i + 1)).collect();
    Ok(Cohort {
        source: MemorySource::new(samples, records),
        tree,
        traits,
        covariates,
    })
}

/// Defaults or the `--config` file, then command-line overrides.
pub fn resolve_config(args: &SimulateArgs, n_threads: usize) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config '{}'", path))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid config '{}'", path))?
        }
        None => AnalysisConfig {
            tests: biobin_core::TestKind::ALL
                .iter()
                .map(|k| k.key().to_string())
                .collect(),
            ..AnalysisConfig::default()
        },
    };
    config.n_threads = n_threads;
    if let Some(tests) = &args.tests {
        config.tests = tests.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(m) = &args.disease_model {
        config.store.disease_model = m.parse()?;
    }
    if let Some(w) = &args.weight_policy {
        config.store.weight_policy = w.parse()?;
    }
    if let Some(m) = args.max_maf {
        config.bins.max_maf = m;
    }
    if let Some(t) = args.expand_threshold {
        config.bins.expand_threshold = t;
    }
    if let Some(s) = args.min_bin_size {
        config.bins.min_bin_size = s;
    }
    Ok(config)
}

fn create(path: &str) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create '{}'", path))?;
    Ok(BufWriter::new(file))
}

pub fn run(args: SimulateArgs, n_threads: usize) -> Result<()> {
    let config = resolve_config(&args, n_threads)?;
    let tests = config.validate()?;

    let mut cohort = simulate_cohort(&args)?;
    let store = GenotypeStore::load(&mut cohort.source, config.store, None)?;
    cohort.tree.assign_loci(&store);
    let bins = BinHierarchy::build(&cohort.tree, &store, &config.bins)?;
    let phenotypes = PhenotypeSet::from_traits(
        &cohort.traits,
        &config.phenotype,
        config.bins.max_maf,
        config.store.rare_case_control,
    );

    let config_path = format!("{}.config.json", args.output_prefix);
    let mut w = create(&config_path)?;
    serde_json::to_writer_pretty(&mut w, &config)?;
    writeln!(w)?;
    w.flush()?;

    let registry = TestRegistry::default();
    let runner = PhenotypeRunner {
        store: &store,
        bins: &bins,
        phenotypes: &phenotypes,
        covariates: Some(&cohort.covariates),
        registry: &registry,
        tests,
        n_threads: config.n_threads,
        maf_range: (config.bins.min_maf, config.bins.max_maf),
    };

    let summary_path = format!("{}.bins.tsv", args.output_prefix);
    let locus_path = format!("{}.loci.tsv", args.output_prefix);
    let loci = if args.no_locus_output {
        None
    } else {
        Some(create(&locus_path)?)
    };
    let outputs = Outputs::new(create(&summary_path)?, loci);
    let reports = runner.run(&outputs)?;
    let (mut summary, loci) = outputs.into_inner()?;
    summary.flush()?;
    if let Some(mut l) = loci {
        l.flush()?;
    }

    for report in &reports {
        for (kind, pvalues) in runner.tests.iter().zip(&report.pvalues) {
            let best = pvalues
                .iter()
                .zip(&report.summaries)
                .min_by(|a, b| a.0.total_cmp(b.0));
            if let Some((p, s)) = best {
                info!("{} / {}: smallest p = {:.3e} ({})", report.phenotype, kind, p, s.name);
            }
        }
    }

    info!("Bin results written to {}", summary_path);
    if !args.no_locus_output {
        info!("Locus results written to {}", locus_path);
    }
    Ok(())
}
