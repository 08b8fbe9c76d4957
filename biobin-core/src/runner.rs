//! Phenotype-level parallel driver.
//!
//! Workers pull the next phenotype index from a shared cursor and run it
//! end to end: initialise every selected test, test every bin, then write
//! the phenotype's block to each output while holding that output's lock.

use std::io::Write;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use biobin_geno::{GenotypeStore, Phenotype, PhenotypeSet, TraitTable};

use crate::assoc::{TestContext, TestKind, TestRegistry};
use crate::bins::BinHierarchy;
use crate::report::{self, BinSummary, PhenotypeReport};

pub struct PhenotypeRunner<'a> {
    pub store: &'a GenotypeStore,
    pub bins: &'a BinHierarchy,
    pub phenotypes: &'a PhenotypeSet,
    pub covariates: Option<&'a TraitTable>,
    pub registry: &'a TestRegistry,
    pub tests: Vec<TestKind>,
    pub n_threads: usize,
    /// MAF range used for the per-locus rarity flag.
    pub maf_range: (f64, f64),
}

/// Output streams, each behind its own lock.
pub struct Outputs<S, L> {
    pub summary: Mutex<S>,
    pub loci: Option<Mutex<L>>,
}

impl<S: Write + Send, L: Write + Send> Outputs<S, L> {
    pub fn new(summary: S, loci: Option<L>) -> Self {
        Self {
            summary: Mutex::new(summary),
            loci: loci.map(Mutex::new),
        }
    }

    pub fn into_inner(self) -> Result<(S, Option<L>)> {
        let summary = self
            .summary
            .into_inner()
            .map_err(|_| anyhow!("summary writer lock poisoned"))?;
        let loci = match self.loci {
            Some(m) => Some(m.into_inner().map_err(|_| anyhow!("locus writer lock poisoned"))?),
            None => None,
        };
        Ok((summary, loci))
    }
}

impl PhenotypeRunner<'_> {
    /// Run one phenotype: every test on every bin.
    pub fn process(&self, pheno: &Phenotype) -> Result<PhenotypeReport> {
        let ctx = TestContext {
            store: self.store,
            phenotype: pheno,
            covariates: self.covariates,
        };
        let mut pvalues = Vec::with_capacity(self.tests.len());
        for &kind in &self.tests {
            let mut test = self.registry.create_kind(kind)?;
            test.init(&ctx);
            pvalues.push(test.run_all(&ctx, self.bins));
            debug!("Phenotype '{}': {} done", pheno.name, kind);
        }
        let summaries = self
            .bins
            .bins()
            .iter()
            .map(|b| BinSummary::new(b, self.store, pheno))
            .collect();
        Ok(PhenotypeReport {
            phenotype: pheno.name.clone(),
            summaries,
            pvalues,
        })
    }

    fn emit<S: Write + Send, L: Write + Send>(
        &self,
        pheno: &Phenotype,
        report: &PhenotypeReport,
        out: &Outputs<S, L>,
    ) -> Result<()> {
        {
            let mut w = out
                .summary
                .lock()
                .map_err(|_| anyhow!("summary writer lock poisoned"))?;
            report.write_summary(&mut *w)?;
        }
        if let Some(loci) = &out.loci {
            let mut w = loci
                .lock()
                .map_err(|_| anyhow!("locus writer lock poisoned"))?;
            report::write_locus_bins(&mut *w, self.store, self.bins, pheno, self.maf_range)?;
        }
        Ok(())
    }

    /// Write headers, then process every phenotype on `n_threads` workers.
    ///
    /// Returns the reports in phenotype order.
    pub fn run<S: Write + Send, L: Write + Send>(
        &self,
        out: &Outputs<S, L>,
    ) -> Result<Vec<PhenotypeReport>> {
        {
            let names: Vec<&str> = self.tests.iter().map(|k| k.key()).collect();
            let mut w = out
                .summary
                .lock()
                .map_err(|_| anyhow!("summary writer lock poisoned"))?;
            report::write_summary_header(&mut *w, &names)?;
        }
        if let Some(loci) = &out.loci {
            let mut w = loci
                .lock()
                .map_err(|_| anyhow!("locus writer lock poisoned"))?;
            report::write_locus_header(&mut *w)?;
        }

        let n = self.phenotypes.len();
        let n_workers = self.n_threads.max(1).min(n.max(1));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .build()
            .context("Failed to build worker pool")?;
        info!(
            "Testing {} phenotypes x {} bins x {} tests on {} workers",
            n,
            self.bins.len(),
            self.tests.len(),
            n_workers
        );

        let cursor = Mutex::new(0usize);
        let results: Mutex<Vec<(usize, Result<PhenotypeReport>)>> = Mutex::new(Vec::new());

        pool.scope(|s| {
            for _ in 0..n_workers {
                s.spawn(|_| loop {
                    let idx = {
                        let Ok(mut c) = cursor.lock() else { return };
                        if *c >= n {
                            return;
                        }
                        *c += 1;
                        *c - 1
                    };
                    let pheno = &self.phenotypes.phenotypes[idx];
                    let outcome = self
                        .process(pheno)
                        .and_then(|r| self.emit(pheno, &r, out).map(|_| r))
                        .with_context(|| format!("Phenotype '{}'", pheno.name));
                    if let Ok(mut r) = results.lock() {
                        r.push((idx, outcome));
                    }
                });
            }
        });

        let mut results = results
            .into_inner()
            .map_err(|_| anyhow!("result lock poisoned"))?;
        if results.len() != n {
            return Err(anyhow!("{} of {} phenotypes finished", results.len(), n));
        }
        results.sort_by_key(|(i, _)| *i);
        results.into_iter().map(|(_, r)| r).collect()
    }
}
