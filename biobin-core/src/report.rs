//! Per-phenotype result tables.
//!
//! Two tab-separated streams are produced: a bin summary with one row per
//! (phenotype, bin) and one p-value column per test, and a per-locus table
//! listing each rare locus with its population frequencies and bins.

use std::io::Write;

use anyhow::Result;

use biobin_geno::{GenotypeStore, Phenotype, SampleSet};

use crate::bins::{Bin, BinHierarchy};

/// Counts reported next to a bin's p-values.
#[derive(Debug, Clone, PartialEq)]
pub struct BinSummary {
    pub name: String,
    pub kind: &'static str,
    pub n_loci: usize,
    /// Memoized bin size (all samples).
    pub size: u64,
    pub control_total: u64,
    pub case_total: u64,
    /// Observed allele capacity, controls then cases.
    pub capacity: [u32; 2],
}

impl BinSummary {
    pub fn new(bin: &Bin, store: &GenotypeStore, pheno: &Phenotype) -> Self {
        let total_in = |set: &SampleSet| -> u64 {
            bin.loci()
                .iter()
                .map(|&l| u64::from(store.total_contribution_in(l, set)))
                .sum()
        };
        Self {
            name: bin.name().to_string(),
            kind: bin.kind().label(),
            n_loci: bin.n_loci(),
            size: bin.size(store),
            control_total: total_in(&pheno.controls),
            case_total: total_in(&pheno.cases),
            capacity: store.bin_capacity(bin.loci(), pheno),
        }
    }
}

/// All rows of one phenotype, written as a block.
#[derive(Debug, Clone)]
pub struct PhenotypeReport {
    pub phenotype: String,
    pub summaries: Vec<BinSummary>,
    /// `pvalues[t][b]`: test `t`, bin `b`.
    pub pvalues: Vec<Vec<f64>>,
}

pub fn write_summary_header(writer: &mut impl Write, tests: &[&str]) -> Result<()> {
    write!(
        writer,
        "phenotype\tbin\tkind\tn_loci\tsize\tcontrol_total\tcase_total\tcontrol_capacity\tcase_capacity"
    )?;
    for t in tests {
        write!(writer, "\tp.{}", t)?;
    }
    writeln!(writer)?;
    Ok(())
}

impl PhenotypeReport {
    pub fn write_summary(&self, writer: &mut impl Write) -> Result<()> {
        for (b, s) in self.summaries.iter().enumerate() {
            write!(
                writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                self.phenotype,
                s.name,
                s.kind,
                s.n_loci,
                s.size,
                s.control_total,
                s.case_total,
                s.capacity[0],
                s.capacity[1]
            )?;
            for p in &self.pvalues {
                write!(writer, "\t{:.6e}", p[b])?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

pub fn write_locus_header(writer: &mut impl Write) -> Result<()> {
    writeln!(
        writer,
        "phenotype\tlocus\tchrom\tpos\tmaf_controls\tmaf_cases\trare\tbins"
    )?;
    Ok(())
}

fn fmt_maf(maf: Option<f64>) -> String {
    maf.map_or_else(|| "NA".to_string(), |m| format!("{:.6}", m))
}

/// One row per rare locus: frequencies by population and bin membership.
pub fn write_locus_bins(
    writer: &mut impl Write,
    store: &GenotypeStore,
    bins: &BinHierarchy,
    pheno: &Phenotype,
    maf_range: (f64, f64),
) -> Result<()> {
    for &id in bins.rare_loci() {
        let locus = store.locus(id);
        let names: Vec<&str> = bins
            .locus_bins(id)
            .iter()
            .map(|&b| bins.bin(b).name())
            .collect();
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            pheno.name,
            locus.id,
            locus.chrom,
            locus.pos,
            fmt_maf(store.minor_allele_freq(id, Some(&pheno.controls))),
            fmt_maf(store.minor_allele_freq(id, Some(&pheno.cases))),
            u8::from(store.is_rare(id, pheno, maf_range.0, maf_range.1)),
            if names.is_empty() { "-".to_string() } else { names.join(";") }
        )?;
    }
    Ok(())
}
