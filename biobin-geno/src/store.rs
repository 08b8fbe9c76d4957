//! The genotype store: every locus of the study, encoded once at load
//! time and read-only afterwards.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::encoding::{AlleleCounts, EncodedLocus, GenotypeState};
use crate::locus::{Locus, LocusId};
use crate::model::{madsen_browning, DiseaseModel, WeightPolicy};
use crate::phenotype::Phenotype;
use crate::sample_set::SampleSet;
use crate::traits::{GenotypeSource, LocusWeightLookup};

/// Settings fixed for the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub disease_model: DiseaseModel,
    pub weight_policy: WeightPolicy,
    /// Multiply in the Madsen–Browning weight.
    pub use_calculated_weights: bool,
    /// A locus is rare when rare in controls or in cases.
    pub rare_case_control: bool,
    /// Keep loci that carry no non-major allele.
    pub keep_monomorphic: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            disease_model: DiseaseModel::Additive,
            weight_policy: WeightPolicy::Max,
            use_calculated_weights: true,
            rare_case_control: true,
            keep_monomorphic: false,
        }
    }
}

#[derive(Debug)]
pub struct GenotypeStore {
    config: StoreConfig,
    sample_ids: Vec<String>,
    loci: Vec<Locus>,
    genotypes: Vec<EncodedLocus>,
    custom_weights: Vec<Option<f64>>,
    everyone: SampleSet,
}

impl GenotypeStore {
    /// Drain `source`, encoding each locus.
    ///
    /// Loci that are monomorphic under the encoding, or that contribute
    /// nothing under the disease model, are dropped unless
    /// `keep_monomorphic` is set.
    pub fn load<S: GenotypeSource + ?Sized>(
        source: &mut S,
        config: StoreConfig,
        weights: Option<&dyn LocusWeightLookup>,
    ) -> Result<Self> {
        let sample_ids = source.sample_ids().to_vec();
        let n = sample_ids.len();
        let everyone = SampleSet::full(n);

        let mut loci = Vec::new();
        let mut genotypes = Vec::new();
        let mut custom_weights = Vec::new();
        let mut n_read = 0usize;
        let mut n_dropped = 0usize;

        while let Some(record) = source.next_record()? {
            n_read += 1;
            ensure!(
                record.calls.len() == n,
                "locus {} has {} calls, expected {}",
                record.locus,
                record.calls.len(),
                n
            );
            let encoded = EncodedLocus::encode(&record.calls);
            if !config.keep_monomorphic {
                let contrib = model_total(config.disease_model, &encoded.counts(everyone.words()));
                if encoded.n_alleles < 2 || contrib == 0 {
                    debug!("Dropping monomorphic locus {}", record.locus);
                    n_dropped += 1;
                    continue;
                }
            }
            ensure!(loci.len() < u32::MAX as usize, "too many loci");
            custom_weights.push(weights.and_then(|w| w.weight(&record.locus)));
            loci.push(record.locus);
            genotypes.push(encoded);
        }

        info!(
            "Loaded {} loci for {} samples ({} of {} dropped as monomorphic)",
            loci.len(),
            n,
            n_dropped,
            n_read
        );

        Ok(Self {
            config,
            sample_ids,
            loci,
            genotypes,
            custom_weights,
            everyone,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_loci(&self) -> usize {
        self.loci.len()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn locus(&self, id: LocusId) -> &Locus {
        &self.loci[id.index()]
    }

    /// All locus ids in load order.
    pub fn locus_ids(&self) -> impl Iterator<Item = LocusId> + '_ {
        (0..self.loci.len()).map(|i| LocusId(i as u32))
    }

    pub fn genotype(&self, id: LocusId, sample: usize) -> GenotypeState {
        self.genotypes[id.index()].state(sample)
    }

    /// Raw counts over `subset`, or over every sample.
    pub fn counts(&self, id: LocusId, subset: Option<&SampleSet>) -> AlleleCounts {
        let words = subset.unwrap_or(&self.everyone).words();
        self.genotypes[id.index()].counts(words)
    }

    /// Sum of model-mapped copies over all non-missing samples.
    pub fn total_contribution(&self, id: LocusId) -> u32 {
        model_total(self.config.disease_model, &self.counts(id, None))
    }

    /// Sum of model-mapped copies over the non-missing members of `subset`.
    pub fn total_contribution_in(&self, id: LocusId, subset: &SampleSet) -> u32 {
        model_total(self.config.disease_model, &self.counts(id, Some(subset)))
    }

    /// Minor allele frequency over `subset` (all samples if `None`).
    ///
    /// `None` when no member of the subset has an observed call.
    pub fn minor_allele_freq(&self, id: LocusId, subset: Option<&SampleSet>) -> Option<f64> {
        let c = self.counts(id, subset);
        if c.nonmissing == 0 {
            return None;
        }
        let f = f64::from(c.minor_alleles()) / (2.0 * f64::from(c.nonmissing));
        Some(f.min(1.0 - f))
    }

    /// Rare in controls, or in cases when `rare_case_control` is set.
    pub fn is_rare(&self, id: LocusId, pheno: &Phenotype, lower: f64, upper: f64) -> bool {
        let in_range = |maf: Option<f64>| maf.is_some_and(|m| m >= lower && m <= upper);
        in_range(self.minor_allele_freq(id, Some(&pheno.controls)))
            || (self.config.rare_case_control
                && in_range(self.minor_allele_freq(id, Some(&pheno.cases))))
    }

    /// Madsen–Browning weight of a locus under the configured policy.
    pub fn calculated_weight(&self, id: LocusId, pheno: &Phenotype) -> f64 {
        let ctrl = self.counts(id, Some(&pheno.controls));
        let case = self.counts(id, Some(&pheno.cases));

        match self.config.weight_policy {
            WeightPolicy::Overall => madsen_browning(
                ctrl.nonmissing + case.nonmissing,
                ctrl.minor_alleles() + case.minor_alleles(),
            )
            .unwrap_or(1.0),
            WeightPolicy::Control => {
                madsen_browning(ctrl.nonmissing, ctrl.minor_alleles()).unwrap_or(1.0)
            }
            policy => {
                let w_u = madsen_browning(ctrl.nonmissing, ctrl.minor_alleles());
                let w_a = madsen_browning(case.nonmissing, case.minor_alleles());
                match (w_u, w_a) {
                    (Some(u), Some(a)) if policy == WeightPolicy::Max => u.max(a),
                    (Some(u), Some(a)) => u.min(a),
                    (Some(u), None) => u,
                    (None, Some(a)) => a,
                    (None, None) => 1.0,
                }
            }
        }
    }

    /// Custom weight (if any) times calculated weight (if enabled).
    pub fn locus_weight(&self, id: LocusId, pheno: &Phenotype) -> f64 {
        let custom = self.custom_weights[id.index()].unwrap_or(1.0);
        if self.config.use_calculated_weights {
            custom * self.calculated_weight(id, pheno)
        } else {
            custom
        }
    }

    /// Copies after the model mapping; missing maps to 0.
    pub fn individual_contribution(&self, id: LocusId, sample: usize, model: DiseaseModel) -> u32 {
        self.genotype(id, sample)
            .copies()
            .map_or(0, |c| u32::from(model.contribution(c)))
    }

    /// Model-mapped genotype under the configured model, `None` if missing.
    pub fn individual_genotype(&self, id: LocusId, sample: usize) -> Option<u8> {
        self.genotype(id, sample)
            .copies()
            .map(|c| self.config.disease_model.contribution(c))
    }

    /// Mean model-mapped genotype over observed members of `samples`.
    pub fn average_genotype(&self, id: LocusId, samples: &[usize]) -> Option<f64> {
        let (sum, n) = samples
            .iter()
            .filter_map(|&i| self.individual_genotype(id, i))
            .fold((0u32, 0u32), |(s, n), g| (s + u32::from(g), n + 1));
        (n > 0).then(|| f64::from(sum) / f64::from(n))
    }

    /// Observed allele capacity of a set of loci in controls and cases.
    pub fn bin_capacity(&self, loci: &[LocusId], pheno: &Phenotype) -> [u32; 2] {
        let mut cap = [0u32; 2];
        for &id in loci {
            cap[0] += self.counts(id, Some(&pheno.controls)).nonmissing;
            cap[1] += self.counts(id, Some(&pheno.cases)).nonmissing;
        }
        let factor = self.config.disease_model.max_contribution();
        [cap[0] * factor, cap[1] * factor]
    }

    /// Weighted burden of `loci` for each sample in `samples`.
    pub fn burden(&self, loci: &[LocusId], pheno: &Phenotype, samples: &[usize]) -> Vec<f64> {
        let model = self.config.disease_model;
        let mut out = vec![0.0; samples.len()];
        for &id in loci {
            let w = self.locus_weight(id, pheno);
            for (slot, &i) in out.iter_mut().zip(samples) {
                let c = self.individual_contribution(id, i, model);
                if c > 0 {
                    *slot += f64::from(c) * w;
                }
            }
        }
        out
    }
}

fn model_total(model: DiseaseModel, c: &AlleleCounts) -> u32 {
    match model {
        DiseaseModel::Additive => 2 * c.hom_minor + c.het,
        DiseaseModel::Dominant => c.hom_minor + c.het,
        DiseaseModel::Recessive => c.hom_minor,
    }
}
