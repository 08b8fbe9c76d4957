//! Phenotype status and covariate tables.
//!
//! Trait values arrive per sample (NaN for missing). A value equal to the
//! configured control value marks a control, any other observed value a
//! case. Each phenotype is then checked for a usable control fraction.

use std::collections::HashMap;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::sample_set::SampleSet;

/// Settings for case/control status derivation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhenotypeConfig {
    /// Trait value that marks a control.
    pub control_value: f64,
    /// Below this control fraction every sample is treated as a control.
    pub min_control_fraction: f64,
}

impl Default for PhenotypeConfig {
    fn default() -> Self {
        Self {
            control_value: 0.0,
            min_control_fraction: 0.125,
        }
    }
}

/// Sample x column table of trait or covariate values.
#[derive(Debug, Clone, Default)]
pub struct TraitTable {
    /// Column names.
    pub names: Vec<String>,
    /// values[i][j] = sample i, column j. NaN for missing.
    pub values: Vec<Vec<f64>>,
}

impl TraitTable {
    pub fn new(names: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self> {
        for (i, row) in values.iter().enumerate() {
            ensure!(
                row.len() == names.len(),
                "sample {} has {} values for {} columns",
                i,
                row.len(),
                names.len()
            );
        }
        Ok(Self { names, values })
    }

    /// Reorder rows to follow `sample_order`; samples absent from
    /// `row_ids` get an all-missing row.
    pub fn aligned(
        names: Vec<String>,
        row_ids: &[String],
        rows: Vec<Vec<f64>>,
        sample_order: &[String],
    ) -> Result<Self> {
        ensure!(
            row_ids.len() == rows.len(),
            "row id count does not match row count"
        );
        let lookup: HashMap<&str, usize> = row_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let width = names.len();
        let values = sample_order
            .iter()
            .map(|id| match lookup.get(id.as_str()) {
                Some(&r) => rows[r].clone(),
                None => vec![f64::NAN; width],
            })
            .collect();
        Self::new(names, values)
    }

    pub fn n_samples(&self) -> usize {
        self.values.len()
    }

    pub fn n_columns(&self) -> usize {
        self.names.len()
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.values.iter().map(|row| row[j]).collect()
    }

    /// True when every column of sample `i` is observed.
    pub fn row_complete(&self, i: usize) -> bool {
        self.values[i].iter().all(|v| !v.is_nan())
    }
}

/// One analysed phenotype with its case/control partition.
#[derive(Debug, Clone)]
pub struct Phenotype {
    pub index: usize,
    pub name: String,
    /// Raw trait value per sample, NaN for missing.
    pub values: Vec<f64>,
    pub controls: SampleSet,
    pub cases: SampleSet,
}

impl Phenotype {
    pub fn n_samples(&self) -> usize {
        self.values.len()
    }

    /// Samples in either population.
    pub fn analysed(&self) -> SampleSet {
        self.controls.union(&self.cases)
    }

    /// 0 for a control, 1 for a case, `None` when excluded.
    pub fn status(&self, i: usize) -> Option<f64> {
        if self.controls.contains(i) {
            Some(0.0)
        } else if self.cases.contains(i) {
            Some(1.0)
        } else {
            None
        }
    }
}

/// All phenotypes of a run, in input order.
#[derive(Debug, Clone)]
pub struct PhenotypeSet {
    pub phenotypes: Vec<Phenotype>,
}

impl PhenotypeSet {
    /// A single unnamed phenotype in which every sample is a control.
    pub fn all_controls(n_samples: usize) -> Self {
        Self {
            phenotypes: vec![Phenotype {
                index: 0,
                name: String::new(),
                values: vec![0.0; n_samples],
                controls: SampleSet::full(n_samples),
                cases: SampleSet::empty(n_samples),
            }],
        }
    }

    /// Derive case/control status for every column of `traits`.
    ///
    /// `maf_cutoff` is only used to warn when the cohort is too small for
    /// any polymorphic locus to count as rare.
    pub fn from_traits(
        traits: &TraitTable,
        config: &PhenotypeConfig,
        maf_cutoff: f64,
        rare_case_control: bool,
    ) -> Self {
        let n = traits.n_samples();
        let phenotypes = (0..traits.n_columns())
            .map(|j| {
                let values = traits.column(j);
                let mut controls = SampleSet::empty(n);
                let mut cases = SampleSet::empty(n);
                for (i, &v) in values.iter().enumerate() {
                    if v == config.control_value {
                        controls.insert(i);
                    } else if !v.is_nan() {
                        cases.insert(i);
                    }
                }
                let mut pheno = Phenotype {
                    index: j,
                    name: traits.names[j].clone(),
                    values,
                    controls,
                    cases,
                };
                check_balance(&mut pheno, config, maf_cutoff, rare_case_control);
                pheno
            })
            .collect();
        Self { phenotypes }
    }

    pub fn len(&self) -> usize {
        self.phenotypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phenotypes.is_empty()
    }
}

fn check_balance(
    pheno: &mut Phenotype,
    config: &PhenotypeConfig,
    maf_cutoff: f64,
    rare_case_control: bool,
) {
    let mut n_controls = pheno.controls.count();
    let mut n_cases = pheno.cases.count();
    let total = n_controls + n_cases;
    if total == 0 {
        warn!("Phenotype '{}' has no observed values", pheno.name);
        return;
    }

    let control_frac = n_controls as f64 / total as f64;
    if control_frac < config.min_control_fraction {
        warn!(
            "In phenotype '{}', controls are fewer than {}% of the data; using all individuals as controls",
            pheno.name,
            config.min_control_fraction * 100.0
        );
        let n_samples = pheno.n_samples();
        let cases = std::mem::replace(&mut pheno.cases, SampleSet::empty(n_samples));
        pheno.controls.union_with(&cases);
        n_controls = total;
        n_cases = 0;
    } else if n_cases > 0 && 1.0 - control_frac < config.min_control_fraction {
        warn!(
            "In phenotype '{}', cases are fewer than {}% of the data; case allele frequencies may be unreliable",
            pheno.name,
            config.min_control_fraction * 100.0
        );
    }

    if 1.0 / (2.0 * n_controls as f64) > maf_cutoff {
        warn!(
            "MAF cutoff is so low that only variants fixed in controls are rare for phenotype '{}'",
            pheno.name
        );
    }
    if rare_case_control && n_cases > 0 && 1.0 / (2.0 * n_cases as f64) > maf_cutoff {
        warn!(
            "MAF cutoff is so low that only variants fixed in cases are rare for phenotype '{}'",
            pheno.name
        );
    }
}

/// Samples with an observed phenotype and every covariate observed.
pub fn valid_sample_indices(phenotype: &[f64], covariates: Option<&TraitTable>) -> Vec<usize> {
    (0..phenotype.len())
        .filter(|&i| !phenotype[i].is_nan())
        .filter(|&i| covariates.map_or(true, |c| c.row_complete(i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_trait(values: &[f64]) -> TraitTable {
        TraitTable::new(
            vec!["y".into()],
            values.iter().map(|&v| vec![v]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_status_from_values() {
        let t = single_trait(&[0.0, 1.0, f64::NAN, 0.0, 2.0, 0.0, 0.0, 0.0]);
        let set = PhenotypeSet::from_traits(&t, &PhenotypeConfig::default(), 0.5, false);
        let p = &set.phenotypes[0];
        assert_eq!(p.controls.iter().collect::<Vec<_>>(), vec![0, 3, 5, 6, 7]);
        assert_eq!(p.cases.iter().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(p.status(2), None);
        assert!(p.controls.is_disjoint(&p.cases));
    }

    #[test]
    fn test_too_few_controls_widens() {
        // 1 control out of 10 is below 12.5%.
        let mut v = vec![1.0; 10];
        v[0] = 0.0;
        let set = PhenotypeSet::from_traits(&single_trait(&v), &PhenotypeConfig::default(), 0.5, false);
        let p = &set.phenotypes[0];
        assert_eq!(p.controls.count(), 10);
        assert!(p.cases.is_empty());
    }

    #[test]
    fn test_all_controls_no_cases() {
        let set = PhenotypeSet::from_traits(
            &single_trait(&[0.0; 10]),
            &PhenotypeConfig::default(),
            0.05,
            false,
        );
        let p = &set.phenotypes[0];
        assert_eq!(p.controls.count(), 10);
        assert_eq!(p.cases.count(), 0);
    }

    #[test]
    fn test_aligned_fills_missing() {
        let t = TraitTable::aligned(
            vec!["age".into()],
            &["s2".to_string(), "s1".to_string()],
            vec![vec![20.0], vec![10.0]],
            &["s1".to_string(), "s2".to_string(), "s3".to_string()],
        )
        .unwrap();
        assert_eq!(t.values[0], vec![10.0]);
        assert_eq!(t.values[1], vec![20.0]);
        assert!(t.values[2][0].is_nan());
    }

    #[test]
    fn test_valid_sample_indices() {
        let cov = TraitTable::new(vec!["x".into()], vec![vec![1.0], vec![f64::NAN], vec![3.0]]).unwrap();
        let valid = valid_sample_indices(&[1.0, 0.0, f64::NAN], Some(&cov));
        assert_eq!(valid, vec![0]);
    }
}
