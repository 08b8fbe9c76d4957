//! NullModel: the covariate-only fit shared by every bin of a phenotype.
//!
//! Holds what the burden and kernel tests need per bin:
//! - the included samples and their outcome
//! - the reduced design (intercept plus non-collinear covariates)
//! - fitted values and residuals

use tracing::{debug, warn};

use biobin_geno::{phenotype::valid_sample_indices, Phenotype, TraitTable};
use biobin_linalg::DenseMatrix;

use super::collinear::detect_collinear;
use super::fit::fit;
use super::link::{get_link, Family};
use super::RegressionError;

#[derive(Debug, Clone)]
pub struct NullModel {
    pub family: Family,
    /// Sample indices in model row order.
    pub included: Vec<usize>,
    /// Names of the design columns kept, "(intercept)" first.
    pub columns: Vec<String>,
    /// Design matrix (included samples x kept columns).
    pub x: DenseMatrix,
    /// Outcome: trait value, or 0/1 status for the binomial family.
    pub y: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
}

impl NullModel {
    /// Fit `y ~ 1 + covariates` over the samples usable for `pheno`.
    ///
    /// One extra design column is reserved for the burden, so at least
    /// `2 + n_covariates` samples are required.
    pub fn fit(
        family: Family,
        pheno: &Phenotype,
        covariates: Option<&TraitTable>,
    ) -> Result<Self, RegressionError> {
        let mut included = valid_sample_indices(&pheno.values, covariates);
        if family == Family::Binomial {
            included.retain(|&i| pheno.status(i).is_some());
        }
        let n_cov = covariates.map_or(0, |c| c.n_columns());
        let p = n_cov + 2;
        if included.len() < p {
            return Err(RegressionError::TooFewSamples {
                n: included.len(),
                p,
            });
        }

        let y: Vec<f64> = match family {
            Family::Gaussian => included.iter().map(|&i| pheno.values[i]).collect(),
            Family::Binomial => included
                .iter()
                .map(|&i| pheno.status(i).unwrap_or(0.0))
                .collect(),
        };
        if family == Family::Binomial {
            let n_cases = y.iter().filter(|&&v| v > 0.5).count();
            if n_cases == 0 {
                return Err(RegressionError::NoCases);
            }
            if n_cases == y.len() {
                return Err(RegressionError::NoControls);
            }
        }

        let mut columns = vec!["(intercept)".to_string()];
        let mut data = vec![vec![1.0; included.len()]];
        if let Some(cov) = covariates {
            for j in 0..cov.n_columns() {
                columns.push(cov.names[j].clone());
                data.push(included.iter().map(|&i| cov.values[i][j]).collect());
            }
        }
        let mut x = DenseMatrix::from_columns(included.len(), &data);

        let mut dropped = detect_collinear(&x)?;
        if !dropped.is_empty() {
            dropped.sort_unstable();
            let names: Vec<&str> = dropped.iter().map(|&j| columns[j].as_str()).collect();
            warn!(
                "Phenotype '{}': removing collinear covariates {:?}",
                pheno.name, names
            );
            let kept: Vec<usize> = (0..columns.len()).filter(|j| !dropped.contains(j)).collect();
            x = x.select_columns(&kept);
            columns = kept.iter().map(|&j| columns[j].clone()).collect();
        }

        let result = fit(&x, &y, family)?;
        if !result.converged {
            return Err(RegressionError::NotConverged);
        }
        debug!(
            "Phenotype '{}': null model on {} samples, {} columns, {} iterations",
            pheno.name,
            included.len(),
            columns.len(),
            result.iterations
        );

        Ok(Self {
            family,
            included,
            columns,
            x,
            y,
            coefficients: result.coefficients,
            fitted: result.fitted,
            residuals: result.residuals,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.included.len()
    }

    /// Sample variance of the residuals (n - 1 denominator).
    pub fn residual_variance(&self) -> f64 {
        let n = self.residuals.len();
        if n < 2 {
            return f64::NAN;
        }
        let mean = self.residuals.iter().sum::<f64>() / n as f64;
        self.residuals
            .iter()
            .map(|r| (r - mean) * (r - mean))
            .sum::<f64>()
            / (n - 1) as f64
    }

    /// Diagonal of V: 1 for the Gaussian family, pi(1 - pi) for binomial.
    pub fn variance_weights(&self) -> Vec<f64> {
        let link = get_link(self.family);
        self.fitted.iter().map(|&m| link.variance(m)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biobin_geno::{PhenotypeConfig, PhenotypeSet};

    fn pheno_from(values: &[f64]) -> Phenotype {
        let traits = TraitTable::new(
            vec!["y".into()],
            values.iter().map(|&v| vec![v]).collect(),
        )
        .unwrap();
        PhenotypeSet::from_traits(&traits, &PhenotypeConfig::default(), 0.05, false)
            .phenotypes
            .remove(0)
    }

    #[test]
    fn test_excludes_missing_phenotype_and_covariates() {
        let pheno = pheno_from(&[0.0, 1.0, f64::NAN, 0.0, 1.0, 0.0, 1.0, 0.0]);
        let cov = TraitTable::new(
            vec!["age".into()],
            vec![
                vec![30.0],
                vec![41.0],
                vec![50.0],
                vec![f64::NAN],
                vec![35.0],
                vec![62.0],
                vec![44.0],
                vec![27.0],
            ],
        )
        .unwrap();
        let null = NullModel::fit(Family::Binomial, &pheno, Some(&cov)).unwrap();
        assert_eq!(null.included, vec![0, 1, 4, 5, 6, 7]);
        assert_eq!(null.columns, vec!["(intercept)", "age"]);
    }

    #[test]
    fn test_logistic_needs_both_groups() {
        let pheno = pheno_from(&[0.0; 6]);
        assert_eq!(
            NullModel::fit(Family::Binomial, &pheno, None).unwrap_err(),
            RegressionError::NoCases
        );
    }

    #[test]
    fn test_too_few_samples() {
        let pheno = pheno_from(&[0.0, 1.0, f64::NAN]);
        let cov = TraitTable::new(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0], vec![2.0, 1.0], vec![3.0, 3.0]],
        )
        .unwrap();
        assert!(matches!(
            NullModel::fit(Family::Gaussian, &pheno, Some(&cov)),
            Err(RegressionError::TooFewSamples { n: 2, p: 4 })
        ));
    }

    #[test]
    fn test_duplicate_covariate_removed() {
        let pheno = pheno_from(&[0.5, 1.2, 0.0, 2.4, 1.9, 0.3, 0.0, 1.1]);
        let age = [30.0, 41.0, 50.0, 33.0, 35.0, 62.0, 44.0, 27.0];
        let cov = TraitTable::new(
            vec!["age".into(), "age_copy".into()],
            age.iter().map(|&a| vec![a, a]).collect(),
        )
        .unwrap();
        let null = NullModel::fit(Family::Gaussian, &pheno, Some(&cov)).unwrap();
        assert_eq!(null.columns, vec!["(intercept)", "age"]);
        assert_eq!(null.x.ncols(), 2);
    }

    #[test]
    fn test_linear_residual_variance_and_weights() {
        let pheno = pheno_from(&[0.0, 2.0, 4.0, 0.0, 2.0, 4.0]);
        let null = NullModel::fit(Family::Gaussian, &pheno, None).unwrap();
        // Intercept-only: residuals are deviations from the mean 2.
        assert!((null.residual_variance() - 16.0 / 5.0).abs() < 1e-10);
        assert_eq!(null.variance_weights(), vec![1.0; 6]);
    }
}
