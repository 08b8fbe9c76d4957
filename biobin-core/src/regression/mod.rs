//! Linear and logistic regression with collinearity handling, and the
//! per-phenotype burden regression engine built on them.

pub mod collinear;
pub mod engine;
pub mod fit;
pub mod link;
pub mod null_model;

use biobin_linalg::{DenseMatrix, LinalgError};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use thiserror::Error;

pub use collinear::{detect_collinear, ColumnPermutation};
pub use engine::{EngineState, RegressionEngine};
pub use fit::fit;
pub use link::Family;
pub use null_model::NullModel;

/// Why a null model could not be set up for a phenotype.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegressionError {
    #[error("{n} usable samples for {p} design columns")]
    TooFewSamples { n: usize, p: usize },

    #[error("no cases among the usable samples")]
    NoCases,

    #[error("no controls among the usable samples")]
    NoControls,

    #[error("null model did not converge")]
    NotConverged,

    #[error(transparent)]
    Linalg(#[from] LinalgError),
}

/// Outcome of one regression fit, in the column order of the input design.
#[derive(Debug, Clone)]
pub struct RegressionResult {
    pub family: Family,
    /// NaN for dropped (not estimable) columns.
    pub coefficients: Vec<f64>,
    /// Zero rows and columns for dropped columns.
    pub covariance: DenseMatrix,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub deviance: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Input column indices removed as collinear.
    pub dropped: Vec<usize>,
    pub rank: usize,
}

impl RegressionResult {
    pub fn n_samples(&self) -> usize {
        self.fitted.len()
    }

    /// Residual degrees of freedom.
    pub fn df_residual(&self) -> usize {
        self.n_samples().saturating_sub(self.rank)
    }

    pub fn std_error(&self, j: usize) -> f64 {
        self.covariance.get(j, j).sqrt()
    }

    /// Two-sided Wald p-value of coefficient `j`.
    ///
    /// Student-t with residual df for the Gaussian family, standard normal
    /// for the binomial family. Anything not estimable gives 1.
    pub fn wald_p_value(&self, j: usize) -> f64 {
        let beta = self.coefficients[j];
        let se = self.std_error(j);
        if !self.converged || !beta.is_finite() || !se.is_finite() || se <= 0.0 {
            return 1.0;
        }
        let t = beta / se;
        let p = match self.family {
            Family::Gaussian => match StudentsT::new(0.0, 1.0, self.df_residual() as f64) {
                Ok(d) => 2.0 * d.cdf(-t.abs()),
                Err(_) => return 1.0,
            },
            Family::Binomial => match Normal::new(0.0, 1.0) {
                Ok(d) => 2.0 * d.cdf(-t.abs()),
                Err(_) => return 1.0,
            },
        };
        p.clamp(0.0, 1.0)
    }
}
