//! Link functions for the two supported model families.
//!
//! Maps between the linear predictor (eta) and the mean (mu).

use serde::{Deserialize, Serialize};

/// Outcome distribution of a regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Quantitative trait, identity link.
    Gaussian,
    /// Case/control status, logit link.
    Binomial,
}

/// Mean/linear-predictor mapping and variance function of a family.
pub trait LinkFunction {
    /// eta = g(mu).
    fn link(&self, mu: f64) -> f64;
    /// mu = g^{-1}(eta).
    fn inv_link(&self, eta: f64) -> f64;
    /// Variance function V(mu).
    fn variance(&self, mu: f64) -> f64;
}

/// Logit link, case/control status.
#[derive(Debug, Clone, Copy)]
pub struct LogitLink;

/// |eta| beyond which exp(-eta) would lose all precision in a double.
const LOGIT_SATURATION: f64 = 36.043_653_389_117_15; // -ln(f64::EPSILON)

impl LinkFunction for LogitLink {
    fn link(&self, mu: f64) -> f64 {
        (mu / (1.0 - mu)).ln()
    }

    fn inv_link(&self, eta: f64) -> f64 {
        if eta > LOGIT_SATURATION {
            1.0 / (1.0 + f64::EPSILON)
        } else if eta < -LOGIT_SATURATION {
            f64::EPSILON
        } else {
            1.0 / (1.0 + (-eta).exp())
        }
    }

    fn variance(&self, mu: f64) -> f64 {
        mu * (1.0 - mu)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IdentityLink;

impl LinkFunction for IdentityLink {
    fn link(&self, mu: f64) -> f64 {
        mu
    }

    fn inv_link(&self, eta: f64) -> f64 {
        eta
    }

    fn variance(&self, _mu: f64) -> f64 {
        1.0
    }
}

pub fn get_link(family: Family) -> Box<dyn LinkFunction + Send + Sync> {
    match family {
        Family::Binomial => Box::new(LogitLink),
        Family::Gaussian => Box::new(IdentityLink),
    }
}
