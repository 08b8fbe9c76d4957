//! Disease models and Madsen–Browning weight combination policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::GenoError;

/// Maps a non-major allele copy count to a burden contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiseaseModel {
    #[default]
    Additive,
    Dominant,
    Recessive,
}

impl DiseaseModel {
    /// Contribution of a sample carrying `copies` (0, 1 or 2) non-major alleles.
    pub fn contribution(self, copies: u8) -> u8 {
        debug_assert!(copies <= 2);
        match self {
            DiseaseModel::Additive => copies,
            DiseaseModel::Dominant => u8::from(copies > 0),
            DiseaseModel::Recessive => u8::from(copies == 2),
        }
    }

    /// Largest contribution a single non-missing sample can make.
    pub fn max_contribution(self) -> u32 {
        match self {
            DiseaseModel::Additive => 2,
            DiseaseModel::Dominant | DiseaseModel::Recessive => 1,
        }
    }
}

impl fmt::Display for DiseaseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiseaseModel::Additive => "additive",
            DiseaseModel::Dominant => "dominant",
            DiseaseModel::Recessive => "recessive",
        };
        f.write_str(s)
    }
}

impl FromStr for DiseaseModel {
    type Err = GenoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "additive" | "a" => Ok(DiseaseModel::Additive),
            "dominant" | "d" => Ok(DiseaseModel::Dominant),
            "recessive" | "r" => Ok(DiseaseModel::Recessive),
            _ => Err(GenoError::UnknownOption {
                kind: "disease model",
                value: s.to_string(),
            }),
        }
    }
}

/// How control and case weights are combined into one locus weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightPolicy {
    #[default]
    Max,
    Min,
    Control,
    Overall,
}

impl fmt::Display for WeightPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WeightPolicy::Max => "max",
            WeightPolicy::Min => "min",
            WeightPolicy::Control => "control",
            WeightPolicy::Overall => "overall",
        };
        f.write_str(s)
    }
}

impl FromStr for WeightPolicy {
    type Err = GenoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" => Ok(WeightPolicy::Max),
            "min" => Ok(WeightPolicy::Min),
            "control" | "control-only" => Ok(WeightPolicy::Control),
            "overall" => Ok(WeightPolicy::Overall),
            _ => Err(GenoError::UnknownOption {
                kind: "weight policy",
                value: s.to_string(),
            }),
        }
    }
}

/// Madsen–Browning weight for a population of `n` informative samples
/// carrying `m` total contribution: `(2N+2) / sqrt(N (M+1) (2N-M+1))`.
///
/// Returns `None` when the population has no informative samples.
pub fn madsen_browning(n: u32, m: u32) -> Option<f64> {
    if n == 0 {
        return None;
    }
    let n = f64::from(n);
    let m = f64::from(m);
    Some((2.0 * n + 2.0) / (n * (m + 1.0) * (2.0 * n - m + 1.0)).sqrt())
}
