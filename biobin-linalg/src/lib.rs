//! biobin-linalg: Linear algebra wrappers for BioBin-RS
//!
//! Dense matrix operations and the decompositions used by the
//! regression and kernel association tests.

pub mod dense;
pub mod decomposition;

pub use dense::DenseMatrix;
pub use decomposition::LinalgError;
