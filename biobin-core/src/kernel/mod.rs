//! Kernel-based (SKAT) association testing.

pub mod davies;
pub mod skat;

pub use davies::{chisq_mixture_upper, qfc, DaviesFault, DaviesResult};
pub use skat::{bin_genotypes, BinGenotypes, KernelTestEngine};
