//! Bins: named sets of rare loci tested as one unit.

pub mod bin;
pub mod hierarchy;

pub use bin::{Bin, BinKind};
pub use hierarchy::{BinHierarchy, BinId};
