//! Text canonicalization and similarity scoring

pub mod normalizer;
pub mod similarity;

pub use normalizer::*;
pub use similarity::*;
