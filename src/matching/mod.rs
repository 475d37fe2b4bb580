//! Movement-to-expense scoring and combinatorial split search

pub mod scorer;
pub mod split;

pub use scorer::*;
pub use split::*;
