//! Suggestion generation and lifecycle orchestration

pub mod suggestion;

pub use suggestion::*;
