//! # Reconcile Core
//!
//! A bank reconciliation engine that matches ledger movements against
//! expense records when the two feeds share no common key. Candidate
//! groupings are found by a bounded subset-sum search, scored on amount,
//! date, and text agreement, and confirmed matches are applied through an
//! atomic completion workflow.
//!
//! ## Features
//!
//! - **Candidate generation**: One-to-one, one-to-many, and many-to-one
//!   groupings within a configurable amount tolerance
//! - **Confidence scoring**: Amount, date, and text factors weighted
//!   50/30/20, with concept corroboration reported alongside
//! - **Text similarity**: Accent-folding normalization, keyword Jaccard,
//!   character-sequence ratio, and numeric-token overlap
//! - **Suggestion lifecycle**: Pending, applied, and rejected states with
//!   conflict-checked record claims
//! - **Atomic completion**: Transactional apply workflow, plus an explicit
//!   ordered fallback for backends without transactions
//! - **Storage abstraction**: Database-agnostic design with trait-based
//!   storage
//!
//! ## Quick Start
//!
//! ```rust
//! use reconcile_core::{BankMovement, ExpenseRecord, ReconciliationSuggestionEngine};
//! use reconcile_core::utils::MemoryStore;
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//! use std::str::FromStr;
//!
//! let engine = ReconciliationSuggestionEngine::new(MemoryStore::new());
//!
//! let movements = vec![BankMovement::new(
//!     "mov-1".to_string(),
//!     "tenant-1".to_string(),
//!     BigDecimal::from_str("-850.50").unwrap(),
//!     NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
//!     "CARGO PEMEX 5532".to_string(),
//! )];
//! let expenses = vec![ExpenseRecord::new(
//!     "exp-1".to_string(),
//!     "tenant-1".to_string(),
//!     BigDecimal::from_str("850.50").unwrap(),
//!     NaiveDate::from_ymd_opt(2025, 1, 16).unwrap(),
//!     "PEMEX 5532 GASOLINERA".to_string(),
//!     vec!["Combustible Magna sin plomo".to_string()],
//! )];
//!
//! let batch = engine.generate_suggestions(&movements, &expenses).unwrap();
//! assert_eq!(batch.suggestions.len(), 1);
//! ```

pub mod completion;
pub mod engine;
pub mod matching;
pub mod text;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use completion::*;
pub use engine::*;
pub use matching::*;
pub use text::*;
pub use traits::*;
pub use types::*;

// Re-export the tracing bootstrap for demos and service binaries
pub use utils::init_tracing;
