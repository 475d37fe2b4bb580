//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::completion::{CompletionStep, ReconciliationNeeded};
use crate::types::*;

/// Storage abstraction for suggestion persistence
///
/// This trait allows the engine to work with any storage backend
/// (PostgreSQL, MySQL, SQLite, in-memory, etc.) by implementing these
/// methods. Suggestion rows are plain bookkeeping; allocation claims are
/// only ever written through a completion workflow.
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    /// Persist a suggestion
    async fn save_suggestion(&mut self, suggestion: &MatchSuggestion) -> ReconcileResult<()>;

    /// Get a suggestion by id
    async fn get_suggestion(&self, suggestion_id: &str) -> ReconcileResult<Option<MatchSuggestion>>;

    /// List suggestions for a tenant, optionally filtered by status
    async fn list_suggestions(
        &self,
        tenant_id: &str,
        status: Option<SuggestionStatus>,
    ) -> ReconcileResult<Vec<MatchSuggestion>>;

    /// Update only the status of a stored suggestion
    async fn update_suggestion_status(
        &mut self,
        suggestion_id: &str,
        status: SuggestionStatus,
    ) -> ReconcileResult<()>;

    /// Record ids currently claimed by applied suggestions
    async fn claimed_records(&self) -> ReconcileResult<ClaimSet>;

    /// Allocation audit rows written so far
    async fn list_allocations(&self) -> ReconcileResult<Vec<AllocationRecord>>;
}

/// Storage abstraction for multi-step completion workflows
///
/// Backends with real transactions implement `begin`/`commit`/`rollback`
/// over a shared scope; backends without them report
/// `supports_transactions() == false` and are only usable through the
/// coordinator's ordered fallback mode.
#[async_trait]
pub trait WorkflowStorage: Send + Sync {
    /// Whether the backend offers a shared transactional scope
    fn supports_transactions(&self) -> bool;

    /// Open a transactional scope
    async fn begin(&mut self) -> ReconcileResult<()>;

    /// Execute one workflow step, inside the scope when one is open
    async fn execute_step(&mut self, step: &CompletionStep) -> ReconcileResult<()>;

    /// Commit the open scope
    async fn commit(&mut self) -> ReconcileResult<()>;

    /// Discard the open scope and every write staged in it
    async fn rollback(&mut self) -> ReconcileResult<()>;

    /// Persist a reconciliation-needed record for the out-of-band sweep
    async fn record_reconciliation_needed(
        &mut self,
        record: &ReconciliationNeeded,
    ) -> ReconcileResult<()>;
}

/// Record ids held by applied suggestions, split by side
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClaimSet {
    pub movement_ids: HashSet<String>,
    pub expense_ids: HashSet<String>,
}

impl ClaimSet {
    /// Whether any id of either side is already claimed
    pub fn overlaps(&self, movement_ids: &[String], expense_ids: &[String]) -> bool {
        movement_ids.iter().any(|id| self.movement_ids.contains(id))
            || expense_ids.iter().any(|id| self.expense_ids.contains(id))
    }
}
