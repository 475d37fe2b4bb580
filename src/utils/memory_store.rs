//! In-memory storage implementation for testing and development
//!
//! Clones share state, so an engine, a coordinator, and a test can observe
//! the same records. When a transaction is open, workflow writes stage in a
//! buffer that `commit` publishes and `rollback` discards; the conflict
//! check for claims always consults both the buffer and published state.
//! Step-level failure and timeout injection make partial-write paths
//! testable.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::completion::{CompletionStep, ReconciliationNeeded, StepOp};
use crate::traits::{ClaimSet, SuggestionStore, WorkflowStorage};
use crate::types::{
    AllocationRecord, MatchSuggestion, ReconcileError, ReconcileResult, SuggestionStatus,
};

/// Writes staged by an open transaction
#[derive(Debug, Default)]
struct TxnBuffer {
    claims: HashMap<String, String>,
    allocations: Vec<AllocationRecord>,
    status_updates: Vec<(String, SuggestionStatus)>,
    closed_parents: HashSet<String>,
}

/// In-memory suggestion and workflow storage
#[derive(Debug, Clone)]
pub struct MemoryStore {
    suggestions: Arc<RwLock<HashMap<String, MatchSuggestion>>>,
    /// Claim key ("movement:{id}" or "expense:{id}") to owning suggestion id
    claims: Arc<RwLock<HashMap<String, String>>>,
    allocations: Arc<RwLock<Vec<AllocationRecord>>>,
    sweep_records: Arc<RwLock<Vec<ReconciliationNeeded>>>,
    closed_parents: Arc<RwLock<HashSet<String>>>,
    txn: Arc<RwLock<Option<TxnBuffer>>>,
    fail_on_step: Arc<RwLock<Option<String>>>,
    timeout_on_step: Arc<RwLock<Option<String>>>,
    transactional: bool,
}

impl MemoryStore {
    /// Create a store with transactional workflow support
    pub fn new() -> Self {
        Self {
            suggestions: Arc::new(RwLock::new(HashMap::new())),
            claims: Arc::new(RwLock::new(HashMap::new())),
            allocations: Arc::new(RwLock::new(Vec::new())),
            sweep_records: Arc::new(RwLock::new(Vec::new())),
            closed_parents: Arc::new(RwLock::new(HashSet::new())),
            txn: Arc::new(RwLock::new(None)),
            fail_on_step: Arc::new(RwLock::new(None)),
            timeout_on_step: Arc::new(RwLock::new(None)),
            transactional: true,
        }
    }

    /// Create a store that reports no transactional scope, for exercising
    /// the ordered fallback
    pub fn without_transactions() -> Self {
        Self {
            transactional: false,
            ..Self::new()
        }
    }

    /// Make the named workflow step fail with a storage error
    pub fn fail_on_step(&self, step: &str) {
        *self.fail_on_step.write().unwrap() = Some(step.to_string());
    }

    /// Make the named workflow step fail with a storage timeout
    pub fn timeout_on_step(&self, step: &str) {
        *self.timeout_on_step.write().unwrap() = Some(step.to_string());
    }

    /// Remove any injected step failures
    pub fn clear_injections(&self) {
        *self.fail_on_step.write().unwrap() = None;
        *self.timeout_on_step.write().unwrap() = None;
    }

    /// Reconciliation-needed records written by ordered fallbacks
    pub fn sweep_records(&self) -> Vec<ReconciliationNeeded> {
        self.sweep_records.read().unwrap().clone()
    }

    /// Whether a parent record has been closed by a workflow
    pub fn is_parent_closed(&self, record_id: &str) -> bool {
        self.closed_parents.read().unwrap().contains(record_id)
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.suggestions.write().unwrap().clear();
        self.claims.write().unwrap().clear();
        self.allocations.write().unwrap().clear();
        self.sweep_records.write().unwrap().clear();
        self.closed_parents.write().unwrap().clear();
        *self.txn.write().unwrap() = None;
        self.clear_injections();
    }

    fn apply_claims(
        &self,
        suggestion_id: &str,
        movement_ids: &[String],
        expense_ids: &[String],
    ) -> ReconcileResult<()> {
        let keys: Vec<String> = movement_ids
            .iter()
            .map(|id| format!("movement:{id}"))
            .chain(expense_ids.iter().map(|id| format!("expense:{id}")))
            .collect();

        let mut txn = self.txn.write().unwrap();
        {
            let published = self.claims.read().unwrap();
            for key in &keys {
                let owner = txn
                    .as_ref()
                    .and_then(|buffer| buffer.claims.get(key))
                    .or_else(|| published.get(key));
                if let Some(owner) = owner {
                    if owner != suggestion_id {
                        return Err(ReconcileError::ConcurrentClaimConflict(format!(
                            "{key} is already claimed by suggestion {owner}"
                        )));
                    }
                }
            }
        }

        match txn.as_mut() {
            Some(buffer) => {
                for key in keys {
                    buffer.claims.insert(key, suggestion_id.to_string());
                }
            }
            None => {
                let mut published = self.claims.write().unwrap();
                for key in keys {
                    published.insert(key, suggestion_id.to_string());
                }
            }
        }
        Ok(())
    }

    fn apply_allocation(&self, suggestion_id: &str) -> ReconcileResult<()> {
        let suggestion = self
            .suggestions
            .read()
            .unwrap()
            .get(suggestion_id)
            .cloned()
            .ok_or_else(|| {
                ReconcileError::Storage(format!(
                    "allocation refers to unknown suggestion {suggestion_id}"
                ))
            })?;
        let record = AllocationRecord {
            suggestion_id: suggestion.id.clone(),
            movement_ids: suggestion.movement_ids.clone(),
            expense_ids: suggestion.expense_ids.clone(),
            applied_at: chrono::Utc::now().naive_utc(),
        };

        let mut txn = self.txn.write().unwrap();
        match txn.as_mut() {
            Some(buffer) => buffer.allocations.push(record),
            None => self.allocations.write().unwrap().push(record),
        }
        Ok(())
    }

    fn apply_status(&self, suggestion_id: &str, status: SuggestionStatus) -> ReconcileResult<()> {
        if !self.suggestions.read().unwrap().contains_key(suggestion_id) {
            return Err(ReconcileError::SuggestionNotFound(suggestion_id.to_string()));
        }

        let mut txn = self.txn.write().unwrap();
        match txn.as_mut() {
            Some(buffer) => buffer
                .status_updates
                .push((suggestion_id.to_string(), status)),
            None => {
                if let Some(stored) = self.suggestions.write().unwrap().get_mut(suggestion_id) {
                    stored.status = status;
                }
            }
        }
        Ok(())
    }

    fn apply_close_parent(&self, record_id: &str) -> ReconcileResult<()> {
        let mut txn = self.txn.write().unwrap();
        match txn.as_mut() {
            Some(buffer) => {
                buffer.closed_parents.insert(record_id.to_string());
            }
            None => {
                self.closed_parents
                    .write()
                    .unwrap()
                    .insert(record_id.to_string());
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SuggestionStore for MemoryStore {
    async fn save_suggestion(&mut self, suggestion: &MatchSuggestion) -> ReconcileResult<()> {
        self.suggestions
            .write()
            .unwrap()
            .insert(suggestion.id.clone(), suggestion.clone());
        Ok(())
    }

    async fn get_suggestion(
        &self,
        suggestion_id: &str,
    ) -> ReconcileResult<Option<MatchSuggestion>> {
        Ok(self.suggestions.read().unwrap().get(suggestion_id).cloned())
    }

    async fn list_suggestions(
        &self,
        tenant_id: &str,
        status: Option<SuggestionStatus>,
    ) -> ReconcileResult<Vec<MatchSuggestion>> {
        let suggestions = self.suggestions.read().unwrap();
        let mut filtered: Vec<MatchSuggestion> = suggestions
            .values()
            .filter(|suggestion| {
                suggestion.tenant_id == tenant_id
                    && status.is_none_or(|s| suggestion.status == s)
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(filtered)
    }

    async fn update_suggestion_status(
        &mut self,
        suggestion_id: &str,
        status: SuggestionStatus,
    ) -> ReconcileResult<()> {
        match self.suggestions.write().unwrap().get_mut(suggestion_id) {
            Some(stored) => {
                stored.status = status;
                Ok(())
            }
            None => Err(ReconcileError::SuggestionNotFound(
                suggestion_id.to_string(),
            )),
        }
    }

    async fn claimed_records(&self) -> ReconcileResult<ClaimSet> {
        let claims = self.claims.read().unwrap();
        let mut set = ClaimSet::default();
        for key in claims.keys() {
            if let Some(id) = key.strip_prefix("movement:") {
                set.movement_ids.insert(id.to_string());
            } else if let Some(id) = key.strip_prefix("expense:") {
                set.expense_ids.insert(id.to_string());
            }
        }
        Ok(set)
    }

    async fn list_allocations(&self) -> ReconcileResult<Vec<AllocationRecord>> {
        Ok(self.allocations.read().unwrap().clone())
    }
}

#[async_trait]
impl WorkflowStorage for MemoryStore {
    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    async fn begin(&mut self) -> ReconcileResult<()> {
        if !self.transactional {
            return Err(ReconcileError::Storage(
                "transactions are not supported by this store".to_string(),
            ));
        }
        let mut txn = self.txn.write().unwrap();
        if txn.is_some() {
            return Err(ReconcileError::Storage(
                "transaction already open".to_string(),
            ));
        }
        *txn = Some(TxnBuffer::default());
        Ok(())
    }

    async fn execute_step(&mut self, step: &CompletionStep) -> ReconcileResult<()> {
        if self.fail_on_step.read().unwrap().as_deref() == Some(step.name.as_str()) {
            return Err(ReconcileError::Storage(format!(
                "injected failure at step '{}'",
                step.name
            )));
        }
        if self.timeout_on_step.read().unwrap().as_deref() == Some(step.name.as_str()) {
            return Err(ReconcileError::StorageTimeout(format!(
                "injected timeout at step '{}'",
                step.name
            )));
        }

        match &step.op {
            StepOp::ClaimRecords {
                suggestion_id,
                movement_ids,
                expense_ids,
            } => self.apply_claims(suggestion_id, movement_ids, expense_ids),
            StepOp::WriteAllocation { suggestion_id } => self.apply_allocation(suggestion_id),
            StepOp::SetSuggestionStatus {
                suggestion_id,
                status,
            } => self.apply_status(suggestion_id, *status),
            StepOp::CloseParent { record_id } => self.apply_close_parent(record_id),
        }
    }

    async fn commit(&mut self) -> ReconcileResult<()> {
        let buffer = self.txn.write().unwrap().take().ok_or_else(|| {
            ReconcileError::Storage("no open transaction to commit".to_string())
        })?;

        self.claims.write().unwrap().extend(buffer.claims);
        self.allocations.write().unwrap().extend(buffer.allocations);
        {
            let mut suggestions = self.suggestions.write().unwrap();
            for (id, status) in buffer.status_updates {
                if let Some(stored) = suggestions.get_mut(&id) {
                    stored.status = status;
                }
            }
        }
        self.closed_parents
            .write()
            .unwrap()
            .extend(buffer.closed_parents);
        Ok(())
    }

    async fn rollback(&mut self) -> ReconcileResult<()> {
        self.txn.write().unwrap().take().ok_or_else(|| {
            ReconcileError::Storage("no open transaction to roll back".to_string())
        })?;
        Ok(())
    }

    async fn record_reconciliation_needed(
        &mut self,
        record: &ReconciliationNeeded,
    ) -> ReconcileResult<()> {
        // never staged; this record must survive the failed workflow
        self.sweep_records.write().unwrap().push(record.clone());
        Ok(())
    }
}
