//! Reconciliation suggestion engine
//!
//! Ties the pieces together: candidate groupings come from the split
//! search, each grouping is scored, overlapping candidates are resolved
//! best-first, and the surviving suggestions move through their pending,
//! applied, or rejected lifecycle against a storage backend. Applying a
//! suggestion always goes through the completion coordinator; generation
//! itself is pure computation and claims nothing.

use std::collections::{BTreeMap, HashSet};

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::completion::{AtomicCompletionCoordinator, CompletionMode, CompletionWorkflow};
use crate::matching::{
    ConfidenceBand, MatchConfig, MatchScorer, SearchConfig, SplitCombinationSearch, SplitItem,
};
use crate::text::normalizer::NormalizerConfig;
use crate::text::similarity::ConceptSimilarityScorer;
use crate::traits::{SuggestionStore, WorkflowStorage};
use crate::types::{
    AllocationRecord, BankMovement, ExpenseRecord, MatchSuggestion, ReconcileError,
    ReconcileResult, SuggestionStatus,
};
use crate::utils::validation;

/// Engine-wide configuration
///
/// One normalizer configuration feeds both the description scorer and the
/// concept similarity pass, and the amount tolerance must be the same for
/// scoring and search.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Text canonicalization shared by all similarity measures
    pub normalizer: NormalizerConfig,
    /// Confidence weighting and band thresholds
    pub matching: MatchConfig,
    /// Split combination search bounds
    pub search: SearchConfig,
}

impl EngineConfig {
    /// Set one amount tolerance on both the scorer and the search
    pub fn with_tolerance(mut self, tolerance: BigDecimal) -> Self {
        self.matching.amount_tolerance = tolerance.clone();
        self.search.tolerance = tolerance;
        self
    }

    /// Validate the composite configuration
    pub fn validate(&self) -> ReconcileResult<()> {
        self.matching.validate()?;
        self.search.validate()?;
        if self.matching.amount_tolerance != self.search.tolerance {
            return Err(ReconcileError::InvalidInput(
                "scorer and search amount tolerances must agree".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one generation pass over a movement and expense pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionBatch {
    /// Suggestions at or above the review threshold, strongest first
    pub suggestions: Vec<MatchSuggestion>,
    /// Suggestions below the review threshold, retrievable on demand
    pub low_confidence: Vec<MatchSuggestion>,
    /// Movement ids no suggestion of this batch references
    pub unmatched_movement_ids: Vec<String>,
    /// Expense ids no suggestion of this batch references
    pub unmatched_expense_ids: Vec<String>,
    /// Input movements dropped by validation
    pub skipped_movements: usize,
    /// Input expenses dropped by validation
    pub skipped_expenses: usize,
    /// Scored candidate groupings before conflict resolution
    pub candidate_count: usize,
    /// Candidates dropped because a stronger one claimed their records
    pub conflict_dropped: usize,
}

/// A scored grouping awaiting conflict resolution
struct Candidate {
    suggestion: MatchSuggestion,
    /// Absolute amount deviation of the grouping, used as a ranking key
    deviation: BigDecimal,
}

/// Suggestion engine over a pluggable storage backend
///
/// Generation works on in-memory pools and persists nothing; the
/// lifecycle operations read and write suggestions through the store, and
/// `apply_suggestion` runs a completion workflow so the claim, the
/// allocation audit row, and the status change land as one unit.
#[derive(Debug, Clone)]
pub struct ReconciliationSuggestionEngine<S: SuggestionStore + WorkflowStorage> {
    config: EngineConfig,
    scorer: MatchScorer,
    similarity: ConceptSimilarityScorer,
    search: SplitCombinationSearch,
    store: S,
    coordinator: AtomicCompletionCoordinator<S>,
}

impl<S: SuggestionStore + WorkflowStorage + Clone> ReconciliationSuggestionEngine<S> {
    /// Create an engine with default configuration and transactional
    /// completion
    pub fn new(store: S) -> Self {
        Self::build(store, EngineConfig::default(), CompletionMode::Transactional)
    }

    /// Create an engine with an explicit configuration
    pub fn with_config(store: S, config: EngineConfig) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self::build(store, config, CompletionMode::Transactional))
    }

    /// Create an engine whose apply path uses a chosen completion mode
    ///
    /// [`CompletionMode::OrderedFallback`] is for backends without
    /// transactional scopes and must be opted into deliberately.
    pub fn with_completion_mode(
        store: S,
        config: EngineConfig,
        mode: CompletionMode,
    ) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self::build(store, config, mode))
    }

    fn build(store: S, config: EngineConfig, mode: CompletionMode) -> Self {
        let scorer = MatchScorer::with_config(config.matching.clone(), config.normalizer.clone());
        let similarity = ConceptSimilarityScorer::with_config(config.normalizer.clone());
        let search = SplitCombinationSearch::with_config(config.search.clone());
        let coordinator = AtomicCompletionCoordinator::with_mode(store.clone(), mode);
        Self {
            config,
            scorer,
            similarity,
            search,
            store,
            coordinator,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generate match suggestions for a pool of movements and expenses
    ///
    /// Invalid records are skipped and counted, pools are partitioned per
    /// tenant, and candidate groupings from both split directions are
    /// scored. Overlapping candidates are resolved best-first, so no
    /// record id appears in two suggestions of the same batch; losers are
    /// counted in `conflict_dropped`. Movements and expenses left without
    /// any suggestion are reported in the unmatched lists rather than
    /// forced into a weak grouping.
    pub fn generate_suggestions(
        &self,
        movements: &[BankMovement],
        expenses: &[ExpenseRecord],
    ) -> ReconcileResult<SuggestionBatch> {
        let (movements, skipped_movements) = validation::sanitize_movements(movements);
        let (expenses, skipped_expenses) = validation::sanitize_expenses(expenses);

        let mut tenants: BTreeMap<&str, (Vec<&BankMovement>, Vec<&ExpenseRecord>)> =
            BTreeMap::new();
        for movement in &movements {
            tenants
                .entry(movement.tenant_id.as_str())
                .or_default()
                .0
                .push(movement);
        }
        for expense in &expenses {
            tenants
                .entry(expense.tenant_id.as_str())
                .or_default()
                .1
                .push(expense);
        }

        let mut candidates = Vec::new();
        for (tenant_id, (tenant_movements, tenant_expenses)) in &tenants {
            self.collect_candidates(tenant_id, tenant_movements, tenant_expenses, &mut candidates)?;
        }
        let candidate_count = candidates.len();

        // Strongest first; ties broken by tighter amount, then by the
        // referenced ids so identical inputs always rank identically.
        candidates.sort_by(|a, b| {
            b.suggestion
                .confidence
                .cmp(&a.suggestion.confidence)
                .then_with(|| a.deviation.cmp(&b.deviation))
                .then_with(|| a.suggestion.movement_ids.cmp(&b.suggestion.movement_ids))
                .then_with(|| a.suggestion.expense_ids.cmp(&b.suggestion.expense_ids))
        });

        let mut claimed_movements: HashSet<String> = HashSet::new();
        let mut claimed_expenses: HashSet<String> = HashSet::new();
        let mut suggestions = Vec::new();
        let mut low_confidence = Vec::new();
        let mut conflict_dropped = 0;
        for candidate in candidates {
            let suggestion = candidate.suggestion;
            let taken = suggestion
                .movement_ids
                .iter()
                .any(|id| claimed_movements.contains(id))
                || suggestion
                    .expense_ids
                    .iter()
                    .any(|id| claimed_expenses.contains(id));
            if taken {
                conflict_dropped += 1;
                continue;
            }
            claimed_movements.extend(suggestion.movement_ids.iter().cloned());
            claimed_expenses.extend(suggestion.expense_ids.iter().cloned());
            match self.config.matching.band(suggestion.confidence) {
                ConfidenceBand::LowConfidence => low_confidence.push(suggestion),
                _ => suggestions.push(suggestion),
            }
        }

        let unmatched_movement_ids: Vec<String> = movements
            .iter()
            .map(|m| m.id.clone())
            .filter(|id| !claimed_movements.contains(id))
            .collect();
        let unmatched_expense_ids: Vec<String> = expenses
            .iter()
            .map(|e| e.id.clone())
            .filter(|id| !claimed_expenses.contains(id))
            .collect();

        info!(
            tenants = tenants.len(),
            candidates = candidate_count,
            suggestions = suggestions.len(),
            low_confidence = low_confidence.len(),
            conflict_dropped,
            unmatched_movements = unmatched_movement_ids.len(),
            unmatched_expenses = unmatched_expense_ids.len(),
            "generated suggestion batch"
        );

        Ok(SuggestionBatch {
            suggestions,
            low_confidence,
            unmatched_movement_ids,
            unmatched_expense_ids,
            skipped_movements,
            skipped_expenses,
            candidate_count,
            conflict_dropped,
        })
    }

    /// Score every candidate grouping for one tenant's pools
    fn collect_candidates(
        &self,
        tenant_id: &str,
        movements: &[&BankMovement],
        expenses: &[&ExpenseRecord],
        out: &mut Vec<Candidate>,
    ) -> ReconcileResult<()> {
        // One movement against expense subsets, covering one-to-one and
        // one-to-many shapes.
        let expense_pool: Vec<SplitItem> = expenses.iter().map(|e| SplitItem::from(*e)).collect();
        for movement in movements {
            let outcome =
                self.search
                    .find_candidates(&movement.magnitude(), movement.date, &expense_pool);
            for group in outcome.candidates {
                let records: Vec<ExpenseRecord> = group
                    .indices
                    .iter()
                    .map(|&index| expenses[index].clone())
                    .collect();
                let score = self.scorer.score(movement, &records)?;
                let concepts: Vec<String> = records
                    .iter()
                    .flat_map(|e| e.concepts.iter().cloned())
                    .collect();
                let concept = if concepts.is_empty() {
                    0
                } else {
                    self.similarity
                        .aggregate_score(std::slice::from_ref(&movement.description), &concepts)
                };
                let suggestion = MatchSuggestion::new(
                    tenant_id.to_string(),
                    vec![movement.id.clone()],
                    records.iter().map(|e| e.id.clone()).collect(),
                    score.total,
                    score.breakdown(concept),
                );
                out.push(Candidate {
                    suggestion,
                    deviation: group.deviation.abs(),
                });
            }
        }

        // One expense against movement subsets, covering many-to-one.
        // Single-movement groupings are already produced by the pass above.
        let movement_pool: Vec<SplitItem> = movements.iter().map(|m| SplitItem::from(*m)).collect();
        for expense in expenses {
            let outcome = self
                .search
                .find_candidates(&expense.amount, expense.date, &movement_pool);
            for group in outcome.candidates {
                if group.indices.len() < 2 {
                    continue;
                }
                let records: Vec<BankMovement> = group
                    .indices
                    .iter()
                    .map(|&index| movements[index].clone())
                    .collect();
                let score = self.scorer.score_movements(&records, expense)?;
                let concept = if expense.concepts.is_empty() {
                    0
                } else {
                    let descriptions: Vec<String> =
                        records.iter().map(|m| m.description.clone()).collect();
                    self.similarity
                        .aggregate_score(&descriptions, &expense.concepts)
                };
                let suggestion = MatchSuggestion::new(
                    tenant_id.to_string(),
                    records.iter().map(|m| m.id.clone()).collect(),
                    vec![expense.id.clone()],
                    score.total,
                    score.breakdown(concept),
                );
                out.push(Candidate {
                    suggestion,
                    deviation: group.deviation.abs(),
                });
            }
        }
        Ok(())
    }

    /// Persist every suggestion of a batch, low-confidence ones included
    pub async fn record_batch(&mut self, batch: &SuggestionBatch) -> ReconcileResult<()> {
        for suggestion in batch.suggestions.iter().chain(batch.low_confidence.iter()) {
            self.store.save_suggestion(suggestion).await?;
        }
        Ok(())
    }

    /// Fetch one stored suggestion by id
    pub async fn suggestion(&self, suggestion_id: &str) -> ReconcileResult<MatchSuggestion> {
        self.store
            .get_suggestion(suggestion_id)
            .await?
            .ok_or_else(|| ReconcileError::SuggestionNotFound(suggestion_id.to_string()))
    }

    /// List stored suggestions for a tenant, optionally filtered by status
    pub async fn list_suggestions(
        &self,
        tenant_id: &str,
        status: Option<SuggestionStatus>,
    ) -> ReconcileResult<Vec<MatchSuggestion>> {
        self.store.list_suggestions(tenant_id, status).await
    }

    /// Allocation audit rows written by applied suggestions
    pub async fn list_allocations(&self) -> ReconcileResult<Vec<AllocationRecord>> {
        self.store.list_allocations().await
    }

    /// Apply a pending suggestion through the completion coordinator
    ///
    /// The workflow claims the referenced records, writes the allocation
    /// audit row, and marks the suggestion applied as one unit. A record
    /// claimed elsewhere since generation surfaces as
    /// [`ReconcileError::ConcurrentClaimConflict`]; the caller refetches
    /// the unmatched pools and regenerates instead of retrying blindly.
    pub async fn apply_suggestion(
        &mut self,
        suggestion_id: &str,
    ) -> ReconcileResult<MatchSuggestion> {
        let suggestion = self.suggestion(suggestion_id).await?;
        if !suggestion.is_pending() {
            return Err(ReconcileError::InvalidInput(format!(
                "suggestion {suggestion_id} is not pending"
            )));
        }
        suggestion.validate()?;

        let workflow = CompletionWorkflow::for_suggestion(&suggestion);
        self.coordinator.run(workflow).await?;
        info!(
            suggestion_id,
            confidence = suggestion.confidence,
            "suggestion applied"
        );
        self.suggestion(suggestion_id).await
    }

    /// Reject a pending suggestion
    ///
    /// Status-only: no claim or allocation is touched, and the suggestion
    /// is kept for audit and model feedback. Rejecting a rejected
    /// suggestion is a no-op; an applied one cannot be rejected.
    pub async fn reject_suggestion(
        &mut self,
        suggestion_id: &str,
    ) -> ReconcileResult<MatchSuggestion> {
        let suggestion = self.suggestion(suggestion_id).await?;
        match suggestion.status {
            SuggestionStatus::Rejected => Ok(suggestion),
            SuggestionStatus::Applied => Err(ReconcileError::InvalidInput(format!(
                "suggestion {suggestion_id} is already applied"
            ))),
            SuggestionStatus::Pending => {
                self.store
                    .update_suggestion_status(suggestion_id, SuggestionStatus::Rejected)
                    .await?;
                info!(suggestion_id, "suggestion rejected");
                self.suggestion(suggestion_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SuggestionKind;
    use crate::utils::MemoryStore;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn movement(id: &str, amount: &str, day: u32, description: &str) -> BankMovement {
        BankMovement::new(
            id.to_string(),
            "tenant1".to_string(),
            BigDecimal::from_str(amount).unwrap(),
            date(day),
            description.to_string(),
        )
    }

    fn expense(id: &str, amount: &str, day: u32, description: &str) -> ExpenseRecord {
        ExpenseRecord::new(
            id.to_string(),
            "tenant1".to_string(),
            BigDecimal::from_str(amount).unwrap(),
            date(day),
            description.to_string(),
            vec![],
        )
    }

    fn engine() -> ReconciliationSuggestionEngine<MemoryStore> {
        ReconciliationSuggestionEngine::new(MemoryStore::new())
    }

    #[test]
    fn test_one_to_one_suggestion() {
        let engine = engine();
        let movements = vec![movement("m1", "-850.50", 17, "CARGO PEMEX 5532")];
        let expenses = vec![expense("e1", "850.50", 16, "PEMEX 5532 GASOLINERA")];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();

        assert_eq!(batch.suggestions.len(), 1);
        let suggestion = &batch.suggestions[0];
        assert_eq!(suggestion.kind, SuggestionKind::OneToOne);
        assert_eq!(suggestion.movement_ids, vec!["m1".to_string()]);
        assert_eq!(suggestion.expense_ids, vec!["e1".to_string()]);
        assert_eq!(suggestion.confidence, 86);
        assert!(batch.unmatched_movement_ids.is_empty());
        assert!(batch.unmatched_expense_ids.is_empty());
    }

    #[test]
    fn test_split_group_suggestion() {
        let engine = engine();
        let movements = vec![movement("m1", "-850.50", 17, "PEMEX GASOLINERA 5467")];
        let expenses = vec![
            expense("e1", "300.00", 15, "PEMEX GASOLINERA 5467"),
            expense("e2", "300.00", 15, "PEMEX GASOLINERA 5467"),
            expense("e3", "250.50", 16, "PEMEX GASOLINERA 5467"),
        ];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();

        assert_eq!(batch.suggestions.len(), 1);
        let suggestion = &batch.suggestions[0];
        assert_eq!(suggestion.kind, SuggestionKind::OneToMany);
        assert_eq!(
            suggestion.expense_ids,
            vec!["e1".to_string(), "e2".to_string(), "e3".to_string()]
        );
        assert_eq!(suggestion.confidence, 90);
        assert_eq!(
            engine.config().matching.band(suggestion.confidence),
            ConfidenceBand::AutoEligible
        );
    }

    #[test]
    fn test_combined_movements_suggestion() {
        let engine = engine();
        let movements = vec![
            movement("m1", "-300.00", 15, "PEMEX 5532 GASOLINERA"),
            movement("m2", "-550.50", 16, "PEMEX 5532 GASOLINERA"),
        ];
        let expenses = vec![expense("e1", "850.50", 17, "PEMEX 5532 GASOLINERA")];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();

        assert_eq!(batch.suggestions.len(), 1);
        let suggestion = &batch.suggestions[0];
        assert_eq!(suggestion.kind, SuggestionKind::ManyToOne);
        assert_eq!(
            suggestion.movement_ids,
            vec!["m1".to_string(), "m2".to_string()]
        );
        assert_eq!(suggestion.confidence, 92);
    }

    #[test]
    fn test_movement_with_no_pool_stays_unmatched() {
        let engine = engine();
        let movements = vec![movement("m1", "-125.00", 10, "RENTA OFICINA")];
        let batch = engine.generate_suggestions(&movements, &[]).unwrap();

        assert!(batch.suggestions.is_empty());
        assert!(batch.low_confidence.is_empty());
        assert_eq!(batch.unmatched_movement_ids, vec!["m1".to_string()]);
    }

    #[test]
    fn test_conflicting_candidates_resolved_best_first() {
        let engine = engine();
        // both movements fit e1 on amount; m1 is the far better match
        let movements = vec![
            movement("m1", "-850.50", 16, "PEMEX GASOLINERA"),
            movement("m2", "-850.50", 10, "TRANSFERENCIA"),
        ];
        let expenses = vec![expense("e1", "850.50", 16, "PEMEX GASOLINERA")];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();

        assert_eq!(batch.candidate_count, 2);
        assert_eq!(batch.conflict_dropped, 1);
        assert_eq!(batch.suggestions.len(), 1);
        assert_eq!(batch.suggestions[0].movement_ids, vec!["m1".to_string()]);
        assert_eq!(batch.unmatched_movement_ids, vec!["m2".to_string()]);
    }

    #[test]
    fn test_low_confidence_kept_out_of_main_list() {
        let engine = engine();
        // exact amount, but 27 days apart and nothing shared in the text
        let movements = vec![movement("m1", "-200.00", 1, "ABC")];
        let expenses = vec![expense("e1", "200.00", 28, "XYZ")];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();

        assert!(batch.suggestions.is_empty());
        assert_eq!(batch.low_confidence.len(), 1);
        assert_eq!(batch.low_confidence[0].confidence, 50);
        // records held by a low-confidence suggestion still count as matched
        assert!(batch.unmatched_movement_ids.is_empty());
        assert!(batch.unmatched_expense_ids.is_empty());
    }

    #[test]
    fn test_tenants_never_cross_match() {
        let engine = engine();
        let mut other = movement("m2", "-850.50", 16, "PEMEX GASOLINERA");
        other.tenant_id = "tenant2".to_string();
        let movements = vec![movement("m1", "-850.50", 16, "PEMEX GASOLINERA"), other];
        let expenses = vec![expense("e1", "850.50", 16, "PEMEX GASOLINERA")];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();

        assert_eq!(batch.suggestions.len(), 1);
        assert_eq!(batch.suggestions[0].tenant_id, "tenant1");
        assert_eq!(batch.suggestions[0].movement_ids, vec!["m1".to_string()]);
        assert_eq!(batch.unmatched_movement_ids, vec!["m2".to_string()]);
    }

    #[test]
    fn test_invalid_records_are_skipped_not_fatal() {
        let engine = engine();
        let mut bad = expense("e2", "100.00", 16, "OTRO");
        bad.amount = BigDecimal::from(-5);
        let movements = vec![movement("m1", "-850.50", 16, "PEMEX GASOLINERA")];
        let expenses = vec![expense("e1", "850.50", 16, "PEMEX GASOLINERA"), bad];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();

        assert_eq!(batch.skipped_expenses, 1);
        assert_eq!(batch.suggestions.len(), 1);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let engine = engine();
        let movements = vec![
            movement("m1", "-300.00", 15, "PEMEX GASOLINERA"),
            movement("m2", "-550.50", 16, "PEMEX GASOLINERA"),
            movement("m3", "-850.50", 17, "PEMEX GASOLINERA"),
        ];
        let expenses = vec![
            expense("e1", "850.50", 16, "PEMEX GASOLINERA"),
            expense("e2", "300.00", 15, "PEMEX GASOLINERA"),
            expense("e3", "550.50", 16, "PEMEX GASOLINERA"),
        ];
        let key = |batch: &SuggestionBatch| -> Vec<(Vec<String>, Vec<String>, u8)> {
            batch
                .suggestions
                .iter()
                .chain(batch.low_confidence.iter())
                .map(|s| (s.movement_ids.clone(), s.expense_ids.clone(), s.confidence))
                .collect()
        };

        let first = engine.generate_suggestions(&movements, &expenses).unwrap();
        let second = engine.generate_suggestions(&movements, &expenses).unwrap();
        assert_eq!(key(&first), key(&second));
        assert_eq!(first.conflict_dropped, second.conflict_dropped);
    }

    #[test]
    fn test_engine_config_requires_matching_tolerances() {
        let mut config = EngineConfig::default();
        config.search.tolerance = BigDecimal::from(5);
        assert!(config.validate().is_err());
        assert!(
            ReconciliationSuggestionEngine::with_config(MemoryStore::new(), config).is_err()
        );

        let config = EngineConfig::default().with_tolerance(BigDecimal::from_str("0.05").unwrap());
        assert!(config.validate().is_ok());
        assert!(ReconciliationSuggestionEngine::with_config(MemoryStore::new(), config).is_ok());
    }

    #[tokio::test]
    async fn test_apply_suggestion_claims_and_marks_applied() {
        let mut engine = engine();
        let movements = vec![movement("m1", "-850.50", 16, "PEMEX GASOLINERA")];
        let expenses = vec![expense("e1", "850.50", 16, "PEMEX GASOLINERA")];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();
        engine.record_batch(&batch).await.unwrap();

        let id = batch.suggestions[0].id.clone();
        let applied = engine.apply_suggestion(&id).await.unwrap();
        assert_eq!(applied.status, SuggestionStatus::Applied);

        let allocations = engine.list_allocations().await.unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].suggestion_id, id);
        assert_eq!(allocations[0].movement_ids, vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_conflicting_apply_is_rejected() {
        let mut engine = engine();
        let movements = vec![movement("m1", "-850.50", 16, "PEMEX GASOLINERA")];
        let expenses = vec![expense("e1", "850.50", 16, "PEMEX GASOLINERA")];
        // two batches over the same pool produce suggestions claiming the
        // same records
        let first = engine.generate_suggestions(&movements, &expenses).unwrap();
        let second = engine.generate_suggestions(&movements, &expenses).unwrap();
        engine.record_batch(&first).await.unwrap();
        engine.record_batch(&second).await.unwrap();

        engine
            .apply_suggestion(&first.suggestions[0].id)
            .await
            .unwrap();
        let conflict = engine.apply_suggestion(&second.suggestions[0].id).await;
        match conflict {
            Err(ReconcileError::ConcurrentClaimConflict(message)) => {
                assert!(message.contains("m1") || message.contains("e1"));
            }
            other => panic!("expected claim conflict, got {other:?}"),
        }

        // the losing suggestion stays pending; nothing was half-applied
        let losing = engine.suggestion(&second.suggestions[0].id).await.unwrap();
        assert_eq!(losing.status, SuggestionStatus::Pending);
        assert_eq!(engine.list_allocations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reject_is_status_only_and_idempotent() {
        let mut engine = engine();
        let movements = vec![movement("m1", "-850.50", 16, "PEMEX GASOLINERA")];
        let expenses = vec![expense("e1", "850.50", 16, "PEMEX GASOLINERA")];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();
        engine.record_batch(&batch).await.unwrap();
        let id = batch.suggestions[0].id.clone();

        let rejected = engine.reject_suggestion(&id).await.unwrap();
        assert_eq!(rejected.status, SuggestionStatus::Rejected);
        assert!(engine.list_allocations().await.unwrap().is_empty());

        let again = engine.reject_suggestion(&id).await.unwrap();
        assert_eq!(again.status, SuggestionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_applied_suggestion_cannot_be_rejected() {
        let mut engine = engine();
        let movements = vec![movement("m1", "-850.50", 16, "PEMEX GASOLINERA")];
        let expenses = vec![expense("e1", "850.50", 16, "PEMEX GASOLINERA")];
        let batch = engine.generate_suggestions(&movements, &expenses).unwrap();
        engine.record_batch(&batch).await.unwrap();
        let id = batch.suggestions[0].id.clone();

        engine.apply_suggestion(&id).await.unwrap();
        let result = engine.reject_suggestion(&id).await;
        assert!(matches!(result, Err(ReconcileError::InvalidInput(_))));

        // and an already-decided suggestion cannot be applied again
        let reapply = engine.apply_suggestion(&id).await;
        assert!(matches!(reapply, Err(ReconcileError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_unknown_suggestion_is_not_found() {
        let mut engine = engine();
        let result = engine.apply_suggestion("missing").await;
        assert!(matches!(result, Err(ReconcileError::SuggestionNotFound(_))));
    }
}
