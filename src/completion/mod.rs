//! All-or-nothing coordination for multi-step reconciliation writes
//!
//! Applying a suggestion takes several dependent writes: claim the matched
//! records, append the allocation row, flip the suggestion status. The
//! coordinator runs such workflows inside one transactional scope when the
//! backend has one, and offers an explicit ordered fallback for backends
//! that do not. The fallback is a documented degradation: steps commit in
//! an order that leaves the least-reversible write for last, and a partial
//! failure emits a reconciliation-needed record for an out-of-band sweep.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::traits::WorkflowStorage;
use crate::types::{MatchSuggestion, ReconcileError, ReconcileResult, SuggestionStatus};

/// A single persisted operation inside a completion workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepOp {
    /// Claim matched records for a suggestion; fails on a conflicting claim
    ClaimRecords {
        suggestion_id: String,
        movement_ids: Vec<String>,
        expense_ids: Vec<String>,
    },
    /// Append the allocation audit row for a suggestion
    WriteAllocation { suggestion_id: String },
    /// Update a suggestion's lifecycle status
    SetSuggestionStatus {
        suggestion_id: String,
        status: SuggestionStatus,
    },
    /// Close a fully settled parent record, such as an invoice
    CloseParent { record_id: String },
}

/// One named workflow step
///
/// Names appear in failure reports and reconciliation-needed records, so
/// they must be unique within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionStep {
    pub name: String,
    pub op: StepOp,
}

impl CompletionStep {
    /// Create a named step
    pub fn new(name: &str, op: StepOp) -> Self {
        Self {
            name: name.to_string(),
            op,
        }
    }
}

/// An ordered sequence of dependent writes for one target entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionWorkflow {
    /// Generated identifier (UUID v4)
    pub id: String,
    /// The entity the workflow acts on; one workflow per entity at a time
    pub entity_id: String,
    /// Steps in execution order
    pub steps: Vec<CompletionStep>,
}

impl CompletionWorkflow {
    /// Create an empty workflow for an entity
    pub fn new(entity_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id,
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step(mut self, step: CompletionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// The standard application workflow for a suggestion
    ///
    /// Claims come first so a conflicting writer fails before anything else
    /// is written; the status flip readers see comes last.
    pub fn for_suggestion(suggestion: &MatchSuggestion) -> Self {
        Self::new(suggestion.id.clone())
            .step(CompletionStep::new(
                "claim_records",
                StepOp::ClaimRecords {
                    suggestion_id: suggestion.id.clone(),
                    movement_ids: suggestion.movement_ids.clone(),
                    expense_ids: suggestion.expense_ids.clone(),
                },
            ))
            .step(CompletionStep::new(
                "write_allocation",
                StepOp::WriteAllocation {
                    suggestion_id: suggestion.id.clone(),
                },
            ))
            .step(CompletionStep::new(
                "mark_applied",
                StepOp::SetSuggestionStatus {
                    suggestion_id: suggestion.id.clone(),
                    status: SuggestionStatus::Applied,
                },
            ))
    }

    /// Validate the workflow before it runs
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.entity_id.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "workflow entity id must not be empty".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "workflow must contain at least one step".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name.as_str()) {
                return Err(ReconcileError::InvalidInput(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
        }
        Ok(())
    }
}

/// How the coordinator persists a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// All steps inside one transactional scope; any failure rolls back
    Transactional,
    /// Steps committed one by one, least-reversible last; never the default
    OrderedFallback,
}

/// Successful workflow outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub workflow_id: String,
    pub entity_id: String,
    /// Step names in the order they were persisted
    pub completed_steps: Vec<String>,
    pub mode: CompletionMode,
}

/// Persisted marker that an ordered-fallback workflow stopped part-way
///
/// Consumed by a separate detection sweep, outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationNeeded {
    pub workflow_id: String,
    pub entity_id: String,
    /// Steps that committed before the failure, in order
    pub committed_steps: Vec<String>,
    pub failed_step: String,
    pub reason: String,
    pub occurred_at: NaiveDateTime,
}

/// Runs completion workflows against a workflow-capable storage backend
///
/// Clones share one in-flight registry, so a second `run` for an entity
/// whose workflow is still executing is rejected rather than interleaved.
#[derive(Debug, Clone)]
pub struct AtomicCompletionCoordinator<S: WorkflowStorage> {
    storage: S,
    mode: CompletionMode,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<S: WorkflowStorage> AtomicCompletionCoordinator<S> {
    /// Create a coordinator in transactional mode
    pub fn new(storage: S) -> Self {
        Self::with_mode(storage, CompletionMode::Transactional)
    }

    /// Create a coordinator with an explicit mode
    pub fn with_mode(storage: S, mode: CompletionMode) -> Self {
        Self {
            storage,
            mode,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The configured persistence mode
    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    /// Whether a workflow for this entity is currently executing
    pub fn is_in_flight(&self, entity_id: &str) -> bool {
        self.in_flight.lock().unwrap().contains(entity_id)
    }

    /// Execute a workflow to completion or to a clean failure
    ///
    /// Retryable errors (timeouts, claim conflicts) pass through unchanged
    /// and are never retried here; any other step failure surfaces as
    /// `PartialWriteFailure` naming the failed step and what committed.
    pub async fn run(&mut self, workflow: CompletionWorkflow) -> ReconcileResult<CompletionReport> {
        workflow.validate()?;
        let _guard = InFlightGuard::acquire(&self.in_flight, &workflow.entity_id)?;
        match self.mode {
            CompletionMode::Transactional => self.run_transactional(&workflow).await,
            CompletionMode::OrderedFallback => self.run_ordered(&workflow).await,
        }
    }

    async fn run_transactional(
        &mut self,
        workflow: &CompletionWorkflow,
    ) -> ReconcileResult<CompletionReport> {
        if !self.storage.supports_transactions() {
            return Err(ReconcileError::InvalidInput(
                "backend has no transactional scope; construct the coordinator in ordered-fallback mode".to_string(),
            ));
        }

        self.storage.begin().await?;
        for step in &workflow.steps {
            if let Err(source) = self.storage.execute_step(step).await {
                error!(
                    workflow_id = %workflow.id,
                    step = %step.name,
                    error = %source,
                    "completion step failed; rolling back"
                );
                self.storage.rollback().await?;
                return Err(step_failure(&step.name, source, Vec::new()));
            }
        }
        self.storage.commit().await?;

        let report = CompletionReport {
            workflow_id: workflow.id.clone(),
            entity_id: workflow.entity_id.clone(),
            completed_steps: workflow.steps.iter().map(|s| s.name.clone()).collect(),
            mode: CompletionMode::Transactional,
        };
        info!(
            workflow_id = %report.workflow_id,
            entity_id = %report.entity_id,
            steps = report.completed_steps.len(),
            "completion workflow committed"
        );
        Ok(report)
    }

    async fn run_ordered(
        &mut self,
        workflow: &CompletionWorkflow,
    ) -> ReconcileResult<CompletionReport> {
        let mut committed: Vec<String> = Vec::with_capacity(workflow.steps.len());
        for step in &workflow.steps {
            if let Err(source) = self.storage.execute_step(step).await {
                error!(
                    workflow_id = %workflow.id,
                    step = %step.name,
                    error = %source,
                    committed = committed.len(),
                    "ordered completion stopped part-way"
                );
                if committed.is_empty() {
                    // nothing persisted yet; the failure stands on its own
                    return Err(step_failure(&step.name, source, committed));
                }
                let record = ReconciliationNeeded {
                    workflow_id: workflow.id.clone(),
                    entity_id: workflow.entity_id.clone(),
                    committed_steps: committed.clone(),
                    failed_step: step.name.clone(),
                    reason: source.to_string(),
                    occurred_at: chrono::Utc::now().naive_utc(),
                };
                if let Err(sweep_error) = self.storage.record_reconciliation_needed(&record).await {
                    error!(
                        workflow_id = %workflow.id,
                        error = %sweep_error,
                        "failed to persist reconciliation-needed record"
                    );
                }
                return Err(ReconcileError::PartialWriteFailure {
                    step: step.name.clone(),
                    reason: source.to_string(),
                    committed,
                });
            }
            committed.push(step.name.clone());
        }

        let report = CompletionReport {
            workflow_id: workflow.id.clone(),
            entity_id: workflow.entity_id.clone(),
            completed_steps: committed,
            mode: CompletionMode::OrderedFallback,
        };
        info!(
            workflow_id = %report.workflow_id,
            entity_id = %report.entity_id,
            steps = report.completed_steps.len(),
            "ordered completion workflow finished"
        );
        Ok(report)
    }
}

/// Map a step error: retryable errors pass through, everything else becomes
/// a partial write failure for this workflow instance
fn step_failure(step: &str, source: ReconcileError, committed: Vec<String>) -> ReconcileError {
    if source.is_retryable() {
        source
    } else {
        ReconcileError::PartialWriteFailure {
            step: step.to_string(),
            reason: source.to_string(),
            committed,
        }
    }
}

/// Registry entry held for the duration of one `run` call
struct InFlightGuard {
    registry: Arc<Mutex<HashSet<String>>>,
    entity_id: String,
}

impl InFlightGuard {
    fn acquire(registry: &Arc<Mutex<HashSet<String>>>, entity_id: &str) -> ReconcileResult<Self> {
        let mut entries = registry.lock().unwrap();
        if !entries.insert(entity_id.to_string()) {
            return Err(ReconcileError::WorkflowInFlight(entity_id.to_string()));
        }
        Ok(Self {
            registry: Arc::clone(registry),
            entity_id: entity_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry.lock().unwrap().remove(&self.entity_id);
    }
}
