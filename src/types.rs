//! Core types and data structures for the reconciliation engine

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::validation;

/// How a suggestion groups movements and expenses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// One movement matched against one expense
    OneToOne,
    /// One movement covering a split across several expenses
    OneToMany,
    /// Several movements covering one expense
    ManyToOne,
}

impl SuggestionKind {
    /// Kind implied by the cardinality of a grouping
    pub fn from_cardinality(movements: usize, expenses: usize) -> Self {
        match (movements, expenses) {
            (1, 1) => SuggestionKind::OneToOne,
            (1, _) => SuggestionKind::OneToMany,
            _ => SuggestionKind::ManyToOne,
        }
    }
}

/// Lifecycle state of a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    /// Generated and awaiting an explicit external decision
    Pending,
    /// Confirmed; the allocation was persisted through the completion coordinator
    Applied,
    /// Declined; retained for feedback and audit
    Rejected,
}

/// A bank ledger movement as delivered by the ingestion collaborator
///
/// Movements are immutable once ingested; this core never writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankMovement {
    /// Unique identifier assigned upstream
    pub id: String,
    /// Tenant the movement belongs to
    pub tenant_id: String,
    /// Signed amount; charges are negative
    pub amount: BigDecimal,
    /// Value date of the movement
    pub date: NaiveDate,
    /// Raw statement description
    pub description: String,
}

impl BankMovement {
    /// Create a new bank movement
    pub fn new(
        id: String,
        tenant_id: String,
        amount: BigDecimal,
        date: NaiveDate,
        description: String,
    ) -> Self {
        Self {
            id,
            tenant_id,
            amount,
            date,
            description,
        }
    }

    /// Parse the string-typed shape delivered by collaborator feeds
    pub fn from_raw(raw: &RawBankMovement) -> ReconcileResult<Self> {
        validation::validate_record_id(&raw.id, "movement")?;
        validation::validate_record_id(&raw.tenant_id, "tenant")?;
        Ok(Self {
            id: raw.id.clone(),
            tenant_id: raw.tenant_id.clone(),
            amount: validation::parse_amount(&raw.amount)?,
            date: validation::parse_date(&raw.date)?,
            description: raw.description.clone(),
        })
    }

    /// Magnitude of the signed amount, used when comparing against expenses
    pub fn magnitude(&self) -> BigDecimal {
        self.amount.abs()
    }

    /// Validate the movement
    pub fn validate(&self) -> ReconcileResult<()> {
        validation::validate_record_id(&self.id, "movement")?;
        validation::validate_record_id(&self.tenant_id, "tenant")?;
        Ok(())
    }
}

/// An expense record as delivered by the expense-capture collaborator
///
/// Concepts are the line-item strings extracted upstream (OCR+LLM, out of
/// scope here); their order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    /// Unique identifier assigned upstream
    pub id: String,
    /// Tenant the expense belongs to
    pub tenant_id: String,
    /// Expense amount; non-negative
    pub amount: BigDecimal,
    /// Date the expense was incurred
    pub date: NaiveDate,
    /// Free-form description
    pub description: String,
    /// Ordered concept strings from the source receipt or invoice
    pub concepts: Vec<String>,
}

impl ExpenseRecord {
    /// Create a new expense record
    pub fn new(
        id: String,
        tenant_id: String,
        amount: BigDecimal,
        date: NaiveDate,
        description: String,
        concepts: Vec<String>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            amount,
            date,
            description,
            concepts,
        }
    }

    /// Parse the string-typed shape delivered by collaborator feeds
    pub fn from_raw(raw: &RawExpenseRecord) -> ReconcileResult<Self> {
        validation::validate_record_id(&raw.id, "expense")?;
        validation::validate_record_id(&raw.tenant_id, "tenant")?;
        let expense = Self {
            id: raw.id.clone(),
            tenant_id: raw.tenant_id.clone(),
            amount: validation::parse_amount(&raw.amount)?,
            date: validation::parse_date(&raw.date)?,
            description: raw.description.clone(),
            concepts: raw.concepts.clone(),
        };
        expense.validate()?;
        Ok(expense)
    }

    /// Validate the expense
    pub fn validate(&self) -> ReconcileResult<()> {
        validation::validate_record_id(&self.id, "expense")?;
        validation::validate_record_id(&self.tenant_id, "tenant")?;
        if self.amount < BigDecimal::from(0) {
            return Err(ReconcileError::InvalidInput(format!(
                "expense {} has a negative amount",
                self.id
            )));
        }
        Ok(())
    }
}

/// Unvalidated bank movement as it arrives from a collaborator feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBankMovement {
    pub id: String,
    pub tenant_id: String,
    pub amount: String,
    pub date: String,
    pub description: String,
}

/// Unvalidated expense record as it arrives from a collaborator feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExpenseRecord {
    pub id: String,
    pub tenant_id: String,
    pub amount: String,
    pub date: String,
    pub description: String,
    pub concepts: Vec<String>,
}

/// Per-factor contribution behind a suggestion's confidence
///
/// Amount, date, and text make up the 0-100 total (weights 50/30/20); the
/// concept factor is reported for review but does not enter the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactorBreakdown {
    /// Amount agreement, 0..50
    pub amount: u8,
    /// Date proximity, 0..30
    pub date: u8,
    /// Description similarity, 0..20
    pub text: u8,
    /// Concept corroboration against the group's invoice lines, 0..100
    pub concept: u8,
}

/// A proposed match between bank movements and expense records
///
/// Created only by the engine; immutable except `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    /// Generated identifier (UUID v4)
    pub id: String,
    /// Tenant both sides of the match belong to
    pub tenant_id: String,
    /// Grouping shape of the match
    pub kind: SuggestionKind,
    /// Movement ids referenced by this suggestion
    pub movement_ids: Vec<String>,
    /// Expense ids referenced by this suggestion
    pub expense_ids: Vec<String>,
    /// Composite match quality, 0..100; advisory only
    pub confidence: u8,
    /// Per-factor contributions behind the confidence
    pub breakdown: FactorBreakdown,
    /// Lifecycle state
    pub status: SuggestionStatus,
    /// When the suggestion was generated
    pub created_at: NaiveDateTime,
}

impl MatchSuggestion {
    /// Create a new pending suggestion with a generated id
    pub fn new(
        tenant_id: String,
        movement_ids: Vec<String>,
        expense_ids: Vec<String>,
        confidence: u8,
        breakdown: FactorBreakdown,
    ) -> Self {
        let kind = SuggestionKind::from_cardinality(movement_ids.len(), expense_ids.len());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            kind,
            movement_ids,
            expense_ids,
            confidence,
            breakdown,
            status: SuggestionStatus::Pending,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Validate the suggestion's structural invariants
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.movement_ids.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "suggestion must reference at least one movement".to_string(),
            ));
        }
        if self.expense_ids.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "suggestion must reference at least one expense".to_string(),
            ));
        }
        if self.confidence > 100 {
            return Err(ReconcileError::InvalidInput(format!(
                "confidence {} is outside 0..100",
                self.confidence
            )));
        }
        let implied =
            SuggestionKind::from_cardinality(self.movement_ids.len(), self.expense_ids.len());
        if self.kind != implied {
            return Err(ReconcileError::InvalidInput(format!(
                "kind {:?} does not match {} movement(s) and {} expense(s)",
                self.kind,
                self.movement_ids.len(),
                self.expense_ids.len()
            )));
        }
        Ok(())
    }

    /// Whether the suggestion still awaits a decision
    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::Pending
    }
}

/// Append-only audit row written when a suggestion is applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// The applied suggestion
    pub suggestion_id: String,
    /// Movement ids allocated by the application
    pub movement_ids: Vec<String>,
    /// Expense ids allocated by the application
    pub expense_ids: Vec<String>,
    /// When the allocation was written
    pub applied_at: NaiveDateTime,
}

/// Errors that can occur in the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Storage timeout: {0}")]
    StorageTimeout(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Suggestion not found: {0}")]
    SuggestionNotFound(String),
    #[error("Concurrent claim conflict: {0}")]
    ConcurrentClaimConflict(String),
    #[error("Partial write failure at step '{step}': {reason} (committed steps: {committed:?})")]
    PartialWriteFailure {
        step: String,
        reason: String,
        committed: Vec<String>,
    },
    #[error("Workflow already in flight for entity: {0}")]
    WorkflowInFlight(String),
}

impl ReconcileError {
    /// Whether the caller may retry after refetching state
    ///
    /// Timeouts and claim conflicts are recoverable; a partial write failure
    /// is fatal for its workflow instance and must not be retried blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::StorageTimeout(_)
                | ReconcileError::ConcurrentClaimConflict(_)
                | ReconcileError::WorkflowInFlight(_)
        )
    }
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
