//! Validation and parsing for collaborator-fed records

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tracing::warn;

use crate::text::normalizer::canonical_decimal;
use crate::types::{
    BankMovement, ExpenseRecord, RawBankMovement, RawExpenseRecord, ReconcileError,
    ReconcileResult,
};

/// Accepted date shapes, tried in order
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Validate a record identifier
pub fn validate_record_id(id: &str, label: &str) -> ReconcileResult<()> {
    if id.trim().is_empty() {
        return Err(ReconcileError::InvalidInput(format!(
            "{label} id cannot be empty"
        )));
    }

    if id.len() > 64 {
        return Err(ReconcileError::InvalidInput(format!(
            "{label} id cannot exceed 64 characters"
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ReconcileError::InvalidInput(format!(
            "{label} id can only contain alphanumeric characters, dashes, and underscores"
        )));
    }

    Ok(())
}

/// Parse a string amount as fed by bank and expense collaborators
///
/// Accepts an optional leading minus and either separator convention
/// ("1,234.56" and "1.234,56" both parse to the same value).
pub fn parse_amount(raw: &str) -> ReconcileResult<BigDecimal> {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };

    if digits.is_empty()
        || !digits
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return Err(ReconcileError::InvalidInput(format!(
            "unparseable amount '{raw}'"
        )));
    }

    let canonical = canonical_decimal(digits).ok_or_else(|| {
        ReconcileError::InvalidInput(format!("unparseable amount '{raw}'"))
    })?;
    let amount = BigDecimal::from_str(&canonical).map_err(|_| {
        ReconcileError::InvalidInput(format!("unparseable amount '{raw}'"))
    })?;

    Ok(if negative { -amount } else { amount })
}

/// Parse a string date in any of the accepted shapes
pub fn parse_date(raw: &str) -> ReconcileResult<NaiveDate> {
    let trimmed = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    Err(ReconcileError::InvalidInput(format!(
        "unparseable date '{raw}'"
    )))
}

/// Parse raw movements, logging and counting each skip
pub fn parse_movements(raw: &[RawBankMovement]) -> (Vec<BankMovement>, usize) {
    let mut kept = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for record in raw {
        match BankMovement::from_raw(record) {
            Ok(movement) => kept.push(movement),
            Err(error) => {
                warn!(movement_id = %record.id, error = %error, "skipping unparseable movement");
                skipped += 1;
            }
        }
    }
    (kept, skipped)
}

/// Parse raw expenses, logging and counting each skip
pub fn parse_expenses(raw: &[RawExpenseRecord]) -> (Vec<ExpenseRecord>, usize) {
    let mut kept = Vec::with_capacity(raw.len());
    let mut skipped = 0;
    for record in raw {
        match ExpenseRecord::from_raw(record) {
            Ok(expense) => kept.push(expense),
            Err(error) => {
                warn!(expense_id = %record.id, error = %error, "skipping unparseable expense");
                skipped += 1;
            }
        }
    }
    (kept, skipped)
}

/// Keep valid movements, logging and counting each skip
pub fn sanitize_movements(movements: &[BankMovement]) -> (Vec<BankMovement>, usize) {
    let mut kept = Vec::with_capacity(movements.len());
    let mut skipped = 0;
    for movement in movements {
        match movement.validate() {
            Ok(()) => kept.push(movement.clone()),
            Err(error) => {
                warn!(movement_id = %movement.id, error = %error, "skipping invalid movement");
                skipped += 1;
            }
        }
    }
    (kept, skipped)
}

/// Keep valid expenses, logging and counting each skip
pub fn sanitize_expenses(expenses: &[ExpenseRecord]) -> (Vec<ExpenseRecord>, usize) {
    let mut kept = Vec::with_capacity(expenses.len());
    let mut skipped = 0;
    for expense in expenses {
        match expense.validate() {
            Ok(()) => kept.push(expense.clone()),
            Err(error) => {
                warn!(expense_id = %expense.id, error = %error, "skipping invalid expense");
                skipped += 1;
            }
        }
    }
    (kept, skipped)
}
