//! Suggestion engine usage example

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;

use reconcile_core::utils::MemoryStore;
use reconcile_core::{
    init_tracing, BankMovement, ConfidenceBand, ExpenseRecord, ReconciliationSuggestionEngine,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    println!("🏦 Reconcile Core - Suggestion Engine Example\n");

    let store = MemoryStore::new();
    let mut engine = ReconciliationSuggestionEngine::new(store.clone());

    // 1. The two pools as they arrive from their collaborators: bank
    //    movements on one side, captured expenses on the other. There is
    //    no shared key between them.
    println!("📥 Incoming pools...");

    let movements = vec![
        bank("mov-001", "-850.50", 17, "CARGO PEMEX GASOLINERA 5467"),
        bank("mov-002", "-1250.00", 20, "TRANSFERENCIA SPEI RENTA ENERO"),
        bank("mov-003", "-89.99", 12, "PAGO TARJETA SUSCRIPCION NUBE"),
    ];
    let expenses = vec![
        spend(
            "exp-101",
            "300.00",
            15,
            "PEMEX GASOLINERA 5467",
            &["Gasolina Magna 40 litros"],
        ),
        spend(
            "exp-102",
            "300.00",
            15,
            "PEMEX GASOLINERA 5467",
            &["Gasolina Magna 38 litros"],
        ),
        spend(
            "exp-103",
            "250.50",
            16,
            "PEMEX GASOLINERA 5467",
            &["Combustible Premium"],
        ),
        spend(
            "exp-104",
            "1250.00",
            20,
            "RENTA OFICINA ENERO",
            &["Renta mensual oficina"],
        ),
        spend("exp-105", "175.25", 11, "PAPELERIA OFICINA", &[]),
    ];

    for movement in &movements {
        println!(
            "  {} {:>10} {} {}",
            movement.date, movement.amount, movement.id, movement.description
        );
    }
    for expense in &expenses {
        println!(
            "  {} {:>10} {} {}",
            expense.date, expense.amount, expense.id, expense.description
        );
    }
    println!();

    // 2. Generate suggestions. This is pure computation: nothing is
    //    persisted and no record is claimed yet.
    println!("🔎 Generating suggestions...\n");
    let batch = engine.generate_suggestions(&movements, &expenses)?;

    for suggestion in &batch.suggestions {
        let band = match engine.config().matching.band(suggestion.confidence) {
            ConfidenceBand::AutoEligible => "auto-eligible",
            ConfidenceBand::Review => "needs review",
            ConfidenceBand::LowConfidence => "low confidence",
        };
        println!(
            "  💡 {:?} {:?} -> {:?}",
            suggestion.kind, suggestion.movement_ids, suggestion.expense_ids
        );
        println!(
            "     confidence {} ({band}); amount {}, date {}, text {}, concept {}",
            suggestion.confidence,
            suggestion.breakdown.amount,
            suggestion.breakdown.date,
            suggestion.breakdown.text,
            suggestion.breakdown.concept
        );
    }
    println!(
        "\n  Unmatched movements: {:?}",
        batch.unmatched_movement_ids
    );
    println!("  Unmatched expenses:  {:?}", batch.unmatched_expense_ids);
    println!();

    // 3. Persist the batch, then confirm the auto-eligible suggestions.
    //    A high confidence never applies anything by itself; applying is
    //    always an explicit call, and each apply claims its records,
    //    writes the allocation audit row, and flips the status as one
    //    atomic workflow.
    println!("✅ Applying auto-eligible suggestions...");
    engine.record_batch(&batch).await?;

    for suggestion in &batch.suggestions {
        if engine.config().matching.band(suggestion.confidence) != ConfidenceBand::AutoEligible {
            continue;
        }
        let applied = engine.apply_suggestion(&suggestion.id).await?;
        println!(
            "  ✓ Applied {:?} with confidence {}",
            applied.expense_ids, applied.confidence
        );
    }
    println!();

    // 4. A later pass over the same pools may still propose the same
    //    grouping, but its records are claimed now, so applying it is
    //    refused instead of double-allocating.
    println!("🔁 Re-applying over claimed records...");
    let rerun = engine.generate_suggestions(&movements, &expenses)?;
    engine.record_batch(&rerun).await?;
    match engine.apply_suggestion(&rerun.suggestions[0].id).await {
        Err(error) => println!("  ✗ Refused as expected: {error}"),
        Ok(_) => println!("  ⚠ duplicate apply went through, this should not happen"),
    }
    println!();

    // 5. Final state
    println!("📋 Final state:");
    let allocations = engine.list_allocations().await?;
    for allocation in &allocations {
        println!(
            "  {} -> movements {:?}, expenses {:?}",
            allocation.suggestion_id, allocation.movement_ids, allocation.expense_ids
        );
    }
    println!("  Allocations written: {}", allocations.len());

    Ok(())
}

fn bank(id: &str, amount: &str, day: u32, description: &str) -> BankMovement {
    BankMovement::new(
        id.to_string(),
        "tenant-demo".to_string(),
        BigDecimal::from_str(amount).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
        description.to_string(),
    )
}

fn spend(id: &str, amount: &str, day: u32, description: &str, concepts: &[&str]) -> ExpenseRecord {
    ExpenseRecord::new(
        id.to_string(),
        "tenant-demo".to_string(),
        BigDecimal::from_str(amount).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
        description.to_string(),
        concepts.iter().map(|c| c.to_string()).collect(),
    )
}
