//! Multi-factor confidence scoring between movements and expense groups

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::text::normalizer::{NormalizerConfig, TextNormalizer};
use crate::text::similarity::{jaccard, sequence_ratio};
use crate::types::{BankMovement, ExpenseRecord, FactorBreakdown, ReconcileError, ReconcileResult};

const AMOUNT_WEIGHT: f64 = 50.0;
const DATE_WEIGHT: f64 = 30.0;
const TEXT_WEIGHT: f64 = 20.0;
const DATE_DECAY_PER_DAY: f64 = 3.0;

/// Confidence band of a suggestion
///
/// Auto-eligible still requires explicit external confirmation; nothing in
/// this crate applies a suggestion on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    AutoEligible,
    Review,
    LowConfidence,
}

/// Immutable scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Maximum absolute amount deviation a split may carry
    pub amount_tolerance: BigDecimal,
    /// Confidence at or above which a suggestion is auto-eligible
    pub auto_eligible_threshold: u8,
    /// Confidence at or above which a suggestion enters the default output
    pub review_threshold: u8,
}

impl MatchConfig {
    /// Band for a 0..100 confidence value
    pub fn band(&self, confidence: u8) -> ConfidenceBand {
        if confidence >= self.auto_eligible_threshold {
            ConfidenceBand::AutoEligible
        } else if confidence >= self.review_threshold {
            ConfidenceBand::Review
        } else {
            ConfidenceBand::LowConfidence
        }
    }

    /// Validate threshold ordering and tolerance sign
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.auto_eligible_threshold > 100 {
            return Err(ReconcileError::InvalidInput(format!(
                "auto-eligible threshold {} is outside 0..100",
                self.auto_eligible_threshold
            )));
        }
        if self.review_threshold > self.auto_eligible_threshold {
            return Err(ReconcileError::InvalidInput(format!(
                "review threshold {} exceeds auto-eligible threshold {}",
                self.review_threshold, self.auto_eligible_threshold
            )));
        }
        if self.amount_tolerance < BigDecimal::from(0) {
            return Err(ReconcileError::InvalidInput(
                "amount tolerance must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            // one centavo
            amount_tolerance: BigDecimal::from(1) / BigDecimal::from(100),
            auto_eligible_threshold: 85,
            review_threshold: 60,
        }
    }
}

/// Factor computation for one movement against one expense group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    /// Rounded, clamped composite in 0..100
    pub total: u8,
    /// Amount factor, 0..50
    pub amount_score: f64,
    /// Date factor, 0..30
    pub date_score: f64,
    /// Text factor, 0..20
    pub text_score: f64,
}

impl MatchScore {
    /// Combine with a separately computed concept factor for persistence
    pub fn breakdown(&self, concept: u8) -> FactorBreakdown {
        FactorBreakdown {
            amount: self.amount_score.round() as u8,
            date: self.date_score.round() as u8,
            text: self.text_score.round() as u8,
            concept,
        }
    }
}

/// Scores candidate groupings between ledger movements and expenses
#[derive(Debug, Clone)]
pub struct MatchScorer {
    config: MatchConfig,
    normalizer: TextNormalizer,
}

impl MatchScorer {
    /// Create a scorer with default configuration
    pub fn new() -> Self {
        Self::with_config(MatchConfig::default(), NormalizerConfig::default())
    }

    /// Create a scorer with explicit configurations
    pub fn with_config(config: MatchConfig, normalizer: NormalizerConfig) -> Self {
        Self {
            config,
            normalizer: TextNormalizer::with_config(normalizer),
        }
    }

    /// The scoring configuration
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Score a movement against a non-empty expense group
    ///
    /// Factors: amount agreement (50), date proximity (30), description
    /// similarity (20). Movements carry signed amounts; the group sum is
    /// compared against the movement's magnitude.
    pub fn score(
        &self,
        movement: &BankMovement,
        group: &[ExpenseRecord],
    ) -> ReconcileResult<MatchScore> {
        if group.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "expense group must not be empty".to_string(),
            ));
        }

        let group_sum: BigDecimal = group.iter().map(|e| &e.amount).sum();
        let dates: Vec<NaiveDate> = group.iter().map(|e| e.date).collect();
        let combined = group
            .iter()
            .map(|e| e.description.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let amount_score = self.amount_score(&movement.magnitude(), &group_sum);
        let date_score = self.date_score(movement.date, &dates);
        let text_score = self.text_score(&movement.description, &combined);

        let total = (amount_score + date_score + text_score)
            .round()
            .clamp(0.0, 100.0) as u8;
        Ok(MatchScore {
            total,
            amount_score,
            date_score,
            text_score,
        })
    }

    /// Score a movement group against a single expense
    ///
    /// The symmetric direction: several movements settle one recorded
    /// expense. Movement magnitudes are summed and compared against the
    /// expense amount.
    pub fn score_movements(
        &self,
        movements: &[BankMovement],
        expense: &ExpenseRecord,
    ) -> ReconcileResult<MatchScore> {
        if movements.is_empty() {
            return Err(ReconcileError::InvalidInput(
                "movement group must not be empty".to_string(),
            ));
        }

        let group_sum: BigDecimal = movements.iter().map(|m| m.magnitude()).sum();
        let dates: Vec<NaiveDate> = movements.iter().map(|m| m.date).collect();
        let combined = movements
            .iter()
            .map(|m| m.description.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let amount_score = self.amount_score(&expense.amount, &group_sum);
        let date_score = self.date_score(expense.date, &dates);
        let text_score = self.text_score(&expense.description, &combined);

        let total = (amount_score + date_score + text_score)
            .round()
            .clamp(0.0, 100.0) as u8;
        Ok(MatchScore {
            total,
            amount_score,
            date_score,
            text_score,
        })
    }

    fn amount_score(&self, target: &BigDecimal, group_sum: &BigDecimal) -> f64 {
        if *target == BigDecimal::from(0) {
            // a zero target only agrees with a zero-sum group
            return if *group_sum == BigDecimal::from(0) {
                AMOUNT_WEIGHT
            } else {
                0.0
            };
        }
        let deviation = (target - group_sum).abs();
        let ratio = (&deviation / target).to_f64().unwrap_or(1.0);
        (AMOUNT_WEIGHT - AMOUNT_WEIGHT * ratio).max(0.0)
    }

    fn date_score(&self, target: NaiveDate, dates: &[NaiveDate]) -> f64 {
        let total_days: i64 = dates.iter().map(|d| (target - *d).num_days().abs()).sum();
        let mean_abs_delta = total_days as f64 / dates.len() as f64;
        (DATE_WEIGHT - DATE_DECAY_PER_DAY * mean_abs_delta).max(0.0)
    }

    fn text_score(&self, target_text: &str, group_text: &str) -> f64 {
        let keyword_overlap = jaccard(
            &self.normalizer.tokenize(target_text),
            &self.normalizer.tokenize(group_text),
        );
        let sequence = sequence_ratio(
            &self.normalizer.normalize(target_text),
            &self.normalizer.normalize(group_text),
        );
        TEXT_WEIGHT * (keyword_overlap + sequence) / 2.0
    }
}

impl Default for MatchScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn movement(amount: &str, day: u32, description: &str) -> BankMovement {
        BankMovement::new(
            "mov1".to_string(),
            "tenant1".to_string(),
            BigDecimal::from_str(amount).unwrap(),
            date(2025, 1, day),
            description.to_string(),
        )
    }

    fn expense(id: &str, amount: &str, day: u32, description: &str) -> ExpenseRecord {
        ExpenseRecord::new(
            id.to_string(),
            "tenant1".to_string(),
            BigDecimal::from_str(amount).unwrap(),
            date(2025, 1, day),
            description.to_string(),
            vec![],
        )
    }

    #[test]
    fn test_amount_score_exact_match() {
        let scorer = MatchScorer::new();
        let score = scorer
            .score(
                &movement("850.50", 17, "PEMEX"),
                &[expense("e1", "850.50", 17, "PEMEX")],
            )
            .unwrap();
        assert_eq!(score.amount_score, 50.0);
        assert_eq!(score.total, 100);
    }

    #[test]
    fn test_amount_score_zero_at_full_deviation() {
        let scorer = MatchScorer::new();
        let score = scorer
            .score(
                &movement("100.00", 17, "PEMEX"),
                &[expense("e1", "250.00", 17, "PEMEX")],
            )
            .unwrap();
        assert_eq!(score.amount_score, 0.0);
    }

    #[test]
    fn test_zero_movement_amount() {
        let scorer = MatchScorer::new();
        let zero_group = scorer
            .score(
                &movement("0", 17, "AJUSTE"),
                &[expense("e1", "0", 17, "AJUSTE")],
            )
            .unwrap();
        assert_eq!(zero_group.amount_score, 50.0);

        let nonzero_group = scorer
            .score(
                &movement("0", 17, "AJUSTE"),
                &[expense("e1", "10.00", 17, "AJUSTE")],
            )
            .unwrap();
        assert_eq!(nonzero_group.amount_score, 0.0);
    }

    #[test]
    fn test_negative_movement_uses_magnitude() {
        let scorer = MatchScorer::new();
        let score = scorer
            .score(
                &movement("-850.50", 17, "PEMEX"),
                &[expense("e1", "850.50", 17, "PEMEX")],
            )
            .unwrap();
        assert_eq!(score.amount_score, 50.0);
    }

    #[test]
    fn test_split_group_scores_auto_eligible() {
        let scorer = MatchScorer::new();
        let group = vec![
            expense("e1", "300.00", 15, "PEMEX GASOLINERA 5467"),
            expense("e2", "300.00", 15, "PEMEX GASOLINERA 5467"),
            expense("e3", "250.50", 16, "PEMEX GASOLINERA 5467"),
        ];
        let score = scorer
            .score(&movement("850.50", 17, "PEMEX GASOLINERA 5467"), &group)
            .unwrap();

        assert_eq!(score.amount_score, 50.0);
        // deltas 2, 2, 1 days; mean 5/3
        assert!((score.date_score - 25.0).abs() < 1e-9);
        assert!(score.text_score > 14.0);
        assert_eq!(score.total, 90);
        assert_eq!(
            scorer.config().band(score.total),
            ConfidenceBand::AutoEligible
        );
    }

    #[test]
    fn test_movement_group_scores_symmetrically() {
        let scorer = MatchScorer::new();
        let movements = vec![
            movement("-300.00", 15, "PEMEX 5532 GASOLINERA"),
            movement("-550.50", 16, "PEMEX 5532 GASOLINERA"),
        ];
        let score = scorer
            .score_movements(
                &movements,
                &expense("e1", "850.50", 17, "PEMEX 5532 GASOLINERA"),
            )
            .unwrap();

        assert_eq!(score.amount_score, 50.0);
        // deltas 2 and 1 days against the expense date
        assert!((score.date_score - 25.5).abs() < 1e-9);
        assert_eq!(score.total, 92);
    }

    #[test]
    fn test_empty_movement_group_is_invalid_input() {
        let scorer = MatchScorer::new();
        let result = scorer.score_movements(&[], &expense("e1", "100.00", 17, "PAGO"));
        assert!(matches!(result, Err(ReconcileError::InvalidInput(_))));
    }

    #[test]
    fn test_date_decay_reaches_zero() {
        let scorer = MatchScorer::new();
        // 11 days out: 30 - 33 < 0
        let score = scorer
            .score(
                &movement("100.00", 28, "PAGO"),
                &[expense("e1", "100.00", 17, "PAGO")],
            )
            .unwrap();
        assert_eq!(score.date_score, 0.0);
    }

    #[test]
    fn test_empty_group_is_invalid_input() {
        let scorer = MatchScorer::new();
        let result = scorer.score(&movement("100.00", 17, "PAGO"), &[]);
        assert!(matches!(result, Err(ReconcileError::InvalidInput(_))));
    }

    #[test]
    fn test_total_stays_in_range() {
        let scorer = MatchScorer::new();
        let score = scorer
            .score(
                &movement("100.00", 1, "ABC"),
                &[expense("e1", "900.00", 28, "XYZ")],
            )
            .unwrap();
        assert_eq!(score.total, 0);
    }

    #[test]
    fn test_config_band_thresholds() {
        let config = MatchConfig::default();
        assert_eq!(config.band(85), ConfidenceBand::AutoEligible);
        assert_eq!(config.band(84), ConfidenceBand::Review);
        assert_eq!(config.band(60), ConfidenceBand::Review);
        assert_eq!(config.band(59), ConfidenceBand::LowConfidence);
    }

    #[test]
    fn test_config_validation() {
        let mut config = MatchConfig::default();
        config.review_threshold = 90;
        assert!(config.validate().is_err());

        let mut config = MatchConfig::default();
        config.amount_tolerance = BigDecimal::from(-1);
        assert!(config.validate().is_err());

        assert!(MatchConfig::default().validate().is_ok());
    }
}
