//! Bounded subset-sum search for split and combined payments
//!
//! One bank movement often settles several expense records at once. This
//! search enumerates small subsets of a candidate pool whose amounts sum to
//! a target within tolerance, under a hard node budget so adversarial pools
//! cannot stall a batch. Sums are quantized to integer cents during the
//! search and re-verified exactly before a candidate is returned.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{BankMovement, ExpenseRecord, ReconcileError, ReconcileResult};

/// Search limits and pre-filter windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum absolute deviation between a subset sum and the target
    pub tolerance: BigDecimal,
    /// Largest subset the search will form
    pub max_group_size: usize,
    /// Number of ranked candidates returned per target
    pub max_results: usize,
    /// Node budget per target; the search returns its best-so-far
    /// candidates once the budget is spent
    pub max_nodes: u64,
    /// Pool size above which the amount and date pre-filter runs
    pub prefilter_threshold: usize,
    /// Pre-filter keeps items within this many days of the target date
    pub date_window_days: i64,
}

impl SearchConfig {
    /// Validate limits before a search runs
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.tolerance < BigDecimal::from(0) {
            return Err(ReconcileError::InvalidInput(
                "search tolerance must not be negative".to_string(),
            ));
        }
        if self.max_group_size == 0 {
            return Err(ReconcileError::InvalidInput(
                "max group size must be at least 1".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(ReconcileError::InvalidInput(
                "max results must be at least 1".to_string(),
            ));
        }
        if self.max_nodes == 0 {
            return Err(ReconcileError::InvalidInput(
                "node budget must be at least 1".to_string(),
            ));
        }
        if self.date_window_days < 0 {
            return Err(ReconcileError::InvalidInput(
                "date window must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            // one centavo
            tolerance: BigDecimal::from(1) / BigDecimal::from(100),
            max_group_size: 4,
            max_results: 5,
            max_nodes: 100_000,
            prefilter_threshold: 64,
            date_window_days: 30,
        }
    }
}

/// One searchable record, reduced to the fields the search needs
///
/// Amounts are assumed non-negative; movements contribute their magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitItem {
    pub id: String,
    pub amount: BigDecimal,
    pub date: NaiveDate,
}

impl From<&ExpenseRecord> for SplitItem {
    fn from(record: &ExpenseRecord) -> Self {
        Self {
            id: record.id.clone(),
            amount: record.amount.clone(),
            date: record.date,
        }
    }
}

impl From<&BankMovement> for SplitItem {
    fn from(movement: &BankMovement) -> Self {
        Self {
            id: movement.id.clone(),
            amount: movement.magnitude(),
            date: movement.date,
        }
    }
}

/// A subset whose sum lies within tolerance of the target
#[derive(Debug, Clone, PartialEq)]
pub struct SplitCandidate {
    /// Positions into the original pool, ascending
    pub indices: Vec<usize>,
    /// Exact sum of the subset amounts
    pub sum: BigDecimal,
    /// Signed deviation, subset sum minus target
    pub deviation: BigDecimal,
}

/// Result of one search run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Candidates ranked by absolute deviation, then subset size, then
    /// earliest pool position
    pub candidates: Vec<SplitCandidate>,
    pub nodes_visited: u64,
    /// True when the node budget ran out before the enumeration finished
    pub budget_exhausted: bool,
}

/// Finds expense subsets that settle a movement amount, or vice versa
#[derive(Debug, Clone)]
pub struct SplitCombinationSearch {
    config: SearchConfig,
}

impl SplitCombinationSearch {
    /// Create a search with default limits
    pub fn new() -> Self {
        Self::with_config(SearchConfig::default())
    }

    /// Create a search with explicit limits
    pub fn with_config(config: SearchConfig) -> Self {
        Self { config }
    }

    /// The search configuration
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Enumerate pool subsets whose sums fall within tolerance of `target`
    ///
    /// Large pools are first narrowed to items no larger than the target
    /// plus tolerance and no further than the date window from
    /// `target_date`. Candidate indices always refer to the original pool.
    pub fn find_candidates(
        &self,
        target: &BigDecimal,
        target_date: NaiveDate,
        pool: &[SplitItem],
    ) -> SearchOutcome {
        let eligible: Vec<usize> = if pool.len() > self.config.prefilter_threshold {
            let amount_cap = target + &self.config.tolerance;
            pool.iter()
                .enumerate()
                .filter(|(_, item)| {
                    item.amount <= amount_cap
                        && (item.date - target_date).num_days().abs()
                            <= self.config.date_window_days
                })
                .map(|(i, _)| i)
                .collect()
        } else {
            (0..pool.len()).collect()
        };

        // Sort descending by amount so overshoot skips forward and the
        // remaining-sum bound tightens monotonically. Ties keep pool order.
        let mut order: Vec<(usize, i64)> = eligible
            .into_iter()
            .map(|i| (i, to_cents(&pool[i].amount)))
            .collect();
        order.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let cents: Vec<i64> = order.iter().map(|&(_, c)| c).collect();
        let mut prefix = vec![0i64; cents.len() + 1];
        for (i, c) in cents.iter().enumerate() {
            prefix[i + 1] = prefix[i].saturating_add(*c);
        }

        // One cent of slack absorbs quantization of sub-cent amounts; the
        // exact check below enforces the real tolerance.
        let target_cents = to_cents(target);
        let tolerance_cents = to_cents(&self.config.tolerance).saturating_add(1);
        let mut dfs = SubsetDfs {
            cents: &cents,
            prefix: &prefix,
            lo: target_cents.saturating_sub(tolerance_cents),
            hi: target_cents.saturating_add(tolerance_cents),
            max_group_size: self.config.max_group_size,
            max_nodes: self.config.max_nodes,
            nodes_visited: 0,
            budget_exhausted: false,
            found: Vec::new(),
        };
        dfs.descend(0, 0, &mut Vec::new());

        let mut candidates: Vec<SplitCandidate> = Vec::new();
        for positions in &dfs.found {
            let mut indices: Vec<usize> = positions.iter().map(|&p| order[p].0).collect();
            indices.sort_unstable();
            let sum: BigDecimal = indices.iter().map(|&i| &pool[i].amount).sum();
            let deviation = &sum - target;
            if deviation.abs() <= self.config.tolerance {
                candidates.push(SplitCandidate {
                    indices,
                    sum,
                    deviation,
                });
            }
        }
        candidates.sort_by(|a, b| {
            a.deviation
                .abs()
                .cmp(&b.deviation.abs())
                .then_with(|| a.indices.len().cmp(&b.indices.len()))
                .then_with(|| a.indices.cmp(&b.indices))
        });
        candidates.truncate(self.config.max_results);

        if dfs.budget_exhausted {
            debug!(
                nodes_visited = dfs.nodes_visited,
                pool_size = pool.len(),
                candidates = candidates.len(),
                "node budget exhausted; returning best-so-far candidates"
            );
        }

        SearchOutcome {
            candidates,
            nodes_visited: dfs.nodes_visited,
            budget_exhausted: dfs.budget_exhausted,
        }
    }
}

impl Default for SplitCombinationSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// Amounts quantized to cents; values beyond i64 saturate and are excluded
/// by the overshoot bound
fn to_cents(amount: &BigDecimal) -> i64 {
    (amount * BigDecimal::from(100))
        .round(0)
        .to_i64()
        .unwrap_or(i64::MAX)
}

struct SubsetDfs<'a> {
    cents: &'a [i64],
    prefix: &'a [i64],
    lo: i64,
    hi: i64,
    max_group_size: usize,
    max_nodes: u64,
    nodes_visited: u64,
    budget_exhausted: bool,
    /// Positions into the sorted order, one entry per in-window subset
    found: Vec<Vec<usize>>,
}

impl SubsetDfs<'_> {
    fn descend(&mut self, start: usize, sum: i64, stack: &mut Vec<usize>) {
        for pos in start..self.cents.len() {
            if self.budget_exhausted {
                return;
            }
            self.nodes_visited += 1;
            if self.nodes_visited > self.max_nodes {
                self.budget_exhausted = true;
                return;
            }

            let next = sum.saturating_add(self.cents[pos]);
            if next > self.hi {
                // overshoot; later items are no larger and may still fit
                continue;
            }

            stack.push(pos);
            if next >= self.lo {
                self.found.push(stack.clone());
            }
            let slots = self.max_group_size - stack.len();
            let best = next.saturating_add(self.max_gain(pos + 1, slots));
            if slots > 0 && best >= self.lo {
                self.descend(pos + 1, next, stack);
            }
            stack.pop();

            // No later branch can reach the window either: every remaining
            // item is no larger than this one, and so is its best extension.
            if next < self.lo && best < self.lo {
                break;
            }
        }
    }

    /// Largest sum obtainable from up to `slots` items at or after `from`
    fn max_gain(&self, from: usize, slots: usize) -> i64 {
        let to = (from + slots).min(self.cents.len());
        if from >= to {
            return 0;
        }
        self.prefix[to] - self.prefix[from]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn item(id: &str, amount: &str, m: u32, d: u32) -> SplitItem {
        SplitItem {
            id: id.to_string(),
            amount: BigDecimal::from_str(amount).unwrap(),
            date: date(m, d),
        }
    }

    fn amount(raw: &str) -> BigDecimal {
        BigDecimal::from_str(raw).unwrap()
    }

    #[test]
    fn test_exact_triple_found() {
        let search = SplitCombinationSearch::new();
        let pool = vec![
            item("e1", "300.00", 1, 15),
            item("e2", "300.00", 1, 15),
            item("e3", "250.50", 1, 16),
        ];
        let outcome = search.find_candidates(&amount("850.50"), date(1, 17), &pool);

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].indices, vec![0, 1, 2]);
        assert_eq!(outcome.candidates[0].sum, amount("850.50"));
        assert_eq!(outcome.candidates[0].deviation, BigDecimal::from(0));
        assert!(!outcome.budget_exhausted);
    }

    #[test]
    fn test_single_item_candidate() {
        let search = SplitCombinationSearch::new();
        let pool = vec![
            item("e1", "300.00", 1, 15),
            item("e2", "300.00", 1, 15),
            item("e3", "250.50", 1, 16),
        ];
        let outcome = search.find_candidates(&amount("250.50"), date(1, 16), &pool);

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].indices, vec![2]);
    }

    #[test]
    fn test_ranked_by_deviation_then_size() {
        let search = SplitCombinationSearch::with_config(SearchConfig {
            tolerance: amount("0.05"),
            ..SearchConfig::default()
        });
        let pool = vec![
            item("a", "100.00", 1, 15),
            item("b", "99.99", 1, 15),
            item("c", "50.00", 1, 15),
            item("d", "50.00", 1, 15),
        ];
        let outcome = search.find_candidates(&amount("100.00"), date(1, 15), &pool);

        let ranked: Vec<Vec<usize>> = outcome
            .candidates
            .iter()
            .map(|c| c.indices.clone())
            .collect();
        assert_eq!(ranked, vec![vec![0], vec![2, 3], vec![1]]);
        assert_eq!(outcome.candidates[2].deviation, amount("-0.01"));
    }

    #[test]
    fn test_first_n_results_in_pool_order() {
        let search = SplitCombinationSearch::with_config(SearchConfig {
            max_results: 3,
            ..SearchConfig::default()
        });
        let pool: Vec<SplitItem> = (0..5)
            .map(|i| item(&format!("e{i}"), "10.00", 1, 15))
            .collect();
        let outcome = search.find_candidates(&amount("10.00"), date(1, 15), &pool);

        let ranked: Vec<Vec<usize>> = outcome
            .candidates
            .iter()
            .map(|c| c.indices.clone())
            .collect();
        assert_eq!(ranked, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_group_size_bound() {
        let pool: Vec<SplitItem> = (0..5)
            .map(|i| item(&format!("e{i}"), "25.00", 1, 15))
            .collect();
        let target = amount("125.00");

        let bounded = SplitCombinationSearch::new();
        assert!(bounded
            .find_candidates(&target, date(1, 15), &pool)
            .candidates
            .is_empty());

        let wider = SplitCombinationSearch::with_config(SearchConfig {
            max_group_size: 5,
            ..SearchConfig::default()
        });
        let outcome = wider.find_candidates(&target, date(1, 15), &pool);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_node_budget_exhaustion() {
        let search = SplitCombinationSearch::with_config(SearchConfig {
            max_nodes: 50,
            ..SearchConfig::default()
        });
        let pool: Vec<SplitItem> = (0..30)
            .map(|i| item(&format!("e{i}"), "1.00", 1, 15))
            .collect();
        let outcome = search.find_candidates(&amount("2.50"), date(1, 15), &pool);

        assert!(outcome.budget_exhausted);
        assert!(outcome.candidates.is_empty());
        assert!(outcome.nodes_visited <= 51);

        let again = search.find_candidates(&amount("2.50"), date(1, 15), &pool);
        assert_eq!(outcome, again);
    }

    #[test]
    fn test_budget_keeps_best_so_far() {
        let search = SplitCombinationSearch::with_config(SearchConfig {
            max_nodes: 10,
            ..SearchConfig::default()
        });
        let mut pool = vec![item("hit", "2.50", 1, 15)];
        pool.extend((0..30).map(|i| item(&format!("e{i}"), "1.00", 1, 15)));
        let outcome = search.find_candidates(&amount("2.50"), date(1, 15), &pool);

        assert!(outcome.budget_exhausted);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].indices, vec![0]);
    }

    #[test]
    fn test_prefilter_drops_distant_dates_and_oversize_amounts() {
        let config = SearchConfig {
            prefilter_threshold: 2,
            ..SearchConfig::default()
        };
        let search = SplitCombinationSearch::with_config(config.clone());

        // exact amount, but 64 days out
        let pool = vec![
            item("far", "60.50", 3, 20),
            item("a", "10.00", 1, 15),
            item("b", "20.00", 1, 16),
        ];
        let outcome = search.find_candidates(&amount("60.50"), date(1, 15), &pool);
        assert!(outcome.candidates.is_empty());

        let unfiltered = SplitCombinationSearch::with_config(SearchConfig {
            prefilter_threshold: 10,
            ..config.clone()
        });
        let outcome = unfiltered.find_candidates(&amount("60.50"), date(1, 15), &pool);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].indices, vec![0]);

        // indices keep referring to the original pool after filtering
        let pool = vec![
            item("big", "5000.00", 1, 15),
            item("a", "10.00", 1, 15),
            item("b", "20.00", 1, 16),
            item("c", "30.50", 1, 17),
        ];
        let outcome = search.find_candidates(&amount("60.50"), date(1, 15), &pool);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].indices, vec![1, 2, 3]);
    }

    #[test]
    fn test_tolerance_is_exact() {
        let pool = vec![item("a", "100.00", 1, 15), item("b", "100.02", 1, 15)];
        let target = amount("100.01");

        let strict = SplitCombinationSearch::with_config(SearchConfig {
            tolerance: BigDecimal::from(0),
            ..SearchConfig::default()
        });
        assert!(strict
            .find_candidates(&target, date(1, 15), &pool)
            .candidates
            .is_empty());

        let lax = SplitCombinationSearch::new();
        let outcome = lax.find_candidates(&target, date(1, 15), &pool);
        let ranked: Vec<Vec<usize>> = outcome
            .candidates
            .iter()
            .map(|c| c.indices.clone())
            .collect();
        assert_eq!(ranked, vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_empty_pool() {
        let search = SplitCombinationSearch::new();
        let outcome = search.find_candidates(&amount("100.00"), date(1, 15), &[]);
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.nodes_visited, 0);
        assert!(!outcome.budget_exhausted);
    }

    #[test]
    fn test_split_item_from_records() {
        let expense = ExpenseRecord::new(
            "e1".to_string(),
            "tenant1".to_string(),
            amount("250.50"),
            date(1, 16),
            "Gasolina".to_string(),
            vec![],
        );
        let from_expense = SplitItem::from(&expense);
        assert_eq!(from_expense.id, "e1");
        assert_eq!(from_expense.amount, amount("250.50"));

        let movement = BankMovement::new(
            "m1".to_string(),
            "tenant1".to_string(),
            amount("-850.50"),
            date(1, 17),
            "PEMEX".to_string(),
        );
        let from_movement = SplitItem::from(&movement);
        assert_eq!(from_movement.amount, amount("850.50"));
    }

    #[test]
    fn test_config_validation() {
        assert!(SearchConfig::default().validate().is_ok());

        let negative_tolerance = SearchConfig {
            tolerance: BigDecimal::from(-1),
            ..SearchConfig::default()
        };
        assert!(negative_tolerance.validate().is_err());

        let zero_group = SearchConfig {
            max_group_size: 0,
            ..SearchConfig::default()
        };
        assert!(zero_group.validate().is_err());

        let zero_results = SearchConfig {
            max_results: 0,
            ..SearchConfig::default()
        };
        assert!(zero_results.validate().is_err());

        let zero_nodes = SearchConfig {
            max_nodes: 0,
            ..SearchConfig::default()
        };
        assert!(zero_nodes.validate().is_err());

        let negative_window = SearchConfig {
            date_window_days: -1,
            ..SearchConfig::default()
        };
        assert!(negative_window.validate().is_err());
    }
}
