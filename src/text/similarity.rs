//! Pairwise similarity scoring for receipt and invoice concept lines

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::text::normalizer::{NormalizerConfig, TextNormalizer};

const KEYWORD_WEIGHT: f64 = 0.3;
const SEQUENCE_WEIGHT: f64 = 0.5;
const NUMBER_WEIGHT: f64 = 0.2;

/// Transient pair score with its three sub-scores
///
/// Never persisted; recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConceptScore {
    /// Weighted composite in [0,1]
    pub score: f64,
    /// Jaccard overlap of keyword tokens
    pub keyword_jaccard: f64,
    /// Character-sequence similarity of the normalized strings
    pub sequence_ratio: f64,
    /// Overlap of extracted numeric tokens
    pub number_overlap: f64,
}

/// Winning pair of a cross-product comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestConceptMatch {
    /// Score of the winning pair
    pub score: ConceptScore,
    /// Index into the ticket-side list
    pub ticket_index: usize,
    /// Index into the invoice-side list
    pub invoice_index: usize,
}

/// Similarity band over the 0..100 aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptBand {
    None,
    Low,
    Medium,
    High,
}

/// Scores two short descriptive strings using normalizer output
#[derive(Debug, Clone)]
pub struct ConceptSimilarityScorer {
    normalizer: TextNormalizer,
}

impl ConceptSimilarityScorer {
    /// Create a scorer with the default normalizer configuration
    pub fn new() -> Self {
        Self::with_config(NormalizerConfig::default())
    }

    /// Create a scorer with an explicit normalizer configuration
    pub fn with_config(config: NormalizerConfig) -> Self {
        Self {
            normalizer: TextNormalizer::with_config(config),
        }
    }

    /// The normalizer backing this scorer
    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// Composite similarity of two concept strings
    pub fn score(&self, a: &str, b: &str) -> ConceptScore {
        let keyword_jaccard = jaccard(&self.normalizer.tokenize(a), &self.normalizer.tokenize(b));
        let sequence = sequence_ratio(&self.normalizer.normalize(a), &self.normalizer.normalize(b));
        let numbers = number_overlap(
            &self.normalizer.extract_numbers(a),
            &self.normalizer.extract_numbers(b),
        );
        let composite = KEYWORD_WEIGHT * keyword_jaccard
            + SEQUENCE_WEIGHT * sequence
            + NUMBER_WEIGHT * numbers;
        ConceptScore {
            // sums of the weighted parts can drift an ulp past 1.0
            score: composite.clamp(0.0, 1.0),
            keyword_jaccard,
            sequence_ratio: sequence,
            number_overlap: numbers,
        }
    }

    /// Best-scoring pair over the full cross product
    ///
    /// One corroborating line item is the meaningful signal, so the maximum
    /// pair score wins rather than any aggregate over all pairs. Returns
    /// `None` when either list is empty.
    pub fn best_match(
        &self,
        ticket_concepts: &[String],
        invoice_concepts: &[String],
    ) -> Option<BestConceptMatch> {
        let mut best: Option<BestConceptMatch> = None;
        for (ticket_index, ticket) in ticket_concepts.iter().enumerate() {
            for (invoice_index, invoice) in invoice_concepts.iter().enumerate() {
                let score = self.score(ticket, invoice);
                let better = match &best {
                    Some(current) => score.score > current.score.score,
                    None => true,
                };
                if better {
                    best = Some(BestConceptMatch {
                        score,
                        ticket_index,
                        invoice_index,
                    });
                }
            }
        }
        best
    }

    /// Best-match score scaled to an integer 0..100; 0 if either list is empty
    pub fn aggregate_score(&self, ticket_concepts: &[String], invoice_concepts: &[String]) -> u8 {
        match self.best_match(ticket_concepts, invoice_concepts) {
            Some(best) => (best.score.score * 100.0).round() as u8,
            None => 0,
        }
    }

    /// Band for a 0..100 aggregate score
    pub fn classify(score: u8) -> ConceptBand {
        match score {
            0..=29 => ConceptBand::None,
            30..=49 => ConceptBand::Low,
            50..=69 => ConceptBand::Medium,
            _ => ConceptBand::High,
        }
    }
}

impl Default for ConceptSimilarityScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// |A∩B| / |A∪B|; 0 when the union is empty
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

/// |A∩B| / max(1, |A∪B|)
///
/// Two empty sets score 0, not 1: no numeric signal is treated as no
/// corroboration, which caps digit-free concepts below quantity-bearing
/// ones (a known property of the weights, kept as-is).
pub fn number_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union.max(1) as f64
}

/// Character-sequence similarity ratio in [0,1]
///
/// Ratcliff/Obershelp over the best alignment: twice the total matched
/// length divided by the combined length, with matching blocks found
/// longest-first and ties broken earliest-first on both sides. 1.0 iff the
/// strings are identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_len(&a, &b) as f64 / total as f64
}

fn matching_len(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut regions = vec![(0usize, a.len(), 0usize, b.len())];
    while let Some((alo, ahi, blo, bhi)) = regions.pop() {
        if alo >= ahi || blo >= bhi {
            continue;
        }
        let (i, j, size) = longest_match(&a[alo..ahi], &b[blo..bhi]);
        if size == 0 {
            continue;
        }
        let (i, j) = (alo + i, blo + j);
        total += size;
        regions.push((alo, i, blo, j));
        regions.push((i + size, ahi, j + size, bhi));
    }
    total
}

/// Longest common block of two slices as (a offset, b offset, length)
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        let mut current = vec![0usize; b.len() + 1];
        for (j, &cb) in b.iter().enumerate() {
            if ca == cb {
                let run = prev[j] + 1;
                current[j + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        prev = current;
    }
    best
}
