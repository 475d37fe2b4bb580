//! Canonicalization and tokenization of free-form record text

use bigdecimal::BigDecimal;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

/// Function words dropped during tokenization
///
/// Bank feeds and CFDI lines are Spanish; a few English words show up in
/// card-processor descriptions.
const DEFAULT_STOPWORDS: &[&str] = &[
    "de", "del", "la", "las", "el", "los", "lo", "un", "una", "unos", "unas", "y", "o", "u", "a",
    "al", "en", "con", "sin", "por", "para", "se", "su", "sus", "que", "es", "mas", "como", "the",
    "of", "and", "or", "for", "to", "in", "on", "at", "by", "with", "from",
];

/// Immutable tokenizer configuration
///
/// Stopword catalogs must not live as process-wide globals; build one of
/// these once and pass it into the normalizer and scorers that share it.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Tokens dropped after normalization
    pub stopwords: HashSet<String>,
}

impl NormalizerConfig {
    /// Build a configuration from an explicit stopword list
    pub fn with_stopwords<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stopwords: words.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self::with_stopwords(DEFAULT_STOPWORDS.iter().copied())
    }
}

/// Canonicalizes record text and extracts keyword and numeric tokens
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    config: NormalizerConfig,
}

impl TextNormalizer {
    /// Create a normalizer with the default stopword list
    pub fn new() -> Self {
        Self::with_config(NormalizerConfig::default())
    }

    /// Create a normalizer with an explicit configuration
    pub fn with_config(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Canonical form: lowercase, diacritics stripped, punctuation reduced
    /// to single spaces, trimmed. Idempotent.
    pub fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            for lower in ch.to_lowercase() {
                let folded = fold_diacritic(lower);
                if folded.is_ascii_alphanumeric() {
                    out.push(folded);
                } else if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
        }
        while out.ends_with(' ') {
            out.pop();
        }
        out
    }

    /// Keyword tokens: normalized words minus stopwords and pure-numeric
    /// tokens, in deterministic order
    pub fn tokenize(&self, text: &str) -> BTreeSet<String> {
        self.normalize(text)
            .split_whitespace()
            .filter(|token| !self.config.stopwords.contains(*token))
            .filter(|token| !token.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .collect()
    }

    /// All integer/decimal substrings with the decimal separator normalized
    ///
    /// Scans the raw text, not the normalized form, because normalization
    /// turns separators into spaces. Both `1,234.56` and `1.234,56`
    /// canonicalize to `1234.56`; trailing fractional zeros are dropped so
    /// `40.0` and `40` compare equal.
    pub fn extract_numbers(&self, text: &str) -> BTreeSet<String> {
        let mut numbers = BTreeSet::new();
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i].is_ascii_digit() {
                let mut raw = String::new();
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == ',')
                {
                    raw.push(chars[i]);
                    i += 1;
                }
                if let Some(canonical) = canonical_decimal(&raw) {
                    numbers.insert(canonical);
                }
            } else {
                i += 1;
            }
        }
        numbers
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// Canonicalize a digit/separator run into a plain decimal string
///
/// Rules: with both `.` and `,` present the last occurrence is the decimal
/// separator and the other marks thousands; a single separator occurring
/// once is decimal, occurring more than once is thousands. Returns `None`
/// when nothing parseable remains.
pub(crate) fn canonical_decimal(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c| c == '.' || c == ',');
    if trimmed.is_empty() {
        return None;
    }

    let dots = trimmed.matches('.').count();
    let commas = trimmed.matches(',').count();
    let decimal_sep = match (dots, commas) {
        (0, 0) => None,
        (_, 0) => (dots == 1).then_some('.'),
        (0, _) => (commas == 1).then_some(','),
        _ => {
            let last_dot = trimmed.rfind('.');
            let last_comma = trimmed.rfind(',');
            if last_dot > last_comma {
                Some('.')
            } else {
                Some(',')
            }
        }
    };

    let mut plain = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        match ch {
            '.' | ',' => {
                if Some(ch) == decimal_sep {
                    plain.push('.');
                }
            }
            digit => plain.push(digit),
        }
    }

    let value = BigDecimal::from_str(&plain).ok()?;
    Some(value.normalized().to_string())
}
