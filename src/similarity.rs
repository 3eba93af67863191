// 📏 String Similarity - Token-aware fuzzy ratios on a 0-100 scale
// All metrics normalise first (lower-case, punctuation → space, collapsed whitespace).
// Identical inputs score 100; inputs sharing nothing score 0.

use std::collections::BTreeSet;

const UNBASE_SCALE: f64 = 0.95;

/// Lower-case, replace non-alphanumerics with spaces, collapse whitespace
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// PUBLIC METRICS
// ============================================================================

/// Whole-string edit similarity
pub fn ratio(a: &str, b: &str) -> f64 {
    raw_ratio(&normalize(a), &normalize(b))
}

/// Best alignment of the shorter string against same-length windows of the longer
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    raw_partial_ratio(&normalize(a), &normalize(b))
}

/// Ratio after sorting tokens, so word order does not matter
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    raw_ratio(&sorted_tokens(&normalize(a)), &sorted_tokens(&normalize(b)))
}

/// Ratio over shared/unshared token sets; 100 when one token set contains the other
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    raw_token_set_ratio(&normalize(a), &normalize(b))
}

/// Weighted blend that picks the most appropriate metric by length disparity
pub fn weighted_ratio(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (len_a, len_b) = (a.chars().count() as f64, b.chars().count() as f64);
    let len_ratio = len_a.max(len_b) / len_a.min(len_b);

    let base = raw_ratio(&a, &b);

    if len_ratio < 1.5 {
        let token_score = raw_ratio(&sorted_tokens(&a), &sorted_tokens(&b))
            .max(raw_token_set_ratio(&a, &b));
        return base.max(token_score * UNBASE_SCALE);
    }

    let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };

    let partial = raw_partial_ratio(&a, &b) * partial_scale;
    let partial_token =
        raw_partial_ratio(&sorted_tokens(&a), &sorted_tokens(&b)) * UNBASE_SCALE * partial_scale;

    base.max(partial).max(partial_token)
}

/// Max of ratio, partial, token-sort and token-set
pub fn best_of_four(a: &str, b: &str) -> ScoreBreakdown {
    let a = normalize(a);
    let b = normalize(b);
    ScoreBreakdown {
        ratio: raw_ratio(&a, &b),
        partial: raw_partial_ratio(&a, &b),
        token_sort: raw_ratio(&sorted_tokens(&a), &sorted_tokens(&b)),
        token_set: raw_token_set_ratio(&a, &b),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub ratio: f64,
    pub partial: f64,
    pub token_sort: f64,
    pub token_set: f64,
}

impl ScoreBreakdown {
    pub fn best(&self) -> f64 {
        self.ratio
            .max(self.partial)
            .max(self.token_sort)
            .max(self.token_set)
    }
}

// ============================================================================
// INTERNALS (inputs already normalised)
// ============================================================================

fn raw_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}

fn raw_partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let (shorter, longer) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if shorter.is_empty() {
        return 0.0;
    }
    if shorter.len() == longer.len() {
        return raw_ratio(a, b);
    }

    let needle: String = shorter.iter().collect();
    let mut best: f64 = 0.0;
    for window in longer.windows(shorter.len()) {
        let candidate: String = window.iter().collect();
        best = best.max(raw_ratio(&needle, &candidate));
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn raw_token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    if !intersection.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let sect = intersection.join(" ");
    let combined_a = join_nonempty(&sect, &only_a.join(" "));
    let combined_b = join_nonempty(&sect, &only_b.join(" "));

    raw_ratio(&sect, &combined_a)
        .max(raw_ratio(&sect, &combined_b))
        .max(raw_ratio(&combined_a, &combined_b))
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join_nonempty(left: &str, right: &str) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => right.to_string(),
        (_, true) => left.to_string(),
        _ => format!("{} {}", left, right),
    }
}
