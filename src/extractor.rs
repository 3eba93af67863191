// 🧹 Activity Extractor - Strip corporate boilerplate, surface activity phrases
// Heuristic and lossy on purpose: structure words ("plc", "subsidiaries") otherwise
// dominate string similarity against catalog descriptions.

use lazy_static::lazy_static;
use regex::Regex;

/// Corporate suffixes and structural filler removed before pattern search
pub const NOISE_WORDS: &[&str] = &[
    "plc", "ltd", "limited", "group", "holdings", "company", "corporation", "corp", "inc",
    "the", "and", "through", "its", "subsidiaries", "engaged", "in", "business", "of",
    "activities", "services", "operations",
];

/// Activity phrase patterns, searched in this order. Longer phrases come first
/// inside each alternation so "software development" wins over "software".
pub const ACTIVITY_PATTERNS: &[&str] = &[
    r"\b(?:food service|catering|restaurants?|dining)\b",
    r"\b(?:retail|supermarkets?|grocery|stores?|shops?)\b",
    r"\b(?:banking|bank|financial|lending|deposits?)\b",
    r"\b(?:software development|software|technology|computing)\b",
    r"\b(?:manufacturing|production|factory)\b",
];

const FALLBACK_WORDS: usize = 3;

lazy_static! {
    static ref NOISE_RE: Regex = Regex::new(&format!(r"\b(?:{})\b", NOISE_WORDS.join("|")))
        .expect("noise word pattern is valid");
    static ref PATTERN_RES: Vec<Regex> = ACTIVITY_PATTERNS
        .iter()
        .map(|p| Regex::new(p).expect("activity pattern is valid"))
        .collect();
}

// ============================================================================
// ACTIVITY EXTRACTOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct ActivityExtractor {
    noise: Regex,
    patterns: Vec<Regex>,
}

impl ActivityExtractor {
    pub fn new() -> Self {
        ActivityExtractor {
            noise: NOISE_RE.clone(),
            patterns: PATTERN_RES.clone(),
        }
    }

    /// Extract a short activity string from a raw business description.
    ///
    /// Returns pattern matches in pattern-list order; if none match, the first
    /// three remaining words longer than three characters. Empty only for empty input.
    pub fn extract(&self, raw_description: &str) -> String {
        let lowered = raw_description.to_lowercase();
        if lowered.trim().is_empty() {
            return String::new();
        }

        let cleaned = self.noise.replace_all(&lowered, " ");

        let activities: Vec<&str> = self
            .patterns
            .iter()
            .flat_map(|re| re.find_iter(&cleaned).map(|m| m.as_str()))
            .collect();

        if !activities.is_empty() {
            return activities.join(" ");
        }

        let words: Vec<&str> = cleaned
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let meaningful: Vec<&str> = words
            .iter()
            .copied()
            .filter(|w| w.chars().count() > 3)
            .take(FALLBACK_WORDS)
            .collect();

        if !meaningful.is_empty() {
            meaningful.join(" ")
        } else if !words.is_empty() {
            words.join(" ")
        } else {
            // Nothing but noise words
            lowered.split_whitespace().collect::<Vec<_>>().join(" ")
        }
    }
}

impl Default for ActivityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract with the default noise list and patterns
pub fn extract(raw_description: &str) -> String {
    ActivityExtractor::new().extract(raw_description)
}
