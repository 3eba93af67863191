// 🎯 Fuzzy Matcher - Rank catalog codes for a business description
// Pipeline: extract activity → weighted ratio against every description → domain boosts.

use crate::catalog::{compare_codes, Catalog};
use crate::config::MatcherConfig;
use crate::extractor::ActivityExtractor;
use crate::similarity::weighted_ratio;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// MATCH CANDIDATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub code: String,
    pub description: String,

    /// Boosted score (0-100, one decimal)
    pub score: f64,

    /// Score before boosts
    pub base_score: f64,

    /// e.g. "+15 hospitality match", or "none"
    pub boost_applied: String,

    pub extracted_activity: String,
}

// ============================================================================
// FUZZY MATCHER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct FuzzyMatcher {
    config: MatcherConfig,
    extractor: ActivityExtractor,
}

impl FuzzyMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        FuzzyMatcher {
            config,
            extractor: ActivityExtractor::new(),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn extractor(&self) -> &ActivityExtractor {
        &self.extractor
    }

    /// Top `top_n` candidates by boosted score; ties go to the lowest code.
    /// Empty description or empty catalog yields an empty list.
    pub fn find_best_matches(
        &self,
        description: &str,
        catalog: &Catalog,
        top_n: usize,
    ) -> Vec<MatchCandidate> {
        if description.trim().is_empty() || catalog.is_empty() || top_n == 0 {
            return Vec::new();
        }

        let activity = self.extractor.extract(description);
        log::debug!("Extracted activity {:?} from {:?}", activity, description);

        // Raw scoring over every distinct description
        let mut scored: Vec<(f64, &str, &str)> = catalog
            .match_targets()
            .map(|entry| {
                (
                    round1(weighted_ratio(&activity, &entry.description)),
                    entry.code.as_str(),
                    entry.description.as_str(),
                )
            })
            .collect();

        scored.sort_by(|a, b| by_score_then_code(a.0, a.1, b.0, b.1));
        scored.truncate(top_n.saturating_mul(self.config.candidate_pool_factor.max(1)));

        let mut candidates: Vec<MatchCandidate> = scored
            .into_iter()
            .map(|(base_score, code, desc)| self.boost(&activity, base_score, code, desc))
            .collect();

        candidates.sort_by(|a, b| by_score_then_code(a.score, &a.code, b.score, &b.code));
        candidates.truncate(top_n);
        candidates
    }

    fn boost(&self, activity: &str, base_score: f64, code: &str, description: &str) -> MatchCandidate {
        let desc_lower = description.to_lowercase();
        let mut score = base_score;
        let mut reasons = Vec::new();

        for rule in &self.config.boosts {
            if rule.applies(activity, &desc_lower) {
                score = (score + self.config.boost_amount).min(100.0);
                reasons.push(format!("+{} {} match", self.config.boost_amount, rule.label));
            }
        }

        MatchCandidate {
            code: code.to_string(),
            description: description.to_string(),
            score: round1(score.clamp(0.0, 100.0)),
            base_score,
            boost_applied: if reasons.is_empty() {
                "none".to_string()
            } else {
                reasons.join(", ")
            },
            extracted_activity: activity.to_string(),
        }
    }
}

/// Rank with the default configuration
pub fn find_best_matches(description: &str, catalog: &Catalog, top_n: usize) -> Vec<MatchCandidate> {
    FuzzyMatcher::default().find_best_matches(description, catalog, top_n)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn by_score_then_code(score_a: f64, code_a: &str, score_b: f64, code_b: &str) -> Ordering {
    score_b
        .partial_cmp(&score_a)
        .unwrap_or(Ordering::Equal)
        .then_with(|| compare_codes(code_a, code_b))
}
