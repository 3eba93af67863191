// 📊 Dual Accuracy Calculator - Score the assigned code and the best suggestion
// Old accuracy: assigned code's description vs the raw text (max of four metrics),
// penalised when the code is not in the catalog. New accuracy: top matcher score.
// Each record is scored independently; no state crosses records.

use crate::catalog::{normalize_code, Catalog};
use crate::config::MatcherConfig;
use crate::matcher::{round1, FuzzyMatcher, MatchCandidate};
use crate::records::CompanyRecord;
use crate::similarity::best_of_four;
use serde::{Deserialize, Serialize};

// ============================================================================
// RESULTS
// ============================================================================

/// How well the currently-assigned code fits the description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyResult {
    pub assigned_code: Option<String>,

    /// None when the code is missing or not in the catalog
    pub assigned_description: Option<String>,

    pub old_accuracy: f64,
    pub is_accurate: bool,

    pub best_candidate_code: Option<String>,
    pub best_candidate_description: Option<String>,

    /// Human-readable explanation of how the score was reached
    pub reasoning: String,
}

/// The matcher's own suggestion, independent of the assigned code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_code: Option<String>,
    pub predicted_description: Option<String>,
    pub new_accuracy: f64,
    pub is_accurate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualAccuracy {
    pub old: AccuracyResult,
    pub new: PredictionResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: CompanyRecord,
    pub accuracy: DualAccuracy,
}

// ============================================================================
// ACCURACY CALCULATOR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AccuracyCalculator {
    matcher: FuzzyMatcher,
}

impl AccuracyCalculator {
    pub fn new(config: MatcherConfig) -> Self {
        AccuracyCalculator {
            matcher: FuzzyMatcher::new(config),
        }
    }

    pub fn matcher(&self) -> &FuzzyMatcher {
        &self.matcher
    }

    pub fn config(&self) -> &MatcherConfig {
        self.matcher.config()
    }

    /// Score the assigned code against the description.
    ///
    /// Missing description or code is not an error: the result carries a zero
    /// score and says why.
    pub fn old_accuracy(
        &self,
        description: &str,
        assigned_code: Option<&str>,
        catalog: &Catalog,
    ) -> AccuracyResult {
        let config = self.config();
        let code = assigned_code
            .map(normalize_code)
            .filter(|c| !c.is_empty());

        let best = self.matcher.find_best_matches(description, catalog, 1);
        let best = best.first();

        let mut result = AccuracyResult {
            assigned_code: code.clone(),
            assigned_description: None,
            old_accuracy: 0.0,
            is_accurate: false,
            best_candidate_code: best.map(|b| b.code.clone()),
            best_candidate_description: best.map(|b| b.description.clone()),
            reasoning: String::new(),
        };

        if description.trim().is_empty() {
            result.reasoning = "Missing business description".to_string();
            return result;
        }

        let code = match code {
            Some(code) => code,
            None => {
                result.reasoning = "No code assigned".to_string();
                return result;
            }
        };

        match catalog.description(&code) {
            Some(catalog_description) => {
                let breakdown = best_of_four(description, catalog_description);
                let score = round1(breakdown.best());

                result.assigned_description = Some(catalog_description.to_string());
                result.old_accuracy = score;
                result.reasoning = format!(
                    "Code {} found in catalog. Best similarity score: {:.1}%. Breakdown: ratio={:.1}, partial={:.1}, token_sort={:.1}, token_set={:.1}",
                    code, score, breakdown.ratio, breakdown.partial, breakdown.token_sort, breakdown.token_set
                );
            }
            None => match best {
                Some(candidate) => {
                    let score = round1((candidate.score * config.missing_code_penalty).clamp(0.0, 100.0));
                    result.old_accuracy = score;
                    result.reasoning = format!(
                        "Code {} not found in catalog. Best fuzzy match: {} ({}) with {:.1}% base similarity, penalized to {:.1}%",
                        code, candidate.code, candidate.description, candidate.score, score
                    );
                }
                None => {
                    result.reasoning =
                        format!("Code {} not found in catalog and no fuzzy matches available", code);
                }
            },
        }

        result.is_accurate = config.old_is_accurate(result.old_accuracy);
        result
    }

    /// Top candidate's boosted score; accurate at the stricter new-accuracy bar
    pub fn new_accuracy(&self, description: &str, catalog: &Catalog) -> PredictionResult {
        let best = self.matcher.find_best_matches(description, catalog, 1);
        prediction_from(best.first(), self.config())
    }

    pub fn dual_accuracy(
        &self,
        description: &str,
        assigned_code: Option<&str>,
        catalog: &Catalog,
    ) -> DualAccuracy {
        DualAccuracy {
            old: self.old_accuracy(description, assigned_code, catalog),
            new: self.new_accuracy(description, catalog),
        }
    }

    /// N independent dual-accuracy computations
    pub fn score_batch(&self, records: &[CompanyRecord], catalog: &Catalog) -> Vec<ScoredRecord> {
        log::info!("Calculating dual accuracy for {} records", records.len());

        records
            .iter()
            .map(|record| ScoredRecord {
                record: record.clone(),
                accuracy: self.dual_accuracy(
                    &record.description,
                    record.assigned_code.as_deref(),
                    catalog,
                ),
            })
            .collect()
    }
}

fn prediction_from(best: Option<&MatchCandidate>, config: &MatcherConfig) -> PredictionResult {
    match best {
        Some(candidate) => PredictionResult {
            predicted_code: Some(candidate.code.clone()),
            predicted_description: Some(candidate.description.clone()),
            new_accuracy: candidate.score,
            is_accurate: config.new_is_accurate(candidate.score),
        },
        None => PredictionResult {
            predicted_code: None,
            predicted_description: None,
            new_accuracy: 0.0,
            is_accurate: false,
        },
    }
}

/// Old accuracy with the default configuration
pub fn old_accuracy(description: &str, assigned_code: Option<&str>, catalog: &Catalog) -> AccuracyResult {
    AccuracyCalculator::default().old_accuracy(description, assigned_code, catalog)
}

/// New accuracy with the default configuration
pub fn new_accuracy(description: &str, catalog: &Catalog) -> PredictionResult {
    AccuracyCalculator::default().new_accuracy(description, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::matcher::find_best_matches;

    fn catalog(rows: &[(&str, &str)]) -> Catalog {
        Catalog::from_entries(rows.iter().map(|(code, description)| CatalogEntry {
            code: code.to_string(),
            description: description.to_string(),
        }))
    }

    fn sample_catalog() -> Catalog {
        catalog(&[
            ("62012", "Business and domestic software development"),
            ("56101", "Licensed restaurants"),
            ("47110", "Retail sale in non-specialised stores with food predominating"),
            ("64191", "Banks"),
        ])
    }

    const ACME: &str =
        "Acme Ltd, through its subsidiaries, engaged in software development activities";

    #[test]
    fn test_new_accuracy_software_scenario() {
        let catalog = catalog(&[("62012", "Business and domestic software development")]);
        let result = new_accuracy(ACME, &catalog);

        assert_eq!(result.predicted_code.as_deref(), Some("62012"));
        assert!(result.new_accuracy >= 80.0);
        assert_eq!(result.is_accurate, result.new_accuracy >= 90.0);
    }

    #[test]
    fn test_old_accuracy_resolved_code_uses_best_metric() {
        let catalog = sample_catalog();
        let result = old_accuracy(ACME, Some("62012"), &catalog);

        let breakdown = best_of_four(ACME, "Business and domestic software development");
        assert_eq!(result.old_accuracy, round1(breakdown.best()));
        assert_eq!(
            result.assigned_description.as_deref(),
            Some("Business and domestic software development")
        );
        assert!(result.reasoning.contains("found in catalog"));
        assert_eq!(result.is_accurate, result.old_accuracy >= 70.0);
    }

    #[test]
    fn test_old_accuracy_tolerates_float_code() {
        let catalog = sample_catalog();
        let result = old_accuracy("Licensed restaurants", Some("56101.0"), &catalog);

        assert_eq!(result.assigned_code.as_deref(), Some("56101"));
        assert_eq!(result.old_accuracy, 100.0);
        assert!(result.is_accurate);
    }

    #[test]
    fn test_missing_code_penalty() {
        let catalog = sample_catalog();
        let description = "Family owned restaurants and catering";

        let top = &find_best_matches(description, &catalog, 1)[0];
        let result = old_accuracy(description, Some("99999"), &catalog);

        assert!((result.old_accuracy - 0.6 * top.score).abs() <= 0.051);
        assert!(result.assigned_description.is_none());
        assert_eq!(result.best_candidate_code.as_deref(), Some(top.code.as_str()));
        assert!(result.reasoning.contains("not found"));
    }

    #[test]
    fn test_missing_code_with_empty_catalog() {
        let result = old_accuracy(ACME, Some("99999"), &Catalog::default());

        assert_eq!(result.old_accuracy, 0.0);
        assert!(!result.is_accurate);
        assert!(result.reasoning.contains("no fuzzy matches"));
    }

    #[test]
    fn test_missing_description() {
        let result = old_accuracy("  ", Some("62012"), &sample_catalog());

        assert_eq!(result.old_accuracy, 0.0);
        assert!(!result.is_accurate);
        assert_eq!(result.reasoning, "Missing business description");

        let prediction = new_accuracy("", &sample_catalog());
        assert_eq!(prediction.new_accuracy, 0.0);
        assert!(prediction.predicted_code.is_none());
        assert!(!prediction.is_accurate);
    }

    #[test]
    fn test_missing_assigned_code() {
        let result = old_accuracy(ACME, None, &sample_catalog());

        assert_eq!(result.old_accuracy, 0.0);
        assert_eq!(result.reasoning, "No code assigned");
        assert_eq!(result.best_candidate_code.as_deref(), Some("62012"));

        let blank = old_accuracy(ACME, Some(" "), &sample_catalog());
        assert_eq!(blank.reasoning, "No code assigned");
    }

    #[test]
    fn test_accuracy_bounds() {
        let catalog = sample_catalog();
        let descriptions = [ACME, "Banks", "zzz", "Retail stores selling food", "restaurants"];

        for description in descriptions {
            for code in [Some("62012"), Some("64191"), Some("00000"), None] {
                let dual = AccuracyCalculator::default().dual_accuracy(description, code, &catalog);
                assert!((0.0..=100.0).contains(&dual.old.old_accuracy));
                assert!((0.0..=100.0).contains(&dual.new.new_accuracy));
            }
        }
    }

    #[test]
    fn test_custom_penalty() {
        let config = MatcherConfig {
            missing_code_penalty: 0.5,
            ..MatcherConfig::default()
        };
        let calculator = AccuracyCalculator::new(config);
        let catalog = sample_catalog();

        let top = calculator.matcher().find_best_matches(ACME, &catalog, 1)[0].score;
        let result = calculator.old_accuracy(ACME, Some("11111"), &catalog);

        assert!((result.old_accuracy - 0.5 * top).abs() <= 0.051);
    }

    #[test]
    fn test_score_batch_is_per_record() {
        let catalog = sample_catalog();
        let records = vec![
            CompanyRecord::new("Acme Ltd", ACME).with_assigned_code("62012"),
            CompanyRecord::new("Empty Co", ""),
        ];

        let scored = AccuracyCalculator::default().score_batch(&records, &catalog);

        assert_eq!(scored.len(), 2);
        assert_eq!(
            scored[0].accuracy,
            AccuracyCalculator::default().dual_accuracy(ACME, Some("62012"), &catalog)
        );
        assert_eq!(scored[1].accuracy.old.old_accuracy, 0.0);
        assert_eq!(scored[1].accuracy.new.new_accuracy, 0.0);
    }
}
