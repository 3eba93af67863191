// 🧭 Classifier - Library surface over catalog, matcher and correction store
// Owns the catalog as a plain value; there is no process-wide matcher instance.

use crate::accuracy::{AccuracyCalculator, AccuracyResult, ScoredRecord};
use crate::catalog::{normalize_code, Catalog};
use crate::config::{ClassifierConfig, MatcherConfig};
use crate::error::StoreError;
use crate::matcher::MatchCandidate;
use crate::reconciliation::{AccuracyValue, ReconciledRecord, ReconciliationReport};
use crate::records::{parse_code, CompanyRecord};
use crate::store::{CorrectionEvent, CorrectionStore};
use anyhow::{Context, Result};

// ============================================================================
// CORRECTION REQUEST
// ============================================================================

/// An analyst's decision to move `record` to `new_code`
#[derive(Debug, Clone)]
pub struct CorrectionRequest {
    pub record: CompanyRecord,
    pub new_code: String,

    /// Confidence of the suggestion being accepted; becomes the stored new accuracy
    pub confidence: Option<f64>,

    pub author: String,
}

impl CorrectionRequest {
    pub fn new(record: CompanyRecord, new_code: &str) -> Self {
        CorrectionRequest {
            record,
            new_code: new_code.to_string(),
            confidence: None,
            author: "system".to_string(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct Classifier {
    catalog: Catalog,
    calculator: AccuracyCalculator,
    store: CorrectionStore,
}

impl Classifier {
    pub fn new(catalog: Catalog, config: MatcherConfig, store: CorrectionStore) -> Self {
        Classifier {
            catalog,
            calculator: AccuracyCalculator::new(config),
            store,
        }
    }

    /// Load the catalog and open (or create) the correction log
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let catalog = Catalog::load(&config.catalog_path)
            .with_context(|| format!("Failed to load catalog: {:?}", config.catalog_path))?;

        let store = CorrectionStore::open(&config.store.log_path, config.store.lock_options())
            .with_context(|| format!("Failed to open correction log: {:?}", config.store.log_path))?;

        Ok(Classifier::new(catalog, config.matcher.clone(), store))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &CorrectionStore {
        &self.store
    }

    pub fn config(&self) -> &MatcherConfig {
        self.calculator.config()
    }

    /// Ranked candidate codes for a description
    pub fn predict(&self, description: &str, top_n: usize) -> Vec<MatchCandidate> {
        self.calculator
            .matcher()
            .find_best_matches(description, &self.catalog, top_n)
    }

    /// How well an existing code fits a description
    pub fn score_existing(&self, description: &str, code: Option<&str>) -> AccuracyResult {
        self.calculator.old_accuracy(description, code, &self.catalog)
    }

    pub fn score_batch(&self, records: &[CompanyRecord]) -> Vec<ScoredRecord> {
        self.calculator.score_batch(records, &self.catalog)
    }

    /// Persist a correction and return the stored event.
    ///
    /// New accuracy is the supplied confidence if any, otherwise the fit of the
    /// new code, never lower than the fit of the code being replaced.
    pub fn submit_correction(&self, request: CorrectionRequest) -> Result<CorrectionEvent, StoreError> {
        let record = &request.record;
        let description = record.description.as_str();

        let previous_accuracy = self
            .score_existing(description, record.assigned_code.as_deref())
            .old_accuracy;

        let new_code = normalize_code(&request.new_code);
        let new_accuracy = match request.confidence {
            Some(confidence) => confidence.clamp(0.0, 100.0),
            None => {
                let fit = self.score_existing(description, Some(&new_code)).old_accuracy;
                fit.max(previous_accuracy)
            }
        };

        let parsed = parse_code(&new_code);
        if parsed.is_none() && !new_code.is_empty() {
            log::warn!(
                "Code {:?} for {} is not numeric; the existing code will be kept",
                new_code,
                record.entity_name
            );
        }

        let event = CorrectionEvent::for_record(record, &request.author)
            .with_previous_accuracy(previous_accuracy)
            .with_new_code(parsed, new_accuracy);

        self.store.append(event)
    }

    /// Records with corrections applied. Uncorrected records carry their
    /// automatic old accuracy and an unset new accuracy.
    pub fn reconciled_view(&self, records: &[CompanyRecord]) -> Result<Vec<ReconciledRecord>, StoreError> {
        let mut reconciled = self.store.reconcile(records)?;

        for entry in reconciled.iter_mut().filter(|r| !r.is_corrected()) {
            let score = self
                .score_existing(&entry.record.description, entry.record.assigned_code.as_deref())
                .old_accuracy;
            entry.old_accuracy = AccuracyValue::Automatic(score);
        }

        Ok(reconciled)
    }

    pub fn accuracy_stats(&self, records: &[CompanyRecord]) -> Result<ReconciliationReport, StoreError> {
        let reconciled = self.reconciled_view(records)?;
        Ok(ReconciliationReport::from_records(&reconciled, self.config()))
    }

    pub fn history(&self, entity_name: &str) -> Result<Vec<CorrectionEvent>, StoreError> {
        self.store.history(entity_name)
    }
}
