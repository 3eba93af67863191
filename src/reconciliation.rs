// ⚖️ Reconciliation - Merge analyst corrections back onto company records
// The join is by normalised entity name. Registration id and previous code
// only grade how well the match is corroborated; they never create a match.
//
// A record without a correction must never look reviewed, so its accuracy is
// Unset here rather than zero or an automatic score.

use crate::catalog::normalize_code;
use crate::config::MatcherConfig;
use crate::records::{parse_code, registration_ids_match, CompanyRecord};
use crate::store::CorrectionEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// ACCURACY VALUE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AccuracyValue {
    /// No score applies (e.g. new accuracy of a record nobody reviewed)
    Unset,

    /// Computed by the matcher, never seen by an analyst
    Automatic(f64),

    /// Stored with an analyst correction
    Reviewed(f64),
}

impl AccuracyValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            AccuracyValue::Unset => None,
            AccuracyValue::Automatic(v) | AccuracyValue::Reviewed(v) => Some(*v),
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, AccuracyValue::Unset)
    }

    pub fn is_reviewed(&self) -> bool {
        matches!(self, AccuracyValue::Reviewed(_))
    }
}

// ============================================================================
// MATCH RESULT
// ============================================================================

/// How strongly the secondary identifiers agree with the name join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchBasis {
    NameOnly,
    NameAndRegistration,
    NameAndPreviousCode,
    AllFields,
}

impl MatchBasis {
    fn from_flags(registration: bool, previous_code: bool) -> Self {
        match (registration, previous_code) {
            (true, true) => MatchBasis::AllFields,
            (true, false) => MatchBasis::NameAndRegistration,
            (false, true) => MatchBasis::NameAndPreviousCode,
            (false, false) => MatchBasis::NameOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub identity_key: String,
    pub new_code: Option<i64>,
    pub timestamp: String,
    pub author: String,
    pub basis: MatchBasis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub record: CompanyRecord,

    /// Corrected code if one was recorded, else the record's own code
    pub assigned_code: Option<String>,

    pub old_accuracy: AccuracyValue,
    pub new_accuracy: AccuracyValue,

    pub correction: Option<AppliedCorrection>,
}

impl ReconciledRecord {
    pub fn is_corrected(&self) -> bool {
        self.correction.is_some()
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Overlay the latest correction per entity onto `records`.
///
/// `latest` is expected to hold at most one event per entity (see
/// `store::latest_per_entity`); if it holds several, the last one wins.
pub fn reconcile(records: &[CompanyRecord], latest: &[CorrectionEvent]) -> Vec<ReconciledRecord> {
    let by_name: HashMap<String, &CorrectionEvent> = latest
        .iter()
        .filter_map(|event| {
            let name = event.normalized_name();
            (!name.is_empty()).then_some((name, event))
        })
        .collect();

    let reconciled: Vec<ReconciledRecord> = records
        .iter()
        .map(|record| {
            let name = record.normalized_name();
            match by_name.get(&name).filter(|_| !name.is_empty()) {
                Some(event) => apply(record, event),
                None => ReconciledRecord {
                    record: record.clone(),
                    assigned_code: own_code(record),
                    old_accuracy: AccuracyValue::Unset,
                    new_accuracy: AccuracyValue::Unset,
                    correction: None,
                },
            }
        })
        .collect();

    log::info!(
        "Reconciled {} records against {} corrections ({} matched)",
        records.len(),
        latest.len(),
        reconciled.iter().filter(|r| r.is_corrected()).count()
    );

    reconciled
}

fn apply(record: &CompanyRecord, event: &CorrectionEvent) -> ReconciledRecord {
    let registration = record
        .registration_id
        .as_deref()
        .map_or(false, |id| registration_ids_match(id, &event.identity_key));

    let previous_code = match (record.assigned_code.as_deref().and_then(parse_code), event.previous_code) {
        (Some(ours), Some(theirs)) => ours == theirs,
        _ => false,
    };

    let basis = MatchBasis::from_flags(registration, previous_code);
    log::debug!("Correction for {} matched on {:?}", record.entity_name, basis);

    ReconciledRecord {
        record: record.clone(),
        assigned_code: event
            .new_code
            .map(|code| code.to_string())
            .or_else(|| own_code(record)),
        old_accuracy: AccuracyValue::Reviewed(event.previous_accuracy),
        new_accuracy: AccuracyValue::Reviewed(event.new_accuracy),
        correction: Some(AppliedCorrection {
            identity_key: event.identity_key.clone(),
            new_code: event.new_code,
            timestamp: event.timestamp.clone(),
            author: event.author.clone(),
            basis,
        }),
    }
}

fn own_code(record: &CompanyRecord) -> Option<String> {
    record
        .assigned_code
        .as_deref()
        .map(normalize_code)
        .filter(|c| !c.is_empty())
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub total: usize,
    pub corrected: usize,
    pub uncorrected: usize,

    /// Records whose old accuracy (of any kind) meets the old threshold
    pub old_accurate: usize,

    /// Corrected records whose reviewed new accuracy meets the new threshold
    pub reviewed_accurate: usize,

    /// Mean over records that have an old accuracy; 0 when none do
    pub mean_old_accuracy: f64,

    /// Mean reviewed new accuracy over corrected records; 0 when none
    pub mean_reviewed_accuracy: f64,

    pub generated_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn from_records(records: &[ReconciledRecord], config: &MatcherConfig) -> Self {
        let corrected = records.iter().filter(|r| r.is_corrected()).count();

        let old_scores: Vec<f64> = records.iter().filter_map(|r| r.old_accuracy.value()).collect();
        let reviewed_scores: Vec<f64> = records
            .iter()
            .filter(|r| r.new_accuracy.is_reviewed())
            .filter_map(|r| r.new_accuracy.value())
            .collect();

        ReconciliationReport {
            total: records.len(),
            corrected,
            uncorrected: records.len() - corrected,
            old_accurate: old_scores.iter().filter(|s| config.old_is_accurate(**s)).count(),
            reviewed_accurate: reviewed_scores
                .iter()
                .filter(|s| config.new_is_accurate(**s))
                .count(),
            mean_old_accuracy: mean(&old_scores),
            mean_reviewed_accuracy: mean(&reviewed_scores),
            generated_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} records: {} corrected, {} uncorrected; {} accurate on old code (mean {:.1}%), {} reviewed at or above threshold (mean {:.1}%)",
            self.total,
            self.corrected,
            self.uncorrected,
            self.old_accurate,
            self.mean_old_accuracy,
            self.reviewed_accurate,
            self.mean_reviewed_accuracy
        )
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
