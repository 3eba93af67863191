// SIC Classifier - Core Library
// Catalog matching, dual accuracy scoring and the versioned correction store

pub mod error;
pub mod config;
pub mod catalog;        // Catalog Loader - code/description tables
pub mod extractor;      // Activity Extractor
pub mod similarity;     // Fuzzy string metrics
pub mod matcher;        // Fuzzy Matcher - ranked candidates
pub mod accuracy;       // Dual Accuracy Calculator
pub mod atomic;         // Atomic Writer - temp+rename, advisory lock
pub mod records;        // Company records + identity normalisation
pub mod store;          // Correction Store - append-only event log
pub mod reconciliation; // Merge corrections onto records
pub mod classifier;     // Library surface

// Re-export commonly used types
pub use error::{IoError, LoadError, StoreError};
pub use config::{BoostRule, ClassifierConfig, MatcherConfig, StoreConfig};
pub use catalog::{Catalog, CatalogEntry};
pub use extractor::ActivityExtractor;
pub use matcher::{find_best_matches, FuzzyMatcher, MatchCandidate};
pub use accuracy::{
    AccuracyCalculator, AccuracyResult, DualAccuracy, PredictionResult, ScoredRecord,
};
pub use atomic::{read_safe, write_atomic, write_with_lock, FileLock, LockOptions};
pub use records::{load_companies, CompanyRecord};
pub use store::{CorrectionEvent, CorrectionStore};
pub use reconciliation::{
    AccuracyValue, AppliedCorrection, MatchBasis, ReconciledRecord, ReconciliationReport,
};
pub use classifier::{Classifier, CorrectionRequest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
