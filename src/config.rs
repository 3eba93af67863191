// ⚙️ Configuration - Thresholds, boosts and store settings as plain values
// Nothing here reads the environment; callers construct or load these explicitly.

use crate::atomic::LockOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// BOOST RULES
// ============================================================================

/// Domain boost: fires when the extracted activity contains one of
/// `activity_terms` and the catalog description contains one of `candidate_terms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostRule {
    pub label: String,
    pub activity_terms: Vec<String>,
    pub candidate_terms: Vec<String>,
}

impl BoostRule {
    pub fn new(label: &str, activity_terms: &[&str], candidate_terms: &[&str]) -> Self {
        BoostRule {
            label: label.to_string(),
            activity_terms: activity_terms.iter().map(|t| t.to_string()).collect(),
            candidate_terms: candidate_terms.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Both sides are expected lower-cased.
    pub fn applies(&self, activity: &str, candidate_description: &str) -> bool {
        self.activity_terms.iter().any(|t| activity.contains(t.as_str()))
            && self
                .candidate_terms
                .iter()
                .any(|t| candidate_description.contains(t.as_str()))
    }
}

fn default_boosts() -> Vec<BoostRule> {
    vec![
        BoostRule::new(
            "hospitality",
            &["catering", "restaurant", "food"],
            &["catering", "restaurant", "food"],
        ),
        BoostRule::new(
            "retail",
            &["retail", "supermarket", "grocery", "store"],
            &["retail", "store", "shop"],
        ),
        BoostRule::new("financial", &["bank", "financial"], &["bank", "financial"]),
    ]
}

// ============================================================================
// MATCHER CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Old accuracy counts as accurate at or above this score (default: 70)
    pub old_accuracy_threshold: f64,

    /// New accuracy counts as accurate at or above this score (default: 90)
    pub new_accuracy_threshold: f64,

    /// Multiplier applied when the assigned code is absent from the catalog (default: 0.6)
    pub missing_code_penalty: f64,

    /// Points added per fired boost, capped at 100 (default: 15)
    pub boost_amount: f64,

    /// Raw-score pool is `top_n * candidate_pool_factor` before boosting (default: 2)
    pub candidate_pool_factor: usize,

    pub boosts: Vec<BoostRule>,
}

impl MatcherConfig {
    pub fn old_is_accurate(&self, score: f64) -> bool {
        score >= self.old_accuracy_threshold
    }

    pub fn new_is_accurate(&self, score: f64) -> bool {
        score >= self.new_accuracy_threshold
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            old_accuracy_threshold: 70.0,
            new_accuracy_threshold: 90.0,
            missing_code_penalty: 0.6,
            boost_amount: 15.0,
            candidate_pool_factor: 2,
            boosts: default_boosts(),
        }
    }
}

// ============================================================================
// STORE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub log_path: PathBuf,
    pub lock_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// 0 disables stale-lock recovery
    pub stale_lock_after_secs: u64,
}

impl StoreConfig {
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(self.lock_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            stale_after: match self.stale_lock_after_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            log_path: PathBuf::from("data/updated_sic_predictions.csv"),
            lock_timeout_ms: 10_000,
            poll_interval_ms: 50,
            stale_lock_after_secs: 300,
        }
    }
}

// ============================================================================
// CLASSIFIER CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub catalog_path: PathBuf,

    #[serde(default)]
    pub matcher: MatcherConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl ClassifierConfig {
    pub fn new(catalog_path: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        ClassifierConfig {
            catalog_path: catalog_path.into(),
            matcher: MatcherConfig::default(),
            store: StoreConfig {
                log_path: log_path.into(),
                ..StoreConfig::default()
            },
        }
    }

    /// Load from a JSON file; omitted sections fall back to defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: ClassifierConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        Ok(config)
    }
}
