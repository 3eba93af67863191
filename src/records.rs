// 🏢 Company Records - Caller-supplied input and loose identity normalisation
// Entity name is the primary identity signal; registration id and code only corroborate.

use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    #[serde(alias = "Company Name")]
    pub entity_name: String,

    #[serde(default, alias = "Registration number")]
    pub registration_id: Option<String>,

    #[serde(default, alias = "UK SIC 2007 Code")]
    pub assigned_code: Option<String>,

    #[serde(default, alias = "Business Description")]
    pub description: String,
}

impl CompanyRecord {
    pub fn new(entity_name: &str, description: &str) -> Self {
        CompanyRecord {
            entity_name: entity_name.to_string(),
            registration_id: None,
            assigned_code: None,
            description: description.to_string(),
        }
    }

    /// Builder pattern: add registration id
    pub fn with_registration_id(mut self, registration_id: &str) -> Self {
        self.registration_id = Some(registration_id.to_string());
        self
    }

    /// Builder pattern: add currently assigned code
    pub fn with_assigned_code(mut self, code: &str) -> Self {
        self.assigned_code = Some(code.to_string());
        self
    }

    pub fn normalized_name(&self) -> String {
        normalize_entity_name(&self.entity_name)
    }

    pub fn normalized_registration_id(&self) -> Option<String> {
        self.registration_id
            .as_deref()
            .and_then(normalize_registration_id)
    }
}

// ============================================================================
// NORMALISATION
// ============================================================================

/// Trim + uppercase: the join key for corrections
pub fn normalize_entity_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Trim, drop a trailing `.0` float artifact, uppercase. Missing markers → None.
pub fn normalize_registration_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed).trim();

    if trimmed.is_empty()
        || ["nan", "none", "null"]
            .iter()
            .any(|m| trimmed.eq_ignore_ascii_case(m))
    {
        return None;
    }

    Some(trimmed.to_uppercase())
}

/// Compare registration ids ignoring zero-padding differences
pub fn registration_ids_match(a: &str, b: &str) -> bool {
    match (normalize_registration_id(a), normalize_registration_id(b)) {
        (Some(a), Some(b)) => a.trim_start_matches('0') == b.trim_start_matches('0'),
        _ => false,
    }
}

/// Parse a nullable integer code: "", "nan", "62012", "62012.0"
pub fn parse_code(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<i64>().ok().or_else(|| {
        trimmed
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

// ============================================================================
// LOADING
// ============================================================================

/// Load company records from CSV (source-file or snake_case headers)
pub fn load_companies(path: &Path) -> Result<Vec<CompanyRecord>, LoadError> {
    let to_err = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = csv::Reader::from_path(path).map_err(to_err)?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: CompanyRecord = result.map_err(to_err)?;
        records.push(record);
    }

    log::info!("Loaded {} company records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_entity_name() {
        assert_eq!(normalize_entity_name("  Acme Ltd "), "ACME LTD");
    }

    #[test]
    fn test_normalize_registration_id() {
        assert_eq!(normalize_registration_id("12345.0"), Some("12345".to_string()));
        assert_eq!(normalize_registration_id(" sc123456 "), Some("SC123456".to_string()));
        assert_eq!(normalize_registration_id("10.05"), Some("10.05".to_string()));
        assert_eq!(normalize_registration_id("nan"), None);
        assert_eq!(normalize_registration_id("  "), None);
    }

    #[test]
    fn test_registration_ids_match_ignores_padding() {
        assert!(registration_ids_match("00012345", "12345.0"));
        assert!(!registration_ids_match("00012345", "12346"));
        assert!(!registration_ids_match("", ""));
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code("62012"), Some(62012));
        assert_eq!(parse_code("62012.0"), Some(62012));
        assert_eq!(parse_code(" "), None);
        assert_eq!(parse_code("nan"), None);
        assert_eq!(parse_code("62012.5"), None);
        assert_eq!(parse_code("A01"), None);
    }

    #[test]
    fn test_load_companies_source_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("companies.csv");
        std::fs::write(
            &path,
            "Company Name,Registration number,UK SIC 2007 Code,Business Description,Sales (USD)\n\
             Acme Ltd,12345.0,62012,Software development,100\n\
             Beta PLC,,,Restaurants,\n",
        )
        .unwrap();

        let records = load_companies(&path).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entity_name, "Acme Ltd");
        assert_eq!(records[0].normalized_registration_id(), Some("12345".to_string()));
        assert_eq!(records[0].assigned_code.as_deref(), Some("62012"));
        assert_eq!(records[1].registration_id, None);
        assert_eq!(records[1].assigned_code, None);
        assert_eq!(records[1].description, "Restaurants");
    }

    #[test]
    fn test_builder() {
        let record = CompanyRecord::new("Acme Ltd", "Software")
            .with_registration_id("00012345")
            .with_assigned_code("62012");

        assert_eq!(record.normalized_name(), "ACME LTD");
        assert_eq!(record.assigned_code.as_deref(), Some("62012"));
    }
}
