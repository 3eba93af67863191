// 🗂️ Correction Store - Append-only log of analyst code corrections
// Every correction is a new row; nothing is ever rewritten or removed.
// The current value per entity is a projection (latest timestamp wins).
//
// On-disk format is CSV with one column per event field. Logs written with the
// older prediction-log headers (Registration number, Company_Name, New_SIC, ...)
// are still readable.

use crate::atomic::{read_safe, write_atomic, FileLock, LockOptions};
use crate::error::StoreError;
use crate::reconciliation::{self, ReconciledRecord};
use crate::records::{normalize_entity_name, normalize_registration_id, parse_code, CompanyRecord};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const LOG_COLUMNS: [&str; 9] = [
    "identity_key",
    "entity_name",
    "description",
    "previous_code",
    "previous_accuracy",
    "new_code",
    "new_accuracy",
    "timestamp",
    "author",
];

// ============================================================================
// CORRECTION EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEvent {
    /// Normalised registration id, or a generated `TEMP_...` key
    #[serde(default, alias = "Registration number")]
    pub identity_key: String,

    #[serde(default, alias = "Company_Name")]
    pub entity_name: String,

    #[serde(default, alias = "Business_Description")]
    pub description: String,

    #[serde(default, alias = "Current_SIC", deserialize_with = "lenient_code")]
    pub previous_code: Option<i64>,

    #[serde(default, alias = "Old_Accuracy", deserialize_with = "lenient_score")]
    pub previous_accuracy: f64,

    #[serde(default, alias = "New_SIC", deserialize_with = "lenient_code")]
    pub new_code: Option<i64>,

    #[serde(default, alias = "New_Accuracy", deserialize_with = "lenient_score")]
    pub new_accuracy: f64,

    /// RFC 3339, UTC
    #[serde(default, alias = "Timestamp")]
    pub timestamp: String,

    #[serde(default, alias = "Updated_By")]
    pub author: String,
}

impl CorrectionEvent {
    /// New event for `record`, stamped now; previous code comes from the record
    pub fn for_record(record: &CompanyRecord, author: &str) -> Self {
        CorrectionEvent {
            identity_key: record.normalized_registration_id().unwrap_or_default(),
            entity_name: record.entity_name.trim().to_string(),
            description: record.description.clone(),
            previous_code: record.assigned_code.as_deref().and_then(parse_code),
            previous_accuracy: 0.0,
            new_code: None,
            new_accuracy: 0.0,
            timestamp: now_timestamp(),
            author: author.to_string(),
        }
    }

    pub fn with_previous_accuracy(mut self, accuracy: f64) -> Self {
        self.previous_accuracy = accuracy;
        self
    }

    pub fn with_new_code(mut self, code: Option<i64>, accuracy: f64) -> Self {
        self.new_code = code;
        self.new_accuracy = accuracy;
        self
    }

    pub fn with_timestamp(mut self, timestamp: &str) -> Self {
        self.timestamp = timestamp.to_string();
        self
    }

    pub fn normalized_name(&self) -> String {
        normalize_entity_name(&self.entity_name)
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Entities are grouped by name; nameless events fall back to their identity key
    fn grouping_key(&self) -> String {
        let name = self.normalized_name();
        if name.is_empty() {
            self.identity_key.clone()
        } else {
            name
        }
    }
}

fn lenient_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_code))
}

fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|f| f.is_finite())
        .unwrap_or(0.0))
}

// ============================================================================
// TIME / IDENTITY HELPERS
// ============================================================================

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// RFC 3339, or a naive ISO-8601 datetime read as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `TEMP_<yyyymmddHHMMSSffffff>_<8 hex>` for events with no usable registration id
pub fn synthetic_identity_key() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("TEMP_{}_{}", Utc::now().format("%Y%m%d%H%M%S%6f"), &id[..8])
}

// ============================================================================
// PROJECTIONS
// ============================================================================

/// One event per entity: the one with the greatest timestamp.
/// Equal timestamps go to the later-appended event; unparsable timestamps lose
/// to any parsable one. Output is ordered by grouping key.
pub fn latest_per_entity(events: &[CorrectionEvent]) -> Vec<CorrectionEvent> {
    let mut latest: BTreeMap<String, (Option<DateTime<Utc>>, &CorrectionEvent)> = BTreeMap::new();

    for event in events {
        let ts = event.parsed_timestamp();
        latest
            .entry(event.grouping_key())
            .and_modify(|current| {
                if ts >= current.0 {
                    *current = (ts, event);
                }
            })
            .or_insert((ts, event));
    }

    latest.into_values().map(|(_, event)| event.clone()).collect()
}

// ============================================================================
// CORRECTION STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct CorrectionStore {
    path: PathBuf,
    lock: LockOptions,
}

impl CorrectionStore {
    /// Open the log at `path`, creating a header-only file if it does not exist yet
    pub fn open(path: impl Into<PathBuf>, lock: LockOptions) -> Result<Self, StoreError> {
        let store = CorrectionStore {
            path: path.into(),
            lock,
        };

        if !store.path.exists() {
            let _guard = FileLock::acquire(&store.path, &store.lock)?;
            if !store.path.exists() {
                write_atomic(&encode(&[])?, &store.path)?;
                log::info!("Created correction log: {}", store.path.display());
            }
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append under the lock (read-modify-write). Prior events are never touched.
    /// Returns the event as persisted, with its resolved identity key.
    pub fn append(&self, mut event: CorrectionEvent) -> Result<CorrectionEvent, StoreError> {
        event.identity_key = match normalize_registration_id(&event.identity_key) {
            Some(key) => key,
            None => {
                let key = synthetic_identity_key();
                log::warn!(
                    "No registration id for {:?}; using temporary key {}",
                    event.entity_name,
                    key
                );
                key
            }
        };
        if event.timestamp.trim().is_empty() {
            event.timestamp = now_timestamp();
        }

        let _guard = FileLock::acquire(&self.path, &self.lock)?;

        let mut events = self.events()?;
        events.push(event.clone());
        write_atomic(&encode(&events)?, &self.path)?;

        log::info!(
            "Recorded correction for {} ({}): {:?} -> {:?} ({} events in log)",
            event.entity_name,
            event.identity_key,
            event.previous_code,
            event.new_code,
            events.len()
        );
        Ok(event)
    }

    /// Full log in append order. Lock-free: the file is only ever replaced whole.
    pub fn events(&self) -> Result<Vec<CorrectionEvent>, StoreError> {
        let bytes = read_safe(&self.path)?;
        decode(&bytes, &self.path)
    }

    pub fn latest_per_entity(&self) -> Result<Vec<CorrectionEvent>, StoreError> {
        Ok(latest_per_entity(&self.events()?))
    }

    /// Every version recorded for one entity, oldest first
    pub fn history(&self, entity_name: &str) -> Result<Vec<CorrectionEvent>, StoreError> {
        let key = normalize_entity_name(entity_name);
        let mut events: Vec<CorrectionEvent> = self
            .events()?
            .into_iter()
            .filter(|e| e.normalized_name() == key)
            .collect();

        // Stable: equal timestamps keep append order
        events.sort_by_key(|e| e.parsed_timestamp());
        Ok(events)
    }

    pub fn reconcile(&self, records: &[CompanyRecord]) -> Result<Vec<ReconciledRecord>, StoreError> {
        let latest = self.latest_per_entity()?;
        Ok(reconciliation::reconcile(records, &latest))
    }
}

// ============================================================================
// CSV ENCODING
// ============================================================================

fn encode(events: &[CorrectionEvent]) -> Result<Vec<u8>, StoreError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    wtr.write_record(LOG_COLUMNS).map_err(StoreError::Encode)?;
    for event in events {
        wtr.serialize(event).map_err(StoreError::Encode)?;
    }

    wtr.into_inner()
        .map_err(|e| StoreError::Encode(csv::Error::from(e.into_error())))
}

fn decode(bytes: &[u8], path: &Path) -> Result<Vec<CorrectionEvent>, StoreError> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }

    let mut rdr = csv::Reader::from_reader(bytes);
    rdr.deserialize()
        .collect::<Result<Vec<CorrectionEvent>, _>>()
        .map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn test_store(dir: &Path) -> CorrectionStore {
        CorrectionStore::open(dir.join("corrections.csv"), LockOptions::default()).unwrap()
    }

    fn acme() -> CompanyRecord {
        CompanyRecord::new("Acme Ltd", "Software development")
            .with_registration_id("00012345")
            .with_assigned_code("62011")
    }

    fn event(name: &str, code: i64, timestamp: &str) -> CorrectionEvent {
        CorrectionEvent::for_record(&CompanyRecord::new(name, "desc"), "analyst")
            .with_new_code(Some(code), 95.0)
            .with_timestamp(timestamp)
    }

    #[test]
    fn test_open_creates_header_only_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.trim_end(), LOG_COLUMNS.join(","));
        assert!(store.events().unwrap().is_empty());
        assert!(store.latest_per_entity().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        std::fs::remove_file(store.path()).unwrap();

        assert!(store.events().unwrap().is_empty());
    }

    #[test]
    fn test_history_retained_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let timestamps = [
            "2024-03-01T09:00:00.000000Z",
            "2024-03-02T09:00:00.000000Z",
            "2024-03-03T09:00:00.000000Z",
            "2024-03-04T09:00:00.000000Z",
        ];
        for (i, ts) in timestamps.iter().enumerate() {
            let event = CorrectionEvent::for_record(&acme(), "analyst")
                .with_new_code(Some(62000 + i as i64), 90.0)
                .with_timestamp(ts);
            store.append(event).unwrap();
        }

        assert_eq!(store.events().unwrap().len(), 4);

        let latest = store.latest_per_entity().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].new_code, Some(62003));

        let history = store.history(" acme ltd").unwrap();
        let codes: Vec<Option<i64>> = history.iter().map(|e| e.new_code).collect();
        assert_eq!(codes, vec![Some(62000), Some(62001), Some(62002), Some(62003)]);
    }

    #[test]
    fn test_latest_wins_regardless_of_append_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        store.append(event("ACME LTD", 62012, "2024-05-02T10:00:00Z")).unwrap();
        store.append(event("Acme Ltd ", 62011, "2024-05-01T10:00:00Z")).unwrap();

        let latest = store.latest_per_entity().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].new_code, Some(62012));
        assert_eq!(store.events().unwrap().len(), 2);
    }

    #[test]
    fn test_equal_timestamps_prefer_later_append() {
        let events = vec![
            event("Acme Ltd", 1, "2024-05-01T10:00:00Z"),
            event("Acme Ltd", 2, "2024-05-01T10:00:00Z"),
        ];
        assert_eq!(latest_per_entity(&events)[0].new_code, Some(2));
    }

    #[test]
    fn test_unparsable_timestamp_loses() {
        let events = vec![
            event("Acme Ltd", 1, "2024-05-01T10:00:00Z"),
            event("Acme Ltd", 2, "not a date"),
        ];
        assert_eq!(latest_per_entity(&events)[0].new_code, Some(1));
    }

    #[test]
    fn test_latest_groups_by_name_and_orders_by_key() {
        let events = vec![
            event("Zeta PLC", 1, "2024-05-01T10:00:00Z"),
            event("Acme Ltd", 2, "2024-05-01T10:00:00Z"),
            event("zeta plc", 3, "2024-05-03T10:00:00Z"),
        ];

        let latest = latest_per_entity(&events);
        let summary: Vec<(String, Option<i64>)> =
            latest.iter().map(|e| (e.normalized_name(), e.new_code)).collect();

        assert_eq!(
            summary,
            vec![("ACME LTD".to_string(), Some(2)), ("ZETA PLC".to_string(), Some(3))]
        );
    }

    #[test]
    fn test_missing_identity_gets_synthetic_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let record = CompanyRecord::new("No Number Ltd", "Bakery").with_registration_id("nan");
        let stored = store
            .append(CorrectionEvent::for_record(&record, "analyst").with_new_code(Some(10710), 92.0))
            .unwrap();

        assert!(stored.identity_key.starts_with("TEMP_"));
        let parts: Vec<&str> = stored.identity_key.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 20);
        assert_eq!(parts[2].len(), 8);

        assert_eq!(store.events().unwrap()[0].identity_key, stored.identity_key);
    }

    #[test]
    fn test_registration_id_normalised_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let record = acme().with_registration_id("12345.0");
        let stored = store.append(CorrectionEvent::for_record(&record, "analyst")).unwrap();

        assert_eq!(stored.identity_key, "12345");
        assert_eq!(stored.previous_code, Some(62011));
        assert!(stored.parsed_timestamp().is_some());
    }

    #[test]
    fn test_reads_legacy_float_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        std::fs::write(
            &path,
            "Registration number,Company_Name,Business_Description,Current_SIC,Old_Accuracy,New_SIC,New_Accuracy,Timestamp,Updated_By\n\
             12345,Acme Ltd,Software,62011.0,55.5,62012.0,,2024-05-01T10:00:00.123456,analyst\n",
        )
        .unwrap();

        let store = CorrectionStore::open(&path, LockOptions::default()).unwrap();
        let events = store.events().unwrap();

        assert_eq!(events[0].previous_code, Some(62011));
        assert_eq!(events[0].new_code, Some(62012));
        assert_eq!(events[0].previous_accuracy, 55.5);
        assert_eq!(events[0].new_accuracy, 0.0);
        assert!(events[0].parsed_timestamp().is_some());
    }

    #[test]
    fn test_malformed_log_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, "a,b\n1,2,3\n").unwrap();

        let store = CorrectionStore::open(&path, LockOptions::default()).unwrap();
        assert!(matches!(store.events(), Err(StoreError::Malformed { .. })));
    }

    #[test]
    fn test_append_times_out_when_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrections.csv");
        let options = LockOptions {
            timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
            stale_after: None,
        };
        let store = CorrectionStore::open(&path, options).unwrap();

        let _held = FileLock::acquire(&path, &LockOptions::default()).unwrap();
        let err = store.append(CorrectionEvent::for_record(&acme(), "analyst")).unwrap_err();

        assert!(err.is_retryable());
        assert!(store.events().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(test_store(dir.path()));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let record = CompanyRecord::new(&format!("Company {}", i), "Retail")
                        .with_registration_id(&format!("{}", 1000 + i));
                    store
                        .append(CorrectionEvent::for_record(&record, "analyst").with_new_code(Some(47110), 91.0))
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.events().unwrap().len(), 6);
        assert_eq!(store.latest_per_entity().unwrap().len(), 6);
    }
}
