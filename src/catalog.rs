// 📚 Catalog Loader - Classification code ↔ description lookup
// Loaded once, immutable afterwards, shared by reference with every matcher call.

use crate::error::LoadError;
use calamine::{open_workbook_auto, Data, Range, Reader};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Header aliases tried in order for the code column
pub const CODE_COLUMN_ALIASES: &[&str] = &["SIC Code", "Section A", "Code"];

/// Header aliases tried in order for the description column
pub const DESCRIPTION_COLUMN_ALIASES: &[&str] =
    &["Description", "Agriculture, Forestry and Fishing", "Desc"];

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

// ============================================================================
// CATALOG ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String,
    pub description: String,
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Entries in load order, one per code
    entries: Vec<CatalogEntry>,

    /// code → index into `entries`
    by_code: HashMap<String, usize>,

    /// description → code (last write wins on duplicate descriptions)
    by_description: HashMap<String, String>,
}

impl Catalog {
    /// Load a catalog from CSV, or from a spreadsheet when the extension says so
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let is_spreadsheet = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SPREADSHEET_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);

        let (headers, rows) = if is_spreadsheet {
            read_spreadsheet(path)?
        } else {
            let file = std::fs::File::open(path).map_err(|e| LoadError::Csv {
                path: path.to_path_buf(),
                source: csv::Error::from(e),
            })?;
            read_csv(file).map_err(|source| LoadError::Csv {
                path: path.to_path_buf(),
                source,
            })?
        };

        let catalog = Self::from_table(&headers, rows)?;
        log::info!("Loaded {} catalog codes from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Load a CSV catalog from any reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let (headers, rows) = read_csv(reader).map_err(|source| LoadError::Csv {
            path: "<reader>".into(),
            source,
        })?;
        Self::from_table(&headers, rows)
    }

    /// Build from a header row and data rows, resolving the columns by alias
    pub fn from_table(headers: &[String], rows: Vec<Vec<String>>) -> Result<Self, LoadError> {
        let code_col = find_column(headers, CODE_COLUMN_ALIASES);
        let desc_col = find_column(headers, DESCRIPTION_COLUMN_ALIASES);

        let (code_col, desc_col) = match (code_col, desc_col) {
            (Some(c), Some(d)) => (c, d),
            (c, d) => {
                let mut missing = Vec::new();
                if c.is_none() {
                    missing.push("code");
                }
                if d.is_none() {
                    missing.push("description");
                }
                return Err(LoadError::MissingColumns {
                    missing,
                    found: headers.to_vec(),
                });
            }
        };

        let entries = rows.into_iter().filter_map(|row| {
            let code = row.get(code_col)?;
            let description = row.get(desc_col)?;
            Some(CatalogEntry {
                code: code.clone(),
                description: description.clone(),
            })
        });

        Ok(Self::from_entries(entries))
    }

    /// Build from entries directly; blank rows are skipped, duplicate codes keep the first
    pub fn from_entries<I: IntoIterator<Item = CatalogEntry>>(entries: I) -> Self {
        let mut catalog = Catalog::default();

        for entry in entries {
            let code = normalize_code(&entry.code);
            let description = entry.description.trim().to_string();
            if code.is_empty() || description.is_empty() {
                continue;
            }

            if catalog.by_code.contains_key(&code) {
                log::warn!("Duplicate catalog code {} ignored ({:?})", code, description);
                continue;
            }

            catalog.by_code.insert(code.clone(), catalog.entries.len());
            catalog.by_description.insert(description.clone(), code.clone());
            catalog.entries.push(CatalogEntry { code, description });
        }

        catalog
    }

    /// Description for a code; tolerates spreadsheet artifacts like `"62012.0"`
    pub fn description(&self, code: &str) -> Option<&str> {
        self.by_code
            .get(&normalize_code(code))
            .map(|&idx| self.entries[idx].description.as_str())
    }

    pub fn code_for(&self, description: &str) -> Option<&str> {
        self.by_description.get(description.trim()).map(|c| c.as_str())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(&normalize_code(code))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entries reachable through the reverse map: one per distinct description
    pub fn match_targets(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(move |e| {
            self.by_description
                .get(&e.description)
                .map(|c| c == &e.code)
                .unwrap_or(false)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Trim and drop a trailing `.0` left behind by numeric spreadsheet cells
pub fn normalize_code(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_string()
}

/// Lowest code first: numeric order when both parse, otherwise lexicographic
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(alias))
    })
}

fn read_csv<R: Read>(reader: R) -> Result<(Vec<String>, Vec<Vec<String>>), csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }

    Ok((headers, rows))
}

fn read_spreadsheet(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), LoadError> {
    let spreadsheet_err = |message: String| LoadError::Spreadsheet {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet_err(e.to_string()))?;

    // Catalog lives on the first sheet
    let first_sheet = match workbook.sheet_names().first().cloned() {
        Some(sheet) => Some(
            workbook
                .worksheet_range(&sheet)
                .map_err(|e| spreadsheet_err(e.to_string()))?,
        ),
        None => None,
    };

    table_from_first_sheet(first_sheet).map_err(spreadsheet_err)
}

/// Header row plus data rows, every cell rendered as text
fn table_from_first_sheet(
    range: Option<Range<Data>>,
) -> Result<(Vec<String>, Vec<Vec<String>>), String> {
    let range = range.ok_or_else(|| "workbook has no sheets".to_string())?;

    let mut rows = range.rows().map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();

    Ok((headers, rows.collect()))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.is_finite() => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, description: &str) -> CatalogEntry {
        CatalogEntry {
            code: code.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_from_reader_primary_headers() {
        let csv = "SIC Code,Description\n62012,Business and domestic software development\n56101,Licensed restaurants\n";
        let catalog = Catalog::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.description("62012"),
            Some("Business and domestic software development")
        );
        assert_eq!(catalog.code_for("Licensed restaurants"), Some("56101"));
    }

    #[test]
    fn test_from_reader_alias_headers() {
        let csv = "Section A,\"Agriculture, Forestry and Fishing\"\n01110,Growing of cereals\n";
        let catalog = Catalog::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(catalog.description("01110"), Some("Growing of cereals"));
    }

    #[test]
    fn test_header_match_ignores_case_and_padding() {
        let csv = " code , desc \n64191,Banks\n";
        let catalog = Catalog::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(catalog.description("64191"), Some("Banks"));
    }

    #[test]
    fn test_missing_columns() {
        let csv = "Identifier,Label\n1,Thing\n";
        let err = Catalog::from_reader(csv.as_bytes()).unwrap_err();

        match err {
            LoadError::MissingColumns { missing, found } => {
                assert_eq!(missing, vec!["code", "description"]);
                assert_eq!(found, vec!["Identifier".to_string(), "Label".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_description_column_only() {
        let csv = "Code,Label\n1,Thing\n";
        match Catalog::from_reader(csv.as_bytes()).unwrap_err() {
            LoadError::MissingColumns { missing, .. } => assert_eq!(missing, vec!["description"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_code_normalization() {
        let catalog = Catalog::from_entries(vec![entry("62012.0", "Software development")]);

        assert!(catalog.contains("62012"));
        assert_eq!(catalog.description(" 62012.0 "), Some("Software development"));
    }

    #[test]
    fn test_duplicate_code_keeps_first() {
        let catalog = Catalog::from_entries(vec![
            entry("10710", "Manufacture of bread"),
            entry("10710", "Bakery products"),
        ]);

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.description("10710"), Some("Manufacture of bread"));
    }

    #[test]
    fn test_duplicate_description_last_write_wins() {
        let catalog = Catalog::from_entries(vec![
            entry("47110", "Retail sale"),
            entry("47190", "Retail sale"),
        ]);

        assert_eq!(catalog.code_for("Retail sale"), Some("47190"));

        let targets: Vec<&str> = catalog.match_targets().map(|e| e.code.as_str()).collect();
        assert_eq!(targets, vec!["47190"]);
    }

    #[test]
    fn test_blank_rows_skipped() {
        let csv = "Code,Description\n,\n99999,\n01110,Growing of cereals\n";
        let catalog = Catalog::from_reader(csv.as_bytes()).unwrap();

        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_compare_codes() {
        assert_eq!(compare_codes("9", "10"), Ordering::Less);
        assert_eq!(compare_codes("62012", "62012"), Ordering::Equal);
        assert_eq!(compare_codes("A01", "B01"), Ordering::Less);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Catalog::load(Path::new("/nonexistent/SIC_codes.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Csv { .. }));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SIC_codes.csv");
        std::fs::write(&path, "SIC Code,Description\n64191,Banks\n").unwrap();

        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.description("64191"), Some("Banks"));
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Float(62012.0)), "62012");
        assert_eq!(cell_to_string(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_to_string(&Data::Int(1110)), "1110");
        assert_eq!(cell_to_string(&Data::String("Banks".to_string())), "Banks");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }

    #[test]
    fn test_first_sheet_table() {
        let mut range = Range::new((0, 0), (2, 1));
        range.set_value((0, 0), Data::String("SIC Code".to_string()));
        range.set_value((0, 1), Data::String("Description".to_string()));
        range.set_value((1, 0), Data::Float(62012.0));
        range.set_value((1, 1), Data::String("Business and domestic software development".to_string()));
        range.set_value((2, 0), Data::Int(56101));
        range.set_value((2, 1), Data::String("Licensed restaurants".to_string()));

        let (headers, rows) = table_from_first_sheet(Some(range)).unwrap();
        assert_eq!(headers, vec!["SIC Code", "Description"]);
        assert_eq!(rows[0][0], "62012");
        assert_eq!(rows[1], vec!["56101", "Licensed restaurants"]);
    }

    #[test]
    fn test_workbook_without_sheets_is_an_error() {
        let err = table_from_first_sheet(None).unwrap_err();
        assert_eq!(err, "workbook has no sheets");
    }

    #[test]
    fn test_load_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SIC_codes.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "SIC Code").unwrap();
        sheet.write_string(0, 1, "Description").unwrap();
        sheet.write_number(1, 0, 62012.0).unwrap();
        sheet.write_string(1, 1, "Business and domestic software development").unwrap();
        sheet.write_number(2, 0, 64191.0).unwrap();
        sheet.write_string(2, 1, "Banks").unwrap();
        workbook.save(&path).unwrap();

        let catalog = Catalog::load(&path).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.description("62012"),
            Some("Business and domestic software development")
        );
        assert_eq!(catalog.code_for("Banks"), Some("64191"));
    }

    #[test]
    fn test_load_corrupt_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SIC_codes.xlsx");
        std::fs::write(&path, b"not a zip archive").unwrap();

        let err = Catalog::load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Spreadsheet { .. }));
    }
}
