//! In-memory cohort table read from the extraction query's CSV output.
//!
//! One row per patient-stay. Columns stay as text until a typed accessor
//! is asked for them, so a malformed value in a column nobody uses never
//! fails a run. Every accessor returns a vector aligned with the table's
//! row order.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while reading or querying a cohort table.
#[derive(Error, Debug)]
pub enum CohortError {
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Header names the same column twice.
    #[error("Duplicate column '{0}' in cohort header")]
    DuplicateColumn(String),

    /// Requested column is not in the header.
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    /// A required value is empty or NA.
    #[error("Missing value in column '{column}' at row {row}")]
    MissingValue { column: String, row: usize },

    /// A value cannot be read as the requested type.
    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    /// A predictor rule cannot be parsed.
    #[error("Invalid predictor rule: {0}")]
    InvalidRule(String),
}

/// Row-major cohort table with named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CohortTable {
    /// Creates a table from headers and rows.
    ///
    /// # Errors
    /// Returns an error if a header repeats or a row has the wrong width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, CohortError> {
        let mut seen = HashSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(CohortError::DuplicateColumn(header.clone()));
            }
        }
        for (row, values) in rows.iter().enumerate() {
            if values.len() != headers.len() {
                return Err(CohortError::InvalidValue {
                    column: "<row>".to_string(),
                    row,
                    value: format!("{} fields, expected {}", values.len(), headers.len()),
                });
            }
        }
        Ok(Self { headers, rows })
    }

    /// Reads a cohort table from a CSV file with a header row.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CohortError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            rows = table.len(),
            columns = table.headers.len(),
            "Loaded cohort table"
        );
        Ok(table)
    }

    /// Reads a cohort table from any CSV source with a header row.
    ///
    /// # Errors
    /// Returns an error if the CSV is malformed.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CohortError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Self::new(headers, rows)
    }

    /// Number of patient-stays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Position of `name` in the header.
    ///
    /// # Errors
    /// Returns [`CohortError::UnknownColumn`] if the column is absent.
    pub fn column_index(&self, name: &str) -> Result<usize, CohortError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| CohortError::UnknownColumn(name.to_string()))
    }

    /// Reads a column as real numbers.
    ///
    /// # Errors
    /// Returns an error if the column is absent, or a value is missing or
    /// not a number.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, CohortError> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, values)| parse_numeric(name, row, &values[idx]))
            .collect()
    }

    /// Reads a column as booleans.
    ///
    /// Accepts `true/false`, `t/f`, `yes/no`, `y/n` (any case) and numbers,
    /// where any non-zero number is true.
    ///
    /// # Errors
    /// Returns an error if the column is absent, or a value is missing or
    /// not a boolean.
    pub fn boolean_column(&self, name: &str) -> Result<Vec<bool>, CohortError> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, values)| parse_boolean(name, row, &values[idx]))
            .collect()
    }

    /// Keeps only rows with a value present in every one of `columns`.
    ///
    /// Vectors extracted from the returned table stay aligned with each
    /// other, which is not true when dropping missing values per column.
    ///
    /// # Errors
    /// Returns an error if a column is absent.
    pub fn complete_cases(&self, columns: &[&str]) -> Result<Self, CohortError> {
        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>, _>>()?;

        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .filter(|row| indices.iter().all(|&i| !is_missing(&row[i])))
            .cloned()
            .collect();

        let dropped = self.rows.len() - rows.len();
        if dropped > 0 {
            warn!(
                dropped,
                remaining = rows.len(),
                columns = ?columns,
                "Dropped patient-stays with missing values"
            );
        }

        Ok(Self {
            headers: self.headers.clone(),
            rows,
        })
    }

    /// Number of rows whose value in `id_column` repeats an earlier row.
    ///
    /// # Errors
    /// Returns an error if the column is absent.
    pub fn duplicate_ids(&self, id_column: &str) -> Result<usize, CohortError> {
        let idx = self.column_index(id_column)?;
        let mut seen = HashSet::with_capacity(self.rows.len());
        Ok(self
            .rows
            .iter()
            .filter(|row| !seen.insert(row[idx].as_str()))
            .count())
    }
}

/// True for empty cells and the usual NA spellings.
#[must_use]
pub fn is_missing(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || value.eq_ignore_ascii_case("na")
        || value.eq_ignore_ascii_case("nan")
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("none")
}

fn parse_numeric(column: &str, row: usize, value: &str) -> Result<f64, CohortError> {
    if is_missing(value) {
        return Err(CohortError::MissingValue {
            column: column.to_string(),
            row,
        });
    }
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CohortError::InvalidValue {
            column: column.to_string(),
            row,
            value: value.to_string(),
        })
}

fn parse_boolean(column: &str, row: usize, value: &str) -> Result<bool, CohortError> {
    if is_missing(value) {
        return Err(CohortError::MissingValue {
            column: column.to_string(),
            row,
        });
    }
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Ok(true),
        "false" | "f" | "no" | "n" => Ok(false),
        other => match other.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v != 0.0),
            _ => Err(CohortError::InvalidValue {
                column: column.to_string(),
                row,
                value: value.to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> CohortTable {
        let csv = "\
icustay_id,sofa,qsofa,angus,sepsis3
200001,3,1,1,True
200002,0,0,0,False
200003,,2,1,t
200004,5,NA,0,1.0
";
        CohortTable::from_reader(csv.as_bytes()).unwrap()
    }

    // ============================================================
    // Loading
    // ============================================================

    #[test]
    fn reads_headers_and_rows() {
        let table = sample_table();
        assert_eq!(table.len(), 4);
        assert_eq!(table.headers()[1], "sofa");
        assert!(table.has_column("angus"));
        assert!(!table.has_column("mlods"));
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cohort.csv");
        std::fs::write(&path, "icustay_id, sofa\n1, 2\n2, 0\n").unwrap();

        let table = CohortTable::from_path(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.numeric_column("sofa").unwrap(), vec![2.0, 0.0]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CohortTable::from_path(dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, CohortError::Io(_)));
    }

    #[test]
    fn duplicate_header_is_rejected() {
        let csv = "sofa,sofa\n1,2\n";
        let err = CohortTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, CohortError::DuplicateColumn(c) if c == "sofa"));
    }

    #[test]
    fn ragged_rows_are_rejected_by_csv_reader() {
        let csv = "a,b\n1,2\n3\n";
        assert!(CohortTable::from_reader(csv.as_bytes()).is_err());
    }

    // ============================================================
    // Typed columns
    // ============================================================

    #[test]
    fn boolean_column_accepts_words_and_numbers() {
        let table = sample_table();
        let flags = table.boolean_column("sepsis3").unwrap();
        assert_eq!(flags, vec![true, false, true, true]);
        let outcome = table.boolean_column("angus").unwrap();
        assert_eq!(outcome, vec![true, false, true, false]);
    }

    #[test]
    fn numeric_column_reports_missing_row() {
        let table = sample_table();
        let err = table.numeric_column("sofa").unwrap_err();
        assert!(
            matches!(err, CohortError::MissingValue { ref column, row: 2 } if column == "sofa"),
            "{err}"
        );
    }

    #[test]
    fn invalid_numeric_value_is_reported() {
        let csv = "sofa\n2\nhigh\n";
        let table = CohortTable::from_reader(csv.as_bytes()).unwrap();
        let err = table.numeric_column("sofa").unwrap_err();
        assert!(matches!(err, CohortError::InvalidValue { row: 1, .. }));
    }

    #[test]
    fn unknown_column_is_reported() {
        let table = sample_table();
        assert!(matches!(
            table.numeric_column("lods"),
            Err(CohortError::UnknownColumn(c)) if c == "lods"
        ));
    }

    // ============================================================
    // Complete cases
    // ============================================================

    #[test]
    fn complete_cases_keeps_vectors_aligned() {
        let table = sample_table();
        let complete = table.complete_cases(&["sofa", "qsofa", "angus"]).unwrap();
        assert_eq!(complete.len(), 2);
        assert_eq!(complete.numeric_column("sofa").unwrap(), vec![3.0, 0.0]);
        assert_eq!(complete.boolean_column("angus").unwrap(), vec![true, false]);
    }

    #[test]
    fn complete_cases_without_missing_is_identity() {
        let table = sample_table();
        let complete = table.complete_cases(&["angus"]).unwrap();
        assert_eq!(complete, table);
    }

    #[test]
    fn duplicate_ids_are_counted() {
        let csv = "icustay_id,x\n1,0\n2,0\n1,1\n";
        let table = CohortTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.duplicate_ids("icustay_id").unwrap(), 1);
    }

    #[test]
    fn missing_spellings() {
        for value in ["", " ", "NA", "nan", "NULL", "None"] {
            assert!(is_missing(value), "{value:?}");
        }
        assert!(!is_missing("0"));
    }
}
