//! Soil reference table and postal-code range lookup.
//!
//! The table is a CSV with the columns
//! `pincode_start, pincode_end, soil_type, drainage, infiltration, wilting_point, field_capacity`.
//! Rows that cannot be turned into a valid [`SoilRecord`] are skipped with a
//! warning; they never abort loading.

use crate::errors::{AppError, ResultExt};
use crate::models::{PinCode, SoilRecord};
use csv::StringRecord;
use std::io::Read;
use std::path::Path;

const REQUIRED_COLUMNS: [&str; 7] = [
    "pincode_start",
    "pincode_end",
    "soil_type",
    "drainage",
    "infiltration",
    "wilting_point",
    "field_capacity",
];

/// Parsed soil reference table, kept in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoilTable {
    records: Vec<SoilRecord>,
    skipped_rows: usize,
}

/// Column positions resolved from the header row.
struct ColumnIndex([Option<usize>; 7]);

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Self {
        let mut positions = [None; 7];
        for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers.iter().position(|h| h == name);
        }
        Self(positions)
    }

    fn missing(&self) -> Vec<&'static str> {
        REQUIRED_COLUMNS
            .iter()
            .zip(self.0)
            .filter(|(_, pos)| pos.is_none())
            .map(|(name, _)| *name)
            .collect()
    }

    fn field<'r>(&self, row: &'r StringRecord, column: usize) -> Result<&'r str, String> {
        self.0[column]
            .and_then(|pos| row.get(pos))
            .filter(|value| !value.is_empty())
            .ok_or_else(|| format!("missing column '{}'", REQUIRED_COLUMNS[column]))
    }

    fn parse<T: std::str::FromStr>(&self, row: &StringRecord, column: usize) -> Result<T, String> {
        let raw = self.field(row, column)?;
        raw.parse::<T>()
            .map_err(|_| format!("column '{}' has invalid value {:?}", REQUIRED_COLUMNS[column], raw))
    }

    fn record(&self, row: &StringRecord) -> Result<SoilRecord, String> {
        let record = SoilRecord {
            pincode_start: self.parse(row, 0)?,
            pincode_end: self.parse(row, 1)?,
            soil_type: self.field(row, 2)?.to_string(),
            drainage: self.field(row, 3)?.to_string(),
            infiltration_rate: self.parse(row, 4)?,
            wilting_point: self.parse(row, 5)?,
            field_capacity: self.parse(row, 6)?,
        };
        record.validate()?;
        Ok(record)
    }
}

impl SoilTable {
    pub fn new(records: Vec<SoilRecord>) -> Self {
        Self {
            records,
            skipped_rows: 0,
        }
    }

    /// Parses a table from CSV text.
    ///
    /// Only an unreadable header row is an error; bad data rows are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AppError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers().context("reading soil table header")?.clone();
        tracing::debug!("Soil table headers: {:?}", headers);

        let columns = ColumnIndex::from_headers(&headers);
        let missing = columns.missing();
        if !missing.is_empty() {
            tracing::warn!(
                "Soil table is missing expected columns {:?}; affected rows will be skipped",
                missing
            );
        }

        let mut table = SoilTable::default();
        for (idx, row) in rdr.records().enumerate() {
            // Header is line 1.
            let line = idx + 2;
            let parsed = row
                .map_err(|e| e.to_string())
                .and_then(|row| columns.record(&row));
            match parsed {
                Ok(record) => table.records.push(record),
                Err(reason) => {
                    tracing::warn!("Skipping soil table line {}: {}", line, reason);
                    table.skipped_rows += 1;
                }
            }
        }

        tracing::debug!(
            "Parsed soil table: {} records, {} skipped",
            table.records.len(),
            table.skipped_rows
        );
        Ok(table)
    }

    /// Reads and parses the table at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening soil table {}", path.display()))?;
        Self::from_reader(file)
    }

    /// First record, in table order, whose range contains `pincode`.
    pub fn lookup(&self, pincode: PinCode) -> Option<&SoilRecord> {
        self.records.iter().find(|record| record.covers(pincode))
    }

    pub fn records(&self) -> &[SoilRecord] {
        &self.records
    }

    /// Number of data rows dropped while parsing.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Looks up soil attributes for a raw postal code.
///
/// Malformed postal codes are a validation error; a well-formed code outside
/// every range is `Ok(None)`.
pub fn lookup_soil(pincode: &str, table: &SoilTable) -> Result<Option<SoilRecord>, AppError> {
    let pincode = PinCode::parse(pincode)?;
    Ok(table.lookup(pincode).cloned())
}
