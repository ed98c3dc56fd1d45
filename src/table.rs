// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! CSV-backed lookup table keyed by an identifier column
//!
//! The gateway's address map is a spreadsheet export: a few title rows, a row
//! of column names, then one row per register. [`IndexedTable`] ingests such a
//! file once, indexes every row by the value of a chosen identifier column and
//! provides typed cell lookup and update.
//!
//! Cells that look like integers are stored as integers, everything else is
//! kept as text. Identifiers passed to [`IndexedTable::get_cell`] and
//! [`IndexedTable::set_cell`] go through the same coercion, so `"1042"` and
//! `1042` designate the same row.
//!
//! ## Example
//!
//! ```
//! use rust_modbus_gateway::table::{CellValue, IndexedTable};
//!
//! let csv = "Solark register map\nAPI Address,Name,Component Address\n1000,Serial,3\n";
//! let mut table = IndexedTable::new();
//! table.ingest_reader(csv.as_bytes(), "API Address", 1).unwrap();
//!
//! assert_eq!(
//!     table.get_cell(1000, "Component Address").unwrap(),
//!     &CellValue::Integer(3)
//! );
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while ingesting or querying an [`IndexedTable`]
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Row for {id_column}={id} not found")]
    RowNotFound { id_column: String, id: CellValue },

    #[error("Column '{0}' not defined")]
    ColumnNotFound(String),

    #[error("Another row with ID '{0}' was previously ingested")]
    DuplicateIdentifier(CellValue),

    #[error("Identifier column '{0}' is not present in the header row")]
    MissingIdentifierColumn(String),

    #[error("Table has already been populated")]
    AlreadyIngested,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single table cell
///
/// Serialized untagged so that a cell round-trips through JSON or YAML as a
/// plain number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Text(String),
}

impl CellValue {
    /// Coerce raw text into a cell, turning integer-looking text into an integer.
    ///
    /// Surrounding whitespace is ignored when parsing, but a string that does not
    /// parse is kept verbatim.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(value) => CellValue::Integer(value),
            Err(_) => CellValue::Text(raw.to_string()),
        }
    }

    /// Return the integer payload, if any
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(value) => Some(*value),
            CellValue::Text(_) => None,
        }
    }

    /// True for an empty text cell
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Text(text) if text.is_empty())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(value) => write!(f, "{}", value),
            CellValue::Text(text) => write!(f, "{}", text),
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Integer(value.into())
    }
}

impl From<u16> for CellValue {
    fn from(value: u16) -> Self {
        CellValue::Integer(value.into())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::coerce(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        match value.trim().parse::<i64>() {
            Ok(parsed) => CellValue::Integer(parsed),
            Err(_) => CellValue::Text(value),
        }
    }
}

/// Lookup table indexed by one identifier column
///
/// Rows keep the order in which they appear in the source file and are never
/// removed. Individual cells may be overwritten after ingestion through
/// [`IndexedTable::set_cell`].
#[derive(Debug, Clone, Default)]
pub struct IndexedTable {
    column_keys: Vec<String>,
    key_index_map: HashMap<String, usize>,
    rows: Vec<Vec<CellValue>>,
    id_key: Option<String>,
    id_index: usize,
    id_row_map: HashMap<CellValue, usize>,
}

impl IndexedTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table directly from a CSV file
    ///
    /// Equivalent to [`IndexedTable::new`] followed by [`IndexedTable::ingest_csv`].
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        id_column: &str,
        header_rows_to_skip: usize,
    ) -> Result<Self, TableError> {
        let mut table = Self::new();
        table.ingest_csv(path, id_column, header_rows_to_skip)?;
        Ok(table)
    }

    /// Ingest a CSV file from disk
    ///
    /// See [`IndexedTable::ingest_reader`] for the ingestion rules.
    pub fn ingest_csv<P: AsRef<Path>>(
        &mut self,
        path: P,
        id_column: &str,
        header_rows_to_skip: usize,
    ) -> Result<(), TableError> {
        let path = path.as_ref();
        info!("Loading address table from {}", path.display());
        let file = File::open(path)?;
        self.ingest_reader(file, id_column, header_rows_to_skip)
    }

    /// Ingest CSV content from any reader
    ///
    /// ### Parameters
    ///
    /// * `source` - The CSV content
    /// * `id_column` - Name of the column whose values identify rows
    /// * `header_rows_to_skip` - Number of leading lines discarded before the
    ///   column-name row
    ///
    /// ### Rules
    ///
    /// * Skipped lines are counted raw, so blank lines among the title rows
    ///   count too. After them, blank lines are ignored.
    /// * The first row after the skipped ones provides the column names.
    /// * A data row is kept only if it has exactly as many cells as there are
    ///   columns and its identifier cell is not empty. Other rows are dropped
    ///   without error, which tolerates ragged trailing rows in exported sheets.
    /// * Every cell that parses as an integer is stored as an integer.
    /// * A repeated identifier aborts ingestion with
    ///   [`TableError::DuplicateIdentifier`]; the table is left untouched.
    ///
    /// An empty source (no column-name row) leaves the table empty.
    pub fn ingest_reader<R: Read>(
        &mut self,
        source: R,
        id_column: &str,
        header_rows_to_skip: usize,
    ) -> Result<(), TableError> {
        if !self.column_keys.is_empty() {
            return Err(TableError::AlreadyIngested);
        }

        let mut source = BufReader::new(source);
        let mut line = Vec::new();
        for _ in 0..header_rows_to_skip {
            line.clear();
            if source.read_until(b'\n', &mut line)? == 0 {
                break;
            }
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(source);
        let mut records = reader.records();

        let column_keys: Vec<String> = match records.next() {
            Some(header) => header?.iter().map(str::to_string).collect(),
            None => {
                warn!("Address table source contains no header row");
                return Ok(());
            }
        };

        let key_index_map: HashMap<String, usize> = column_keys
            .iter()
            .enumerate()
            .map(|(index, key)| (key.clone(), index))
            .collect();

        let id_index = *key_index_map
            .get(id_column)
            .ok_or_else(|| TableError::MissingIdentifierColumn(id_column.to_string()))?;

        let column_count = column_keys.len();
        let mut rows = Vec::new();
        let mut id_row_map = HashMap::new();
        let mut dropped = 0usize;

        for record in records {
            let record = record?;
            if record.len() != column_count || record.get(id_index).map_or(true, str::is_empty) {
                dropped += 1;
                continue;
            }

            let row: Vec<CellValue> = record.iter().map(CellValue::coerce).collect();
            let row_id = row[id_index].clone();
            if id_row_map.contains_key(&row_id) {
                return Err(TableError::DuplicateIdentifier(row_id));
            }
            id_row_map.insert(row_id, rows.len());
            rows.push(row);
        }

        if dropped > 0 {
            debug!("Dropped {} malformed rows while ingesting address table", dropped);
        }
        info!(
            "Ingested {} rows with {} columns keyed by '{}'",
            rows.len(),
            column_count,
            id_column
        );

        self.column_keys = column_keys;
        self.key_index_map = key_index_map;
        self.rows = rows;
        self.id_key = Some(id_column.to_string());
        self.id_index = id_index;
        self.id_row_map = id_row_map;
        Ok(())
    }

    /// Column names, in file order
    pub fn column_keys(&self) -> &[String] {
        &self.column_keys
    }

    pub fn column_count(&self) -> usize {
        self.column_keys.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Name of the identifier column, once ingested
    pub fn id_key(&self) -> Option<&str> {
        self.id_key.as_deref()
    }

    /// Position of the identifier column
    pub fn id_index(&self) -> Option<usize> {
        self.id_key.as_ref().map(|_| self.id_index)
    }

    /// Position of a column, or `None` if the column is unknown
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.key_index_map.get(column).copied()
    }

    /// Row position of an identifier
    pub fn row_index<K: Into<CellValue>>(&self, id: K) -> Option<usize> {
        self.id_row_map.get(&id.into()).copied()
    }

    /// Full row for an identifier
    pub fn row<K: Into<CellValue>>(&self, id: K) -> Option<&[CellValue]> {
        self.row_index(id).map(|index| self.rows[index].as_slice())
    }

    /// Read one cell
    ///
    /// The identifier is coerced to an integer when possible before lookup.
    pub fn get_cell<K: Into<CellValue>>(&self, id: K, column: &str) -> Result<&CellValue, TableError> {
        let (row_index, col_index) = self.locate(id.into(), column)?;
        Ok(&self.rows[row_index][col_index])
    }

    /// Overwrite one cell and return the stored (coerced) value
    pub fn set_cell<K, V>(&mut self, id: K, column: &str, new_value: V) -> Result<CellValue, TableError>
    where
        K: Into<CellValue>,
        V: Into<CellValue>,
    {
        let (row_index, col_index) = self.locate(id.into(), column)?;
        let new_value = new_value.into();
        debug!(
            "Updating cell [{} / {}] to {}",
            self.rows[row_index][self.id_index], column, new_value
        );
        self.rows[row_index][col_index] = new_value.clone();
        Ok(new_value)
    }

    fn locate(&self, id: CellValue, column: &str) -> Result<(usize, usize), TableError> {
        let id = match id {
            CellValue::Text(text) => CellValue::from(text),
            integer => integer,
        };
        let row_index = match self.id_row_map.get(&id) {
            Some(index) => *index,
            None => {
                return Err(TableError::RowNotFound {
                    id_column: self.id_key.clone().unwrap_or_default(),
                    id,
                })
            }
        };
        let col_index = self
            .column_index(column)
            .ok_or_else(|| TableError::ColumnNotFound(column.to_string()))?;
        Ok((row_index, col_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: &str = "\
Sol-Ark Modbus map,,,
API Address,Name,Component Address,Unit
1000,Serial number,3,-
1001,Battery SOC,184,%
1002,Grid power,169,W
,orphan row,99,-
1003,short row
";

    fn points() -> IndexedTable {
        let mut table = IndexedTable::new();
        table
            .ingest_reader(POINTS.as_bytes(), "API Address", 1)
            .unwrap();
        table
    }

    #[test]
    fn test_ingest_builds_columns_and_rows() {
        let table = points();
        assert_eq!(
            table.column_keys(),
            &["API Address", "Name", "Component Address", "Unit"]
        );
        assert_eq!(table.column_count(), 4);
        assert_eq!(table.id_key(), Some("API Address"));
        assert_eq!(table.id_index(), Some(0));
        // empty identifier and short rows are dropped
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.row_index(1000), Some(0));
        assert_eq!(table.row_index(1002), Some(2));
    }

    #[test]
    fn test_integer_cells_are_coerced() {
        let table = points();
        assert_eq!(
            table.get_cell(1001, "Component Address").unwrap(),
            &CellValue::Integer(184)
        );
        assert_eq!(
            table.get_cell("1001", "Unit").unwrap(),
            &CellValue::Text("%".to_string())
        );
    }

    #[test]
    fn test_get_cell_errors() {
        let table = points();
        assert!(matches!(
            table.get_cell(4242, "Name"),
            Err(TableError::RowNotFound { .. })
        ));
        assert!(matches!(
            table.get_cell(1000, "Missing"),
            Err(TableError::ColumnNotFound(column)) if column == "Missing"
        ));
    }

    #[test]
    fn test_set_cell_round_trip() {
        let mut table = points();
        let stored = table.set_cell("1002", "Component Address", "170").unwrap();
        assert_eq!(stored, CellValue::Integer(170));
        assert_eq!(
            table.get_cell(1002, "Component Address").unwrap(),
            &CellValue::Integer(170)
        );

        let stored = table.set_cell(1002, "Unit", "kW").unwrap();
        assert_eq!(stored, CellValue::Text("kW".to_string()));
        assert!(matches!(
            table.set_cell(9, "Unit", "kW"),
            Err(TableError::RowNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_identifier_leaves_table_empty() {
        let csv = "id,value\n1,a\n2,b\n1,c\n";
        let mut table = IndexedTable::new();
        let result = table.ingest_reader(csv.as_bytes(), "id", 0);
        assert!(matches!(
            result,
            Err(TableError::DuplicateIdentifier(CellValue::Integer(1)))
        ));
        assert_eq!(table.row_count(), 0);
        assert!(table.get_cell(2, "value").is_err());
    }

    #[test]
    fn test_missing_identifier_column() {
        let mut table = IndexedTable::new();
        let result = table.ingest_reader("a,b\n1,2\n".as_bytes(), "id", 0);
        assert!(matches!(result, Err(TableError::MissingIdentifierColumn(_))));
    }

    #[test]
    fn test_empty_source_and_second_ingest() {
        let mut table = IndexedTable::new();
        table.ingest_reader("".as_bytes(), "id", 2).unwrap();
        assert_eq!(table.row_count(), 0);

        let mut table = points();
        assert!(matches!(
            table.ingest_reader(POINTS.as_bytes(), "API Address", 1),
            Err(TableError::AlreadyIngested)
        ));
    }

    #[test]
    fn test_blank_title_lines_are_skipped_rows() {
        let csv = "Inverter register map\n\nAPI Address,Name\n1000,Serial number\n\n1001,Battery SOC\n";
        let mut table = IndexedTable::new();
        table.ingest_reader(csv.as_bytes(), "API Address", 2).unwrap();

        assert_eq!(table.column_keys(), &["API Address", "Name"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.get_cell(1001, "Name").unwrap(),
            &CellValue::Text("Battery SOC".to_string())
        );
    }

    #[test]
    fn test_text_identifiers() {
        let csv = "key,value\nalpha,1\nbeta,2\n";
        let mut table = IndexedTable::new();
        table.ingest_reader(csv.as_bytes(), "key", 0).unwrap();
        assert_eq!(
            table.get_cell("beta", "value").unwrap(),
            &CellValue::Integer(2)
        );
        assert_eq!(table.row("alpha").map(|row| row.len()), Some(2));
    }
}
