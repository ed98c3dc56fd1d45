// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Address map (CSV) configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::table::{IndexedTable, TableError};

/// Location and layout of the CSV address map.
///
/// The map is loaded once at startup; a missing file or a duplicated
/// identifier prevents the gateway from starting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressMapConfig {
    /// Path of the CSV file.
    pub path: PathBuf,

    /// Column holding the logical (TCP-facing) address of each row.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Number of title rows preceding the column-name row.
    #[serde(default = "default_header_rows")]
    pub header_rows: usize,
}

fn default_id_column() -> String {
    "API Address".to_string()
}

fn default_header_rows() -> usize {
    1
}

impl AddressMapConfig {
    /// Ingest the configured CSV file
    pub fn load(&self) -> Result<IndexedTable, TableError> {
        IndexedTable::from_path(&self.path, &self.id_column, self.header_rows)
    }
}

impl Default for AddressMapConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("points.csv"),
            id_column: default_id_column(),
            header_rows: default_header_rows(),
        }
    }
}
