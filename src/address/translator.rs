// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Logical to physical address translation
//!
//! Logical addresses carry a component identifier in their thousands digit:
//! `1042` is offset 42 of component 1. Component 1 is the inverter, whose
//! physical register numbers are looked up in the address map under the
//! `Component Address` column. Other components have no mapping yet.

use log::debug;
use thiserror::Error;

use crate::table::{CellValue, IndexedTable, TableError};

/// Divisor extracting the component identifier from a logical address
pub const COMPONENT_DIVISOR: u16 = 1000;

/// The only component whose addresses are currently mapped
pub const INVERTER_COMPONENT: u16 = 1;

/// Address map column holding the physical register number
pub const PHYSICAL_ADDRESS_COLUMN: &str = "Component Address";

/// Why a logical address could not be translated
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("No component for address {address} (component {component})")]
    NoComponent { address: u16, component: u16 },

    #[error("Address map entry for {address} holds {value}, which is not a register number")]
    InvalidPhysicalAddress { address: u16, value: CellValue },

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Translates logical gateway addresses through an [`IndexedTable`]
#[derive(Debug, Clone)]
pub struct AddressTranslator {
    table: IndexedTable,
}

impl AddressTranslator {
    pub fn new(table: IndexedTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &IndexedTable {
        &self.table
    }

    /// Component identifier of a logical address
    pub fn component(logical_address: u16) -> u16 {
        logical_address / COMPONENT_DIVISOR
    }

    /// Resolve the physical address of `logical_address`
    ///
    /// Row and column misses from the table are propagated unchanged. An address
    /// outside a mapped component, or a map cell that is not a valid 16-bit
    /// register number, is a routing failure and must never reach the device.
    pub fn translate(&self, logical_address: u16) -> Result<u16, TranslationError> {
        let component = Self::component(logical_address);
        if component != INVERTER_COMPONENT {
            return Err(TranslationError::NoComponent {
                address: logical_address,
                component,
            });
        }

        let cell = self.table.get_cell(logical_address, PHYSICAL_ADDRESS_COLUMN)?;
        let physical = cell
            .as_integer()
            .and_then(|value| u16::try_from(value).ok())
            .ok_or_else(|| TranslationError::InvalidPhysicalAddress {
                address: logical_address,
                value: cell.clone(),
            })?;

        debug!("Mapped logical address {} to physical address {}", logical_address, physical);
        Ok(physical)
    }
}
