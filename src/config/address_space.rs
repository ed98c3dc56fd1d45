// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register address space configuration
//!
//! The defaults follow section 5 of the Sol-Ark Modbus documentation:
//!
//! | Range | Access |
//! |-------|--------|
//! | 0 - 59 | read only (function 0x03) |
//! | 60 - 499 | read and write (function 0x10) |
//! | 500 - 2000 | read only (function 0x03) |
//! | 10000 - 10069 | Deye battery block, reserved |
//! | 30000 - 32000 | virtual registers |
//!
//! The cache seeds reproduce the initial content of the two register banks
//! when no device is attached: input registers hold their own address,
//! holding registers hold zero.

use serde::{Deserialize, Serialize};

use crate::address::{AddressClassifier, AddressSpaceError, RegisterRange};
use crate::modbus::datastore::{CacheSeed, SeedFill};

/// Address ranges and initial cache content of the register banks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressSpaceConfig {
    /// Software-defined registers, never forwarded to the device.
    pub virtual_range: RegisterRange,

    /// Holding registers, forwarded for reads and writes.
    pub read_write_range: RegisterRange,

    /// Reserved device-specific block. Kept for documentation, it does not
    /// alter routing.
    #[serde(default)]
    pub device_extension_range: Option<RegisterRange>,

    /// Initial cache content of the input register bank.
    #[serde(default)]
    pub input_seed: Vec<CacheSeed>,

    /// Initial cache content of the holding register bank.
    #[serde(default)]
    pub holding_seed: Vec<CacheSeed>,
}

impl AddressSpaceConfig {
    /// Build the classifier described by this section
    pub fn classifier(&self) -> Result<AddressClassifier, AddressSpaceError> {
        AddressClassifier::new(
            self.virtual_range,
            self.read_write_range,
            self.device_extension_range,
        )
    }
}

impl Default for AddressSpaceConfig {
    fn default() -> Self {
        Self {
            virtual_range: RegisterRange::new(30000, 32000),
            read_write_range: RegisterRange::new(60, 499),
            device_extension_range: Some(RegisterRange::new(10000, 10069)),
            input_seed: vec![
                CacheSeed::new(RegisterRange::new(0, 59), SeedFill::Address),
                CacheSeed::new(RegisterRange::new(500, 2000), SeedFill::Address),
            ],
            holding_seed: vec![
                CacheSeed::new(RegisterRange::new(60, 499), SeedFill::Zero),
                CacheSeed::new(RegisterRange::new(10000, 10069), SeedFill::Zero),
                CacheSeed::new(RegisterRange::new(30000, 32000), SeedFill::Zero),
            ],
        }
    }
}
