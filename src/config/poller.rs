// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Polling driver configuration
//!
//! The poller is a Modbus TCP client that periodically reads a list of
//! registers from the gateway, decodes them and hands the typed values to a
//! measurement sink.
//!
//! ## Example
//!
//! ```yaml
//! poller:
//!   server_address: 127.0.0.1
//!   server_port: 5020
//!   slave_id: 1
//!   interval_secs: 60
//!   device_id: inverter-01
//!   asset_id: site-a
//!   output: measurements.jsonl
//!   registers:
//!     59: { key: running_state, mode: R, scale: 1, unit: "-", type: U16 }
//!     90: { key: battery_temperature, mode: R, scale: 0.1, unit: "C", type: S16 }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::poller::RegisterSpec;

/// Configuration of the polling driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Address of the Modbus TCP server to poll.
    pub server_address: String,

    pub server_port: u16,

    /// Unit identifier sent with every request.
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,

    /// Seconds between the start of two polling cycles.
    pub interval_secs: u64,

    /// Per-register read timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Identifier of the polled device, copied into every measurement.
    #[serde(default)]
    pub device_id: String,

    /// Identifier of the asset the device belongs to.
    #[serde(default)]
    pub asset_id: String,

    /// JSON-lines file receiving the measurements. Measurements are only
    /// logged when absent.
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Registers to read, keyed by address.
    #[serde(default)]
    pub registers: BTreeMap<u16, RegisterSpec>,
}

fn default_slave_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 5020,
            slave_id: default_slave_id(),
            interval_secs: 60,
            timeout_ms: default_timeout_ms(),
            device_id: String::new(),
            asset_id: String::new(),
            output: None,
            registers: BTreeMap::new(),
        }
    }
}
