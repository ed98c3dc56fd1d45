// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Serial (Modbus RTU) link configuration
//!
//! Describes how the gateway reaches the physical device. When `enabled` is
//! false no device client is created and every register bank answers from its
//! in-memory cache.

use serde::{Deserialize, Serialize};

/// Parity setting of the serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParitySetting {
    None,
    Even,
    Odd,
}

/// Configuration of the RTU serial link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Open the serial port at startup.
    pub enabled: bool,

    /// Serial device path, e.g. `/dev/ttyUSB0`.
    pub port: String,

    pub baud_rate: u32,

    /// Data bits per character (5 to 8).
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    #[serde(default = "default_parity")]
    pub parity: ParitySetting,

    /// Stop bits (1 or 2).
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    /// Modbus unit identifier of the device on the bus.
    pub slave_id: u8,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> ParitySetting {
    ParitySetting::None
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            slave_id: 1,
            timeout_ms: default_timeout_ms(),
        }
    }
}
