// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{Config, CONFIG_SCHEMA};
use crate::poller::DecodeType;

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// ### Example
///
/// ```bash
/// ./rust_modbus_gateway --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// ### Validation Rules
///
/// - **Addresses**: the Modbus server and poller target must be IP addresses
/// - **Ports**: TCP ports must be within 1-65534
/// - **Address space**: ranges must not be inverted and the virtual range must not
///   overlap the read-write range; cache seeds must not be inverted
/// - **Serial link**: when enabled, the port must be named, data bits within 5-8,
///   stop bits 1 or 2 and the unit identifier within 1-247
/// - **Address map**: the CSV path and identifier column must not be empty
/// - **Poller**: the interval must be at least one second
///
/// Unknown register type tags in the poller section are reported as warnings only:
/// those registers decode to `0` at run time.
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if !is_valid_ip_address(&config.modbus.address) {
        anyhow::bail!("Invalid Modbus server address: {}", config.modbus.address);
    }
    if config.modbus.port < 1 || config.modbus.port > 65534 {
        anyhow::bail!("Invalid Modbus port number: {}", config.modbus.port);
    }

    config
        .address_space
        .classifier()
        .context("Invalid address space")?;
    for seed in config
        .address_space
        .input_seed
        .iter()
        .chain(config.address_space.holding_seed.iter())
    {
        if seed.range.is_inverted() {
            anyhow::bail!("Cache seed range {} is inverted", seed.range);
        }
    }

    let serial = &config.serial;
    if serial.enabled {
        if serial.port.trim().is_empty() {
            anyhow::bail!("Serial link enabled without a port");
        }
        if !(5..=8).contains(&serial.data_bits) {
            anyhow::bail!("Invalid number of data bits: {}", serial.data_bits);
        }
        if !matches!(serial.stop_bits, 1 | 2) {
            anyhow::bail!("Invalid number of stop bits: {}", serial.stop_bits);
        }
        if !(1..=247).contains(&serial.slave_id) {
            anyhow::bail!("Invalid Modbus unit identifier: {}", serial.slave_id);
        }
    }

    if config.address_map.path.as_os_str().is_empty() {
        anyhow::bail!("Address map path is empty");
    }
    if config.address_map.id_column.is_empty() {
        anyhow::bail!("Address map identifier column is empty");
    }

    let poller = &config.poller;
    if !is_valid_ip_address(&poller.server_address) {
        anyhow::bail!("Invalid poller server address: {}", poller.server_address);
    }
    if poller.server_port < 1 || poller.server_port > 65534 {
        anyhow::bail!("Invalid poller port number: {}", poller.server_port);
    }
    if poller.interval_secs == 0 {
        anyhow::bail!("Polling interval must be at least one second");
    }
    for (address, spec) in &poller.registers {
        if spec.type_tag.parse::<DecodeType>().is_err() {
            warn!(
                "Register {} ({}) uses unsupported type '{}', it will read as 0",
                address, spec.key, spec.type_tag
            );
        }
    }

    Ok(())
}
