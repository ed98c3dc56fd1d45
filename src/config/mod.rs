// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the Modbus gateway
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings for the gateway and its polling driver. The
//! configuration is backed by a YAML file and validated against a JSON schema
//! for robustness.
//!
//! ## Configuration Structure
//!
//! - `modbus`: Settings for the Modbus TCP server exposed to clients
//! - `serial`: Settings for the Modbus RTU link to the physical device
//! - `address_space`: Register ranges and initial cache content
//! - `address_map`: Location of the CSV address map
//! - `poller`: Settings for the polling driver
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_gateway::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("0.0.0.0".to_string()),      // Modbus address
//!     Some(502),                        // Modbus port
//!     Some("/dev/ttyUSB1".to_string()), // Serial port
//!     false,                            // Disable serial link
//!     None,                             // Address map
//! );
//!
//! println!("Gateway port: {}", config.modbus.port);
//! ```

pub mod address_map;
pub mod address_space;
pub mod modbus;
pub mod poller;
pub mod serial;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use address_map::AddressMapConfig;
pub use address_space::AddressSpaceConfig;
pub use modbus::ModbusConfig;
pub use poller::PollerConfig;
pub use serial::{ParitySetting, SerialConfig};
pub use utils::{is_valid_ip_address, output_config_schema, validate_specific_rules};

/// Embedded JSON schema used to validate configuration files
pub(crate) const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration structure for the gateway.
///
/// Each section uses default values when not explicitly specified in the
/// configuration file, allowing for minimal configuration files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settings for the Modbus TCP server.
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// Settings for the serial link to the device.
    ///
    /// When the link is disabled the gateway runs offline and answers every
    /// request from its register cache.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Register ranges of the device.
    #[serde(default)]
    pub address_space: AddressSpaceConfig,

    /// CSV address map location.
    #[serde(default)]
    pub address_map: AddressMapConfig,

    /// Polling driver settings.
    #[serde(default)]
    pub poller: PollerConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Creating sample configuration file at {:?}", sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file failing schema
    /// validation, deserialization or the additional rules of
    /// [`validate_specific_rules`] produces an error and a `*.sample.yaml`
    /// file with defaults next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only arguments that were actually provided override the loaded values.
    ///
    /// # Parameters
    ///
    /// * `modbus_address` - Network address for the Modbus TCP server
    /// * `modbus_port` - TCP port for the Modbus TCP server
    /// * `serial_port` - Serial device path; also enables the serial link
    /// * `no_serial` - Run offline, without a device client
    /// * `address_map` - Path of the CSV address map
    pub fn apply_args(
        &mut self,
        modbus_address: Option<String>,
        modbus_port: Option<u16>,
        serial_port: Option<String>,
        no_serial: bool,
        address_map: Option<PathBuf>,
    ) {
        if let Some(address) = modbus_address {
            debug!("Overriding Modbus address from command line: {}", address);
            self.modbus.address = address;
        }
        if let Some(port) = modbus_port {
            debug!("Overriding Modbus port from command line: {}", port);
            self.modbus.port = port;
        }

        if let Some(port) = serial_port {
            debug!("Overriding serial port from command line: {}", port);
            self.serial.port = port;
            self.serial.enabled = true;
        }
        if no_serial {
            debug!("Serial link disabled from command line");
            self.serial.enabled = false;
        }

        if let Some(path) = address_map {
            debug!("Overriding address map from command line: {:?}", path);
            self.address_map.path = path;
        }
    }
}
