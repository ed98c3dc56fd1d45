// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_modbus_gateway::config::Config;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::tempdir;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

/// Loading must fail and leave a loadable sample next to the file
fn assert_rejected_with_sample(contents: &str) -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents)?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err(), "Config loading should have failed");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(
        Path::new(&sample_path).exists(),
        "Sample config file was not created"
    );

    let sample_config = Config::from_file(&sample_path)?;
    assert_eq!(sample_config.modbus.port, 5020);
    Ok(())
}

#[test]
fn test_schema_error_creates_sample_file() -> Result<()> {
    assert_rejected_with_sample(
        r#"
modbus:
  enabled: "yes"
  port: "not-an-integer"
  address: 12345
"#,
    )
}

#[test]
fn test_port_out_of_range_creates_sample_file() -> Result<()> {
    assert_rejected_with_sample(
        r#"
modbus:
  enabled: true
  port: 99999
  address: "127.0.0.1"
"#,
    )
}

#[test]
fn test_unknown_section_is_rejected() -> Result<()> {
    assert_rejected_with_sample(
        r#"
visualization:
  port: 8080
"#,
    )
}

#[test]
fn test_overlapping_ranges_create_sample_file() -> Result<()> {
    assert_rejected_with_sample(
        r#"
address_space:
  virtual_range: { start: 100, end: 40000 }
  read_write_range: { start: 60, end: 499 }
"#,
    )
}

#[test]
fn test_invalid_serial_settings_create_sample_file() -> Result<()> {
    assert_rejected_with_sample(
        r#"
serial:
  enabled: true
  port: "/dev/ttyUSB0"
  baud_rate: 9600
  slave_id: 0
"#,
    )
}

#[test]
fn test_invalid_address_is_rejected() -> Result<()> {
    assert_rejected_with_sample(
        r#"
modbus:
  enabled: true
  port: 502
  address: "gateway.local"
"#,
    )
}
