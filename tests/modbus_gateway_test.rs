// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the Modbus gateway
//!
//! These tests launch the gateway daemon on an ephemeral port and talk to it
//! with a regular Modbus TCP client, either offline (cache only) or in front
//! of an in-memory device.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use tokio_modbus::prelude::*;

use rust_modbus_gateway::config::Config;
use rust_modbus_gateway::daemon::Daemon;
use rust_modbus_gateway::modbus::{DeviceClient, DeviceOperation, MockDeviceClient};

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.modbus.address = "127.0.0.1".to_string();
    config.modbus.port = 0;
    config.address_map.path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/points.csv");
    config
}

/// Inverter with its serial number, battery SOC and grid power registers
fn inverter() -> Arc<MockDeviceClient> {
    Arc::new(
        MockDeviceClient::new()
            .with_registers(3, &[0x4142])
            .with_registers(184, &[87, 1500]),
    )
}

async fn start_gateway(
    device: Option<Arc<MockDeviceClient>>,
) -> Result<(Daemon, SocketAddr), Box<dyn std::error::Error>> {
    setup();
    let device = device.map(|device| device as Arc<dyn DeviceClient>);
    let mut daemon = Daemon::new();
    daemon.launch_with_device(&test_config(), device).await?;
    let socket_addr = daemon
        .modbus_address()
        .ok_or("Modbus server did not report its address")?;
    Ok((daemon, socket_addr))
}

#[tokio::test]
async fn test_offline_gateway_serves_cache() -> Result<(), Box<dyn std::error::Error>> {
    let (daemon, socket_addr) = start_gateway(None).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // Input registers are seeded with their own address
    let data = ctx.read_input_registers(10, 3).await??;
    assert_eq!(data, vec![10, 11, 12]);

    // Holding registers start at zero and keep what is written
    assert_eq!(ctx.read_holding_registers(100, 1).await??, vec![0]);
    ctx.write_single_register(100, 7).await??;
    assert_eq!(ctx.read_holding_registers(100, 1).await??, vec![7]);

    ctx.write_multiple_registers(200, &[101, 202, 303]).await??;
    assert_eq!(ctx.read_holding_registers(200, 3).await??, vec![101, 202, 303]);

    ctx.disconnect().await?;
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_offline_gateway_rejects_uninitialized_spans() -> Result<(), Box<dyn std::error::Error>> {
    let (daemon, socket_addr) = start_gateway(None).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // Input seeds cover 0-59 and 500-2000
    assert_eq!(
        ctx.read_input_registers(1995, 10).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(
        ctx.read_input_registers(58, 3).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    // Holding seeds do not cover 0-59
    assert_eq!(
        ctx.write_single_register(5, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(
        ctx.read_coils(0, 1).await?,
        Err(ExceptionCode::IllegalFunction)
    );

    ctx.disconnect().await?;
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_reads_are_translated_to_device() -> Result<(), Box<dyn std::error::Error>> {
    let device = inverter();
    let (daemon, socket_addr) = start_gateway(Some(device.clone())).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    assert_eq!(ctx.read_input_registers(1001, 2).await??, vec![87, 1500]);
    assert_eq!(ctx.read_holding_registers(1000, 1).await??, vec![0x4142]);
    assert_eq!(
        device.operations(),
        vec![
            DeviceOperation::Read {
                address: 184,
                count: 2
            },
            DeviceOperation::Read {
                address: 3,
                count: 1
            },
        ]
    );

    ctx.disconnect().await?;
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_hardware_write_leaves_cache_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let device = inverter();
    let (daemon, socket_addr) = start_gateway(Some(device.clone())).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_single_register(1000, 9).await??;
    assert_eq!(device.register(3), Some(9));

    let holding = daemon.service().ok_or("gateway not launched")?.holding().clone();
    assert_eq!(holding.cached(1000), None);

    // The next read goes back to the device
    assert_eq!(ctx.read_holding_registers(1000, 1).await??, vec![9]);
    assert_eq!(
        device.operations(),
        vec![
            DeviceOperation::Write {
                address: 3,
                values: vec![9]
            },
            DeviceOperation::Read {
                address: 3,
                count: 1
            },
        ]
    );

    ctx.disconnect().await?;
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_unmapped_addresses_never_reach_device() -> Result<(), Box<dyn std::error::Error>> {
    let device = inverter();
    let (daemon, socket_addr) = start_gateway(Some(device.clone())).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    // Component 0 and component 2 have no mapping
    assert_eq!(
        ctx.read_holding_registers(100, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(
        ctx.write_single_register(2001, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    // Missing row, and a row without physical address
    assert_eq!(
        ctx.read_input_registers(1004, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert_eq!(
        ctx.read_input_registers(1003, 1).await?,
        Err(ExceptionCode::IllegalDataAddress)
    );
    assert!(device.operations().is_empty());

    ctx.disconnect().await?;
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_virtual_registers_stay_local() -> Result<(), Box<dyn std::error::Error>> {
    let device = inverter();
    let (daemon, socket_addr) = start_gateway(Some(device.clone())).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    ctx.write_multiple_registers(30000, &[1, 2, 3]).await??;
    assert_eq!(ctx.read_holding_registers(30000, 3).await??, vec![1, 2, 3]);
    assert!(device.operations().is_empty());

    ctx.disconnect().await?;
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_device_failure_is_server_failure() -> Result<(), Box<dyn std::error::Error>> {
    let device = inverter();
    let (daemon, socket_addr) = start_gateway(Some(device.clone())).await?;
    let mut ctx = tcp::connect(socket_addr).await?;

    device.set_failing(true);
    assert_eq!(
        ctx.read_input_registers(1001, 1).await?,
        Err(ExceptionCode::ServerDeviceFailure)
    );

    // The connection survives a failed request
    device.set_failing(false);
    assert_eq!(ctx.read_input_registers(1001, 1).await??, vec![87]);

    ctx.disconnect().await?;
    daemon.shutdown();
    daemon.join().await?;
    Ok(())
}

#[tokio::test]
async fn test_device_is_closed_on_join() -> Result<(), Box<dyn std::error::Error>> {
    let device = inverter();
    let (daemon, _socket_addr) = start_gateway(Some(device.clone())).await?;

    assert!(!device.is_closed());
    daemon.shutdown();
    daemon.join().await?;
    assert!(device.is_closed());
    Ok(())
}

#[tokio::test]
async fn test_missing_address_map_is_fatal() {
    setup();
    let mut config = test_config();
    config.address_map.path = PathBuf::from("/nonexistent/points.csv");

    let mut daemon = Daemon::new();
    let result = daemon.launch_with_device(&config, None).await;
    assert!(result.is_err());
    assert!(daemon.modbus_address().is_none());
}
