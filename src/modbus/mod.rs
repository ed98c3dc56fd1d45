// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus gateway core
//!
//! This module bridges Modbus TCP clients to a single serial-attached device
//! speaking Modbus RTU.
//!
//! ## Key Components
//!
//! - [`RegisterDatastore`]: one register bank, routing every access either to
//!   its in-memory cache or, through the address map, to the device
//! - [`DeviceClient`]: register-level access to the physical device, with the
//!   serial [`RtuDeviceClient`] and the in-memory [`MockDeviceClient`]
//! - [`GatewayService`]: the Modbus TCP service dispatching requests to the
//!   input and holding banks
//!
//! ## Routing
//!
//! - Virtual addresses (by default 30000-32000) always stay in the cache
//! - Without a device client every address is served from the cache
//! - Any other address is translated to a physical address and forwarded
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_gateway::config::Config;
//! use rust_modbus_gateway::daemon::launch_daemon::Daemon;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let mut daemon = Daemon::new();
//! daemon.launch(&config).await?;
//! daemon.shutdown();
//! daemon.join().await?;
//! # Ok(())
//! # }
//! ```

pub mod datastore;
pub mod device;
pub mod error;
pub mod gateway_server;
pub mod mock_device;

pub use datastore::{CacheSeed, RegisterBank, RegisterDatastore, SeedFill};
pub use device::{DeviceClient, RtuDeviceClient};
pub use error::{DeviceError, RegisterError};
pub use gateway_server::{run_gateway_server, GatewayService};
pub use mock_device::{DeviceOperation, MockDeviceClient};
