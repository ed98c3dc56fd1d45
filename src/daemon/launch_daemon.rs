// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! This module runs the gateway services as background tasks:
//!
//! - Modbus TCP server fronting the register banks
//! - System health monitoring (heartbeat)
//!
//! The daemon owns the device client. On shutdown the TCP server is stopped
//! first and the device client is closed last, once no request can reach it.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_gateway::{config::Config, daemon::launch_daemon::Daemon};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(&config).await?;
//!
//!     // Later, trigger a graceful shutdown
//!     daemon.shutdown();
//!     daemon.join().await?;
//!
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time;

use crate::address::AddressTranslator;
use crate::config::Config;
use crate::modbus::{
    run_gateway_server, DeviceClient, GatewayService, RegisterBank, RegisterDatastore,
    RtuDeviceClient,
};

/// Interval at which background tasks check the `running` flag
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Heartbeat ticks between two heartbeat log lines
const HEARTBEAT_LOG_TICKS: u64 = 60;

/// Maximum time granted to a task to finish after shutdown
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Task manager of the gateway
///
/// # Fields
///
/// * `tasks` - Handles of the running tasks, awaited by [`Daemon::join`]
/// * `running` - Flag shared with every task to coordinate shutdown
/// * `device` - Device client shared by both register banks, if any
/// * `modbus_address` - Address the Modbus TCP server is bound to
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    device: Option<Arc<dyn DeviceClient>>,
    service: Option<GatewayService>,
    modbus_address: Option<SocketAddr>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            device: None,
            service: None,
            modbus_address: None,
        }
    }

    /// Launch the gateway according to `config`
    ///
    /// Opens the serial device when `config.serial.enabled` is set, then
    /// continues with [`Daemon::launch_with_device`].
    ///
    /// # Errors
    ///
    /// * The serial port cannot be opened
    /// * Any error of [`Daemon::launch_with_device`]
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let device: Option<Arc<dyn DeviceClient>> = if config.serial.enabled {
            let client = RtuDeviceClient::open(&config.serial)
                .with_context(|| format!("Failed to open serial device {}", config.serial.port))?;
            Some(Arc::new(client))
        } else {
            info!("Serial link disabled, serving every register from the cache");
            None
        };
        self.launch_with_device(config, device).await
    }

    /// Launch the gateway with an explicit device client
    ///
    /// Loads the address map, builds both register banks around `device` and
    /// starts the Modbus TCP server and the heartbeat.
    ///
    /// # Errors
    ///
    /// * The address map cannot be loaded; the gateway never serves with a
    ///   partially loaded map
    /// * The address space configuration is invalid
    /// * The Modbus TCP server cannot bind its address
    pub async fn launch_with_device(
        &mut self,
        config: &Config,
        device: Option<Arc<dyn DeviceClient>>,
    ) -> Result<()> {
        let table = config.address_map.load().with_context(|| {
            format!(
                "Failed to load address map from {:?}",
                config.address_map.path
            )
        })?;
        info!(
            "Loaded address map {:?}: {} rows",
            config.address_map.path,
            table.row_count()
        );

        let classifier = Arc::new(
            config
                .address_space
                .classifier()
                .context("Invalid address space")?,
        );
        let translator = Arc::new(AddressTranslator::new(table));

        let input = RegisterDatastore::new(
            RegisterBank::Input,
            classifier.clone(),
            translator.clone(),
            device.clone(),
        )
        .with_seeds(&config.address_space.input_seed);
        let holding = RegisterDatastore::new(
            RegisterBank::Holding,
            classifier,
            translator,
            device.clone(),
        )
        .with_seeds(&config.address_space.holding_seed);

        let service = GatewayService::new(Arc::new(input), Arc::new(holding));
        self.device = device;
        self.service = Some(service.clone());

        if config.modbus.enabled {
            self.start_modbus_server(config, service).await?;
        }

        self.start_heartbeat()?;

        Ok(())
    }

    /// Bind the Modbus TCP listener and spawn the server task
    ///
    /// The server runs until the `running` flag is cleared, then it is aborted.
    async fn start_modbus_server(&mut self, config: &Config, service: GatewayService) -> Result<()> {
        info!(
            "Starting modbus server on {}:{}",
            config.modbus.address, config.modbus.port
        );
        let listener = TcpListener::bind((config.modbus.address.as_str(), config.modbus.port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind Modbus server to {}:{}",
                    config.modbus.address, config.modbus.port
                )
            })?;
        self.modbus_address = listener.local_addr().ok();

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let mut server_handle = tokio::spawn(async move {
                if let Err(e) = run_gateway_server(listener, service).await {
                    error!("Modbus server error: {}", e);
                }
            });

            while running.load(Ordering::SeqCst) && !server_handle.is_finished() {
                time::sleep(STOP_CHECK_INTERVAL).await;
            }

            info!("Shutting down Modbus server...");
            server_handle.abort();
            match time::timeout(JOIN_TIMEOUT, &mut server_handle).await {
                Ok(_) => info!("Modbus server shut down successfully"),
                Err(_) => warn!("Modbus server shutdown timed out, forcing termination"),
            }
            Ok(())
        });

        self.tasks.push(task);
        info!("Modbus server started");
        Ok(())
    }

    /// Start a heartbeat task that logs system status periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        info!("Starting heartbeat monitor");

        let running = self.running.clone();
        let task = tokio::spawn(async move {
            let mut ticks: u64 = 0;
            while running.load(Ordering::SeqCst) {
                if ticks % HEARTBEAT_LOG_TICKS == 0 {
                    debug!("Daemon heartbeat: running");
                }
                ticks = ticks.wrapping_add(1);
                time::sleep(Duration::from_secs(1)).await;
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Address the Modbus TCP server is bound to, once launched
    pub fn modbus_address(&self) -> Option<SocketAddr> {
        self.modbus_address
    }

    /// Service answering Modbus requests, once launched
    pub fn service(&self) -> Option<&GatewayService> {
        self.service.as_ref()
    }

    /// Signal every task to stop
    ///
    /// This method does not wait for the tasks; call [`Daemon::join`] afterwards.
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for every task, then close the device client
    ///
    /// Task panics and tasks exceeding the join timeout are logged, not returned.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(JOIN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => error!("Task failed: {:#}", e),
                Ok(Err(e)) => error!("Task panicked: {}", e),
                Err(_) => warn!("Task did not complete within timeout period, may be hung"),
            }
        }

        if let Some(device) = self.device {
            info!("Closing device client");
            device
                .close()
                .await
                .context("Failed to close device client")?;
        }
        Ok(())
    }
}
