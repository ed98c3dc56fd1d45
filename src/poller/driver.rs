// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Polling driver
//!
//! Periodically reads the configured registers from a Modbus TCP server,
//! decodes them and hands each cycle to a [`MeasurementSink`].
//!
//! Each register is read on its own with a timeout. A register that cannot be
//! read or decoded is recorded as `0` with a warning and the cycle goes on.
//! After a timeout the connection is replaced, since the server may still
//! answer the abandoned request.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;

use super::codec::{DecodedValue, ScaleFactor, ValueCodec};
use super::sink::{Measurement, MeasurementSink};
use crate::address::AddressClassifier;
use crate::config::PollerConfig;
use crate::modbus::DeviceError;

/// Granularity of the shutdown check while waiting for the next cycle
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Description of one polled register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSpec {
    /// Name of the measurement
    pub key: String,
    /// Access mode as documented by the device, e.g. `R` or `RW`
    pub mode: String,
    pub scale: ScaleFactor,
    pub unit: String,
    /// Type tag understood by [`ValueCodec`]
    #[serde(rename = "type")]
    pub type_tag: String,
}

/// Source of register words for the polling driver
#[async_trait]
pub trait RegisterReader: Send {
    async fn read_input_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, DeviceError>;

    async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, DeviceError>;

    /// Drop the current connection and open a new one
    async fn reconnect(&mut self) -> Result<(), DeviceError>;
}

/// [`RegisterReader`] over a Modbus TCP connection
pub struct TcpRegisterReader {
    address: SocketAddr,
    slave: Slave,
    context: Option<Context>,
}

impl TcpRegisterReader {
    pub async fn connect(address: SocketAddr, slave_id: u8) -> std::io::Result<Self> {
        let context = tcp::connect_slave(address, Slave(slave_id)).await?;
        info!("Connected to Modbus server at {}", address);
        Ok(Self {
            address,
            slave: Slave(slave_id),
            context: Some(context),
        })
    }

    /// Current connection, opening a new one if the last was dropped
    async fn context(&mut self) -> Result<&mut Context, DeviceError> {
        if self.context.is_none() {
            let context = tcp::connect_slave(self.address, self.slave)
                .await
                .map_err(|e| DeviceError::Transport(e.to_string()))?;
            info!("Reconnected to Modbus server at {}", self.address);
            self.context = Some(context);
        }
        self.context.as_mut().ok_or(DeviceError::Disconnected)
    }
}

fn flatten(result: tokio_modbus::Result<Vec<u16>>) -> Result<Vec<u16>, DeviceError> {
    match result {
        Ok(Ok(words)) => Ok(words),
        Ok(Err(code)) => Err(DeviceError::Exception(code)),
        Err(err) => Err(DeviceError::Transport(err.to_string())),
    }
}

#[async_trait]
impl RegisterReader for TcpRegisterReader {
    async fn read_input_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, DeviceError> {
        let context = self.context().await?;
        flatten(context.read_input_registers(address, count).await)
    }

    async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, DeviceError> {
        let context = self.context().await?;
        flatten(context.read_holding_registers(address, count).await)
    }

    async fn reconnect(&mut self) -> Result<(), DeviceError> {
        self.context = None;
        self.context().await.map(|_| ())
    }
}

/// Periodic reader of a register list
pub struct PollingDriver<R: RegisterReader> {
    reader: R,
    sink: Box<dyn MeasurementSink + Send>,
    classifier: AddressClassifier,
    registers: BTreeMap<u16, RegisterSpec>,
    device_id: String,
    asset_id: String,
    interval: Duration,
    timeout: Duration,
}

impl<R: RegisterReader> PollingDriver<R> {
    /// Create a driver for the registers of `config`
    ///
    /// The classifier decides which function code reads each register:
    /// read-write registers are holding registers, everything else is read
    /// as input registers.
    pub fn new(
        reader: R,
        sink: Box<dyn MeasurementSink + Send>,
        classifier: AddressClassifier,
        config: &PollerConfig,
    ) -> Self {
        Self {
            reader,
            sink,
            classifier,
            registers: config.registers.clone(),
            device_id: config.device_id.clone(),
            asset_id: config.asset_id.clone(),
            interval: Duration::from_secs(config.interval_secs),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    async fn read_word(&mut self, address: u16) -> Result<u16, DeviceError> {
        let timeout = self.timeout;
        let read = if self.classifier.is_read_write(address) {
            self.reader.read_holding_registers(address, 1)
        } else {
            self.reader.read_input_registers(address, 1)
        };
        let outcome = time::timeout(timeout, read).await;
        let words = match outcome {
            Ok(result) => result?,
            Err(_) => {
                debug!("Register {} timed out, replacing the connection", address);
                if let Err(err) = self.reader.reconnect().await {
                    warn!("Reconnecting after a timeout failed: {}", err);
                }
                return Err(DeviceError::Timeout(timeout));
            }
        };
        words
            .first()
            .copied()
            .ok_or_else(|| DeviceError::Transport("empty response".to_string()))
    }

    /// Read and decode every configured register once
    pub async fn poll_once(&mut self, now: DateTime<Local>) -> Vec<Measurement> {
        let addresses: Vec<u16> = self.registers.keys().copied().collect();
        let mut batch = Vec::with_capacity(addresses.len());

        for address in addresses {
            let word = self.read_word(address).await;
            let Some(spec) = self.registers.get(&address) else {
                continue;
            };
            let value = match word {
                Ok(word) => ValueCodec::decode_or_unknown(word, &spec.type_tag, &spec.scale),
                Err(err) => {
                    warn!("Reading register {} ({}) failed: {}", address, spec.key, err);
                    DecodedValue::unknown()
                }
            };
            debug!("Register {} ({}) = {}", address, spec.key, value);

            batch.push(Measurement {
                timestamp: now,
                key: spec.key.clone(),
                mode: spec.mode.clone(),
                scale: spec.scale.clone(),
                value,
                unit: spec.unit.clone(),
                device_id: self.device_id.clone(),
                asset_id: self.asset_id.clone(),
            });
        }
        batch
    }

    /// Run one polling cycle and hand it to the sink
    ///
    /// Returns the number of stored measurements.
    pub async fn poll_and_store(&mut self, now: DateTime<Local>) -> anyhow::Result<usize> {
        let batch = self.poll_once(now).await;
        self.sink
            .store(&batch)
            .with_context(|| format!("Failed to store {} measurements", batch.len()))?;
        Ok(batch.len())
    }

    /// Poll until `running` is cleared
    ///
    /// A cycle starts every `interval`; a cycle that overruns it is followed
    /// immediately by the next one.
    pub async fn run(&mut self, running: Arc<AtomicBool>) {
        info!(
            "Polling {} registers every {:?}",
            self.registers.len(),
            self.interval
        );
        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            if let Err(err) = self.poll_and_store(Local::now()).await {
                error!("Polling cycle lost: {:#}", err);
            }

            let deadline = started + self.interval;
            while running.load(Ordering::SeqCst) && Instant::now() < deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                time::sleep(STOP_POLL_INTERVAL.min(remaining)).await;
            }
        }
        info!("Polling driver stopped");
    }
}
