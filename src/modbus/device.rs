// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Physical device client
//!
//! The gateway reaches the inverter over a Modbus RTU serial link. Both
//! register banks share one [`DeviceClient`]; the RTU implementation keeps the
//! client context behind an async mutex so that at most one frame is on the
//! wire at a time.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_modbus::client::{rtu, Context};
use tokio_modbus::prelude::*;
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};

use super::error::DeviceError;
use crate::config::{ParitySetting, SerialConfig};

/// Register-level access to the physical device
///
/// Addresses passed to a device client are physical register numbers.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Read `count` holding registers starting at `address`
    async fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, DeviceError>;

    /// Write `values` to consecutive holding registers starting at `address`
    async fn write_registers(&self, address: u16, values: &[u16]) -> Result<(), DeviceError>;

    /// Release the underlying link. Later calls fail with [`DeviceError::Disconnected`].
    async fn close(&self) -> Result<(), DeviceError>;
}

/// State of the serial link
enum Link {
    Attached(Context),
    /// The last request timed out or broke the framing; reopen before the next one
    Stale,
    Closed,
}

/// Device client speaking Modbus RTU over a serial port
///
/// A request that times out or fails at the transport level leaves the link
/// stale: the device may still answer it later, and RTU frames carry no
/// transaction id to tell that answer apart from the next one. The port is
/// closed at once and reopened on the following request.
pub struct RtuDeviceClient {
    config: SerialConfig,
    timeout: Duration,
    link: Mutex<Link>,
}

impl RtuDeviceClient {
    /// Open the serial port described by `config` and attach to its unit identifier
    pub fn open(config: &SerialConfig) -> Result<Self, DeviceError> {
        let stream = open_port(config)?;
        info!(
            "Opened serial port {} at {} baud, unit {}",
            config.port, config.baud_rate, config.slave_id
        );
        Ok(Self::with_stream(stream, config))
    }

    /// Attach to an already opened stream; reopening uses `config.port`
    fn with_stream(stream: SerialStream, config: &SerialConfig) -> Self {
        Self {
            config: config.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            link: Mutex::new(Link::Attached(rtu::attach_slave(
                stream,
                Slave(config.slave_id),
            ))),
        }
    }

    /// Context of the link, reopening the port if the link went stale
    fn attached<'a>(&self, link: &'a mut Link) -> Result<&'a mut Context, DeviceError> {
        if matches!(link, Link::Stale) {
            info!("Reopening serial port {}", self.config.port);
            let stream = open_port(&self.config)?;
            *link = Link::Attached(rtu::attach_slave(stream, Slave(self.config.slave_id)));
        }
        match link {
            Link::Attached(context) => Ok(context),
            Link::Stale | Link::Closed => Err(DeviceError::Disconnected),
        }
    }

    /// Flatten the timeout, transport and exception layers of a device request
    ///
    /// Timeouts and transport errors drop the link.
    fn settle<T>(
        &self,
        link: &mut Link,
        outcome: Result<tokio_modbus::Result<T>, tokio::time::error::Elapsed>,
    ) -> Result<T, DeviceError> {
        let err = match outcome {
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(code))) => return Err(DeviceError::Exception(code)),
            Ok(Err(err)) => DeviceError::Transport(err.to_string()),
            Err(_) => DeviceError::Timeout(self.timeout),
        };
        debug!("Dropping serial link on {} after: {}", self.config.port, err);
        *link = Link::Stale;
        Err(err)
    }
}

#[async_trait]
impl DeviceClient for RtuDeviceClient {
    async fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, DeviceError> {
        let mut link = self.link.lock().await;
        let context = self.attached(&mut link)?;
        let outcome = tokio::time::timeout(
            self.timeout,
            context.read_holding_registers(address, count),
        )
        .await;
        let result = self.settle(&mut link, outcome);
        if let Err(err) = &result {
            warn!(
                "Reading {} registers at {} on {} failed: {}",
                count, address, self.config.port, err
            );
        }
        result
    }

    async fn write_registers(&self, address: u16, values: &[u16]) -> Result<(), DeviceError> {
        let mut link = self.link.lock().await;
        let context = self.attached(&mut link)?;
        let outcome = tokio::time::timeout(
            self.timeout,
            context.write_multiple_registers(address, values),
        )
        .await;
        let result = self.settle(&mut link, outcome);
        if let Err(err) = &result {
            warn!(
                "Writing {:?} at {} on {} failed: {}",
                values, address, self.config.port, err
            );
        }
        result
    }

    async fn close(&self) -> Result<(), DeviceError> {
        let mut link = self.link.lock().await;
        match std::mem::replace(&mut *link, Link::Closed) {
            Link::Attached(mut context) => {
                info!("Closing serial port {}", self.config.port);
                context
                    .disconnect()
                    .await
                    .map_err(|e| DeviceError::Transport(e.to_string()))
            }
            Link::Stale | Link::Closed => {
                debug!("Serial port {} already closed", self.config.port);
                Ok(())
            }
        }
    }
}

fn open_port(config: &SerialConfig) -> Result<SerialStream, DeviceError> {
    let builder = tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(data_bits(config.data_bits))
        .parity(parity(config.parity))
        .stop_bits(stop_bits(config.stop_bits));

    SerialStream::open(&builder).map_err(|e| {
        DeviceError::Transport(format!("Failed to open serial port {}: {}", config.port, e))
    })
}

fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn parity(setting: ParitySetting) -> Parity {
    match setting {
        ParitySetting::None => Parity::None,
        ParitySetting::Even => Parity::Even,
        ParitySetting::Odd => Parity::Odd,
    }
}

fn stop_bits(bits: u8) -> StopBits {
    if bits == 2 {
        StopBits::Two
    } else {
        StopBits::One
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_settings() {
        assert_eq!(data_bits(7), DataBits::Seven);
        assert_eq!(data_bits(8), DataBits::Eight);
        assert_eq!(parity(ParitySetting::Even), Parity::Even);
        assert_eq!(stop_bits(2), StopBits::Two);
        assert_eq!(stop_bits(1), StopBits::One);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let config = SerialConfig {
            enabled: true,
            port: "/dev/this-port-does-not-exist".to_string(),
            ..SerialConfig::default()
        };
        assert!(matches!(
            RtuDeviceClient::open(&config),
            Err(DeviceError::Transport(_))
        ));
    }

    #[cfg(unix)]
    fn crc16(frame: &[u8]) -> [u8; 2] {
        let mut crc: u16 = 0xFFFF;
        for byte in frame {
            crc ^= u16::from(*byte);
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
            }
        }
        crc.to_le_bytes()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_drops_the_link() {
        use tokio::io::AsyncWriteExt;

        let (mut device_side, gateway_side) = SerialStream::pair().unwrap();
        let config = SerialConfig {
            enabled: true,
            port: "/dev/this-port-does-not-exist".to_string(),
            timeout_ms: 100,
            ..SerialConfig::default()
        };
        let client = RtuDeviceClient::with_stream(gateway_side, &config);

        assert!(matches!(
            client.read_registers(3, 1).await,
            Err(DeviceError::Timeout(_))
        ));

        // Late answer to the first request: one word, value 30
        let mut frame = vec![config.slave_id, 0x03, 0x02, 0x00, 0x1E];
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc);
        let _ = device_side.write_all(&frame).await;

        // The next request must not take that answer as its own
        assert!(matches!(
            client.read_registers(184, 1).await,
            Err(DeviceError::Transport(_))
        ));
        assert!(matches!(
            client.write_registers(184, &[1]).await,
            Err(DeviceError::Transport(_))
        ));

        client.close().await.unwrap();
        assert!(matches!(
            client.read_registers(184, 1).await,
            Err(DeviceError::Disconnected)
        ));
    }
}
