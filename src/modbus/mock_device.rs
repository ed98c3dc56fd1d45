// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-memory device client
//!
//! Stands in for the serial device when running the gateway without hardware
//! and in tests. Every request is recorded so callers can check which physical
//! addresses were touched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::ExceptionCode;

use super::device::DeviceClient;
use super::error::DeviceError;

/// A request seen by [`MockDeviceClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOperation {
    Read { address: u16, count: u16 },
    Write { address: u16, values: Vec<u16> },
}

#[derive(Debug, Default)]
struct MockState {
    registers: HashMap<u16, u16>,
    delays: HashMap<u16, Duration>,
    operations: Vec<DeviceOperation>,
}

/// Device client backed by a register map
///
/// Reading or writing a register that was never defined answers with an
/// `IllegalDataAddress` exception, like a real device would.
#[derive(Debug, Default)]
pub struct MockDeviceClient {
    state: Mutex<MockState>,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl MockDeviceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define consecutive registers starting at `address`
    pub fn with_registers(self, address: u16, values: &[u16]) -> Self {
        {
            let mut state = self.lock();
            for (offset, value) in values.iter().enumerate() {
                state
                    .registers
                    .insert(address.wrapping_add(offset as u16), *value);
            }
        }
        self
    }

    /// Answer reads starting at `address` only after `delay`
    pub fn with_read_delay(self, address: u16, delay: Duration) -> Self {
        self.lock().delays.insert(address, delay);
        self
    }

    /// Make every following request fail with a timeout
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.lock().registers.get(&address).copied()
    }

    /// Requests received so far, oldest first
    pub fn operations(&self) -> Vec<DeviceOperation> {
        self.lock().operations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), DeviceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeviceError::Disconnected);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeviceError::Timeout(Duration::from_millis(0)));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceClient for MockDeviceClient {
    async fn read_registers(&self, address: u16, count: u16) -> Result<Vec<u16>, DeviceError> {
        self.check_available()?;
        let delay = self.lock().delays.get(&address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        state.operations.push(DeviceOperation::Read { address, count });
        (0..count)
            .map(|offset| {
                state
                    .registers
                    .get(&address.wrapping_add(offset))
                    .copied()
                    .ok_or(DeviceError::Exception(ExceptionCode::IllegalDataAddress))
            })
            .collect()
    }

    async fn write_registers(&self, address: u16, values: &[u16]) -> Result<(), DeviceError> {
        self.check_available()?;
        let mut state = self.lock();
        state.operations.push(DeviceOperation::Write {
            address,
            values: values.to_vec(),
        });
        let defined = (0..values.len() as u16)
            .all(|offset| state.registers.contains_key(&address.wrapping_add(offset)));
        if !defined {
            return Err(DeviceError::Exception(ExceptionCode::IllegalDataAddress));
        }
        for (offset, value) in values.iter().enumerate() {
            state
                .registers
                .insert(address.wrapping_add(offset as u16), *value);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), DeviceError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
