// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register bank datastore
//!
//! A [`RegisterDatastore`] is the single point of truth for one register bank
//! (input or holding registers). For every access it decides where the value
//! lives:
//!
//! 1. Virtual addresses, and every address when no device client is attached,
//!    are served from the in-memory cache at their logical address.
//! 2. Any other address is translated to a physical address through the
//!    address map and forwarded to the device client.
//!
//! Hardware reads and writes never touch the cache, so a read of a
//! hardware-routed address always reflects live device state.
//!
//! ### Thread Safety
//!
//! The cache is protected by a `Mutex`; a multi-register read or write of
//! cached registers holds the lock for the whole span. Serialization of
//! device frames is the responsibility of the [`DeviceClient`].

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use serde::{Deserialize, Serialize};

use super::device::DeviceClient;
use super::error::RegisterError;
use crate::address::{AddressClassifier, AddressTranslator, RegisterRange};

/// Which register bank a datastore serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterBank {
    /// Read-only registers (function 0x04)
    Input,
    /// Read-write registers (functions 0x03, 0x06, 0x10)
    Holding,
}

impl fmt::Display for RegisterBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterBank::Input => write!(f, "input"),
            RegisterBank::Holding => write!(f, "holding"),
        }
    }
}

/// Initial value of seeded cache slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedFill {
    /// Every slot starts at zero
    Zero,
    /// Every slot starts with its own address
    Address,
}

/// A range of cache slots to create at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSeed {
    pub range: RegisterRange,
    pub fill: SeedFill,
}

impl CacheSeed {
    pub fn new(range: RegisterRange, fill: SeedFill) -> Self {
        Self { range, fill }
    }
}

/// Addresses covered by `count` registers starting at `address`.
///
/// `None` for an empty span or one running past the last register.
fn span(address: u16, count: u16) -> Option<RangeInclusive<u16>> {
    if count == 0 {
        return None;
    }
    let last = u32::from(address) + u32::from(count) - 1;
    let last = u16::try_from(last).ok()?;
    Some(address..=last)
}

/// Router for one register bank
pub struct RegisterDatastore {
    bank: RegisterBank,
    classifier: Arc<AddressClassifier>,
    translator: Arc<AddressTranslator>,
    cache: Mutex<HashMap<u16, u16>>,
    device: Option<Arc<dyn DeviceClient>>,
}

impl fmt::Debug for RegisterDatastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterDatastore")
            .field("bank", &self.bank)
            .field("cached", &self.lock_cache().len())
            .field("online", &self.device.is_some())
            .finish()
    }
}

impl RegisterDatastore {
    /// Create a datastore with an empty cache
    ///
    /// ### Parameters
    ///
    /// * `bank` - The bank served, used in logs
    /// * `classifier` - Address classes of the device
    /// * `translator` - Logical to physical address mapping
    /// * `device` - Shared device client; `None` runs the bank offline
    pub fn new(
        bank: RegisterBank,
        classifier: Arc<AddressClassifier>,
        translator: Arc<AddressTranslator>,
        device: Option<Arc<dyn DeviceClient>>,
    ) -> Self {
        Self {
            bank,
            classifier,
            translator,
            cache: Mutex::new(HashMap::new()),
            device,
        }
    }

    /// Create cache slots according to `seeds`
    pub fn with_seeds(self, seeds: &[CacheSeed]) -> Self {
        for seed in seeds {
            self.seed(seed.range, seed.fill);
        }
        self
    }

    /// Create or reset the cache slots of `range`
    pub fn seed(&self, range: RegisterRange, fill: SeedFill) {
        let mut cache = self.lock_cache();
        for address in range.iter() {
            let value = match fill {
                SeedFill::Zero => 0,
                SeedFill::Address => address,
            };
            cache.insert(address, value);
        }
        debug!(
            "Seeded {} {} registers in {}",
            range.len(),
            self.bank,
            range
        );
    }

    pub fn bank(&self) -> RegisterBank {
        self.bank
    }

    /// True when a device client is attached
    pub fn is_online(&self) -> bool {
        self.device.is_some()
    }

    /// Current cache slot of `address`, if initialized
    pub fn cached(&self, address: u16) -> Option<u16> {
        self.lock_cache().get(&address).copied()
    }

    /// Device client serving `address`, or `None` when the cache serves it
    fn device_for(&self, address: u16) -> Option<&Arc<dyn DeviceClient>> {
        if self.classifier.is_virtual(address) {
            return None;
        }
        self.device.as_ref()
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<u16, u16>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, address: u16) -> Result<u16, RegisterError> {
        self.translator
            .translate(address)
            .map_err(|err| RegisterError::from_translation(address, err))
    }

    /// Read `count` registers starting at `address`
    ///
    /// ### Errors
    ///
    /// * [`RegisterError::AddressOutOfRange`] if a cached span is not fully initialized
    /// * [`RegisterError::Routing`] or [`RegisterError::Table`] if the address has
    ///   no physical mapping
    /// * [`RegisterError::DeviceUnavailable`] if the device read fails
    pub async fn read(&self, address: u16, count: u16) -> Result<Vec<u16>, RegisterError> {
        debug!(
            ">> Reading {} {} registers at address {}",
            count, self.bank, address
        );
        let result = match self.device_for(address) {
            None => self.read_cache(address, count),
            Some(device) => match self.resolve(address) {
                Ok(physical) => device
                    .read_registers(physical, count)
                    .await
                    .map_err(RegisterError::from),
                Err(err) => Err(err),
            },
        };
        debug!(
            "<< Read {} {} registers at address {} gave {:?}",
            count, self.bank, address, result
        );
        result
    }

    fn read_cache(&self, address: u16, count: u16) -> Result<Vec<u16>, RegisterError> {
        let out_of_range = || RegisterError::AddressOutOfRange { address, count };
        let addresses = span(address, count).ok_or_else(out_of_range)?;
        let cache = self.lock_cache();
        addresses
            .map(|slot| cache.get(&slot).copied().ok_or_else(out_of_range))
            .collect()
    }

    /// Write one register
    ///
    /// Cached addresses get their slot created or overwritten. Hardware-routed
    /// addresses are written to the device at their physical address and the
    /// cache is left untouched.
    pub async fn write(&self, address: u16, value: u16) -> Result<(), RegisterError> {
        debug!(
            ">> Writing {} to {} register {}",
            value, self.bank, address
        );
        let result = match self.device_for(address) {
            None => {
                self.lock_cache().insert(address, value);
                Ok(())
            }
            Some(device) => match self.resolve(address) {
                Ok(physical) => device
                    .write_registers(physical, &[value])
                    .await
                    .map_err(RegisterError::from),
                Err(err) => Err(err),
            },
        };
        debug!(
            "<< Write of {} to {} register {} gave {:?}",
            value, self.bank, address, result
        );
        result
    }

    /// Write consecutive registers starting at `address`
    ///
    /// A span served entirely from the cache is written under a single lock so
    /// readers never observe it half-written. Otherwise each register is written
    /// in address order with [`RegisterDatastore::write`], stopping at the first
    /// failure.
    pub async fn write_many(&self, address: u16, values: &[u16]) -> Result<(), RegisterError> {
        let count = u16::try_from(values.len()).unwrap_or(u16::MAX);
        let addresses =
            span(address, count).ok_or(RegisterError::AddressOutOfRange { address, count })?;

        if addresses.clone().all(|slot| self.device_for(slot).is_none()) {
            let mut cache = self.lock_cache();
            for (slot, value) in addresses.zip(values) {
                cache.insert(slot, *value);
            }
            debug!(
                "Wrote {} cached {} registers starting at {}",
                values.len(),
                self.bank,
                address
            );
            return Ok(());
        }

        for (slot, value) in addresses.zip(values) {
            self.write(slot, *value).await?;
        }
        Ok(())
    }

    /// Check that every address of the span can be served
    ///
    /// A cached address must have an initialized slot; a hardware-routed address
    /// must have a physical mapping. Empty spans and spans running past the
    /// last register are rejected.
    pub fn validate_range(&self, address: u16, count: u16) -> bool {
        let Some(addresses) = span(address, count) else {
            debug!(
                "Validating {} {} registers at {}: invalid span",
                count, self.bank, address
            );
            return false;
        };
        let cache = self.lock_cache();
        let valid = addresses.into_iter().all(|slot| match self.device_for(slot) {
            None => cache.contains_key(&slot),
            Some(_) => self.translator.translate(slot).is_ok(),
        });
        debug!(
            "Validating {} {} registers at {} gave {}",
            count, self.bank, address, valid
        );
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::mock_device::{DeviceOperation, MockDeviceClient};
    use crate::table::IndexedTable;

    fn classifier() -> Arc<AddressClassifier> {
        Arc::new(
            AddressClassifier::new(
                RegisterRange::new(30000, 32000),
                RegisterRange::new(60, 499),
                None,
            )
            .unwrap(),
        )
    }

    fn translator() -> Arc<AddressTranslator> {
        let csv = "\
API Address,Name,Component Address
100,Out of component,5
1000,Serial number,3
1001,Battery SOC,184
1002,Grid power,185
";
        let mut table = IndexedTable::new();
        table.ingest_reader(csv.as_bytes(), "API Address", 0).unwrap();
        Arc::new(AddressTranslator::new(table))
    }

    fn offline() -> RegisterDatastore {
        RegisterDatastore::new(RegisterBank::Holding, classifier(), translator(), None)
    }

    fn online(device: &Arc<MockDeviceClient>) -> RegisterDatastore {
        let device: Arc<dyn DeviceClient> = device.clone();
        RegisterDatastore::new(RegisterBank::Holding, classifier(), translator(), Some(device))
            .with_seeds(&[CacheSeed::new(
                RegisterRange::new(30000, 30010),
                SeedFill::Zero,
            )])
    }

    #[tokio::test]
    async fn test_offline_write_then_read() {
        let store = offline();
        store.write(100, 7).await.unwrap();
        assert_eq!(store.read(100, 1).await.unwrap(), vec![7]);
        assert_eq!(store.cached(100), Some(7));
    }

    #[tokio::test]
    async fn test_offline_read_requires_initialized_span() {
        let store = offline();
        store.seed(RegisterRange::new(0, 3), SeedFill::Address);
        assert_eq!(store.read(1, 3).await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            store.read(2, 3).await,
            Err(RegisterError::AddressOutOfRange {
                address: 2,
                count: 3
            })
        ));
        assert!(matches!(
            store.read(65535, 2).await,
            Err(RegisterError::AddressOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_virtual_addresses_stay_in_cache() {
        let device = Arc::new(MockDeviceClient::new());
        let store = online(&device);
        store.write(30005, 42).await.unwrap();
        assert_eq!(store.read(30004, 2).await.unwrap(), vec![0, 42]);
        assert!(device.operations().is_empty());
    }

    #[tokio::test]
    async fn test_hardware_read_is_translated() {
        let device = Arc::new(MockDeviceClient::new().with_registers(184, &[87, 230]));
        let store = online(&device);
        assert_eq!(store.read(1001, 2).await.unwrap(), vec![87, 230]);
        assert_eq!(
            device.operations(),
            vec![DeviceOperation::Read {
                address: 184,
                count: 2
            }]
        );
        assert_eq!(store.cached(1001), None);
    }

    #[tokio::test]
    async fn test_hardware_write_bypasses_cache() {
        let device = Arc::new(MockDeviceClient::new().with_registers(3, &[0]));
        let store = online(&device);
        store.write(1000, 9).await.unwrap();
        assert_eq!(store.cached(1000), None);
        assert_eq!(store.read(1000, 1).await.unwrap(), vec![9]);
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
    }

    #[tokio::test]
    async fn test_unmapped_component_never_reaches_device() {
        let device = Arc::new(MockDeviceClient::new());
        let store = online(&device);
        assert!(matches!(
            store.read(100, 1).await,
            Err(RegisterError::Routing { address: 100, .. })
        ));
        assert!(matches!(
            store.write(2500, 1).await,
            Err(RegisterError::Routing { address: 2500, .. })
        ));
        assert!(matches!(
            store.read(1500, 1).await,
            Err(RegisterError::Table(_))
        ));
        assert!(device.operations().is_empty());
    }

    #[tokio::test]
    async fn test_device_failure_is_reported() {
        let device = Arc::new(MockDeviceClient::new().with_registers(3, &[1]));
        device.set_failing(true);
        let store = online(&device);
        assert!(matches!(
            store.read(1000, 1).await,
            Err(RegisterError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_write_many() {
        let store = offline();
        store.write_many(10, &[1, 2, 3]).await.unwrap();
        assert_eq!(store.read(10, 3).await.unwrap(), vec![1, 2, 3]);

        let device = Arc::new(MockDeviceClient::new().with_registers(184, &[0, 0]));
        let store = online(&device);
        store.write_many(1001, &[5, 6]).await.unwrap();
        assert_eq!(
            device.operations(),
            vec![
                DeviceOperation::Write {
                    address: 184,
                    values: vec![5]
                },
                DeviceOperation::Write {
                    address: 185,
                    values: vec![6]
                },
            ]
        );
    }

    #[test]
    fn test_validate_range() {
        let store = offline();
        store.seed(RegisterRange::new(60, 69), SeedFill::Zero);
        assert!(store.validate_range(60, 10));
        assert!(!store.validate_range(65, 10));
        assert!(!store.validate_range(60, 0));

        let device = Arc::new(MockDeviceClient::new());
        let store = online(&device);
        assert!(store.validate_range(1000, 3));
        assert!(!store.validate_range(1000, 4));
        assert!(!store.validate_range(100, 1));
        assert!(store.validate_range(30000, 11));
        assert!(!store.validate_range(30000, 12));
    }

    #[test]
    fn test_span() {
        assert_eq!(span(10, 3), Some(10..=12));
        assert_eq!(span(65535, 1), Some(65535..=65535));
        assert_eq!(span(65535, 2), None);
        assert_eq!(span(0, 0), None);
    }
}
