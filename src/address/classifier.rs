// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register address space partitioning
//!
//! Every 16-bit register address belongs to exactly one of three classes:
//!
//! | Class | Meaning |
//! |-------|---------|
//! | [`RegisterClass::Virtual`] | Software-defined, always served from the cache |
//! | [`RegisterClass::ReadWrite`] | Holding registers, forwarded to hardware for reads and writes |
//! | [`RegisterClass::ReadOnly`] | Input registers, forwarded to hardware for reads |
//!
//! The optional device-extension range (the Deye battery block on Sol-Ark
//! inverters) is reserved only; it does not change the class of an address.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised when building an [`AddressClassifier`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressSpaceError {
    #[error("Range {name} is inverted: start {start} is greater than end {end}")]
    InvertedRange { name: String, start: u16, end: u16 },

    #[error("Virtual range {virtual_range} overlaps read-write range {read_write_range}")]
    OverlappingRanges {
        virtual_range: RegisterRange,
        read_write_range: RegisterRange,
    },
}

/// Closed interval of register addresses, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRange {
    pub start: u16,
    pub end: u16,
}

impl RegisterRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, address: u16) -> bool {
        self.start <= address && address <= self.end
    }

    pub fn overlaps(&self, other: &RegisterRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Number of addresses in the range
    pub fn len(&self) -> usize {
        if self.is_inverted() {
            0
        } else {
            usize::from(self.end - self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }

    fn check(&self, name: &str) -> Result<(), AddressSpaceError> {
        if self.is_inverted() {
            return Err(AddressSpaceError::InvertedRange {
                name: name.to_string(),
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

impl fmt::Display for RegisterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..={}]", self.start, self.end)
    }
}

/// Class of a register address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    Virtual,
    ReadWrite,
    ReadOnly,
}

/// Stateless classifier over configured address ranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressClassifier {
    virtual_range: RegisterRange,
    read_write_range: RegisterRange,
    device_extension_range: Option<RegisterRange>,
}

impl AddressClassifier {
    /// Build a classifier from explicit bounds
    ///
    /// ### Errors
    ///
    /// * [`AddressSpaceError::InvertedRange`] if a range has `start > end`
    /// * [`AddressSpaceError::OverlappingRanges`] if the virtual and read-write
    ///   ranges share an address
    pub fn new(
        virtual_range: RegisterRange,
        read_write_range: RegisterRange,
        device_extension_range: Option<RegisterRange>,
    ) -> Result<Self, AddressSpaceError> {
        virtual_range.check("virtual_range")?;
        read_write_range.check("read_write_range")?;
        if let Some(extension) = &device_extension_range {
            extension.check("device_extension_range")?;
        }
        if virtual_range.overlaps(&read_write_range) {
            return Err(AddressSpaceError::OverlappingRanges {
                virtual_range,
                read_write_range,
            });
        }
        Ok(Self {
            virtual_range,
            read_write_range,
            device_extension_range,
        })
    }

    pub fn is_virtual(&self, address: u16) -> bool {
        self.virtual_range.contains(address)
    }

    pub fn is_read_write(&self, address: u16) -> bool {
        self.read_write_range.contains(address)
    }

    pub fn is_read_only(&self, address: u16) -> bool {
        !self.is_virtual(address) && !self.is_read_write(address)
    }

    /// Membership in the reserved device-extension block
    pub fn is_device_extension(&self, address: u16) -> bool {
        self.device_extension_range
            .is_some_and(|range| range.contains(address))
    }

    pub fn classify(&self, address: u16) -> RegisterClass {
        if self.is_virtual(address) {
            RegisterClass::Virtual
        } else if self.is_read_write(address) {
            RegisterClass::ReadWrite
        } else {
            RegisterClass::ReadOnly
        }
    }

    pub fn virtual_range(&self) -> RegisterRange {
        self.virtual_range
    }

    pub fn read_write_range(&self) -> RegisterRange {
        self.read_write_range
    }

    pub fn device_extension_range(&self) -> Option<RegisterRange> {
        self.device_extension_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solark() -> AddressClassifier {
        AddressClassifier::new(
            RegisterRange::new(30000, 32000),
            RegisterRange::new(60, 499),
            Some(RegisterRange::new(10000, 10069)),
        )
        .unwrap()
    }

    #[test]
    fn test_virtual_range() {
        let classifier = solark();
        for address in [30000, 31000, 32000] {
            assert!(classifier.is_virtual(address));
            assert!(!classifier.is_read_write(address));
            assert!(!classifier.is_read_only(address));
            assert_eq!(classifier.classify(address), RegisterClass::Virtual);
        }
        assert!(!classifier.is_virtual(29999));
        assert!(!classifier.is_virtual(32001));
    }

    #[test]
    fn test_read_write_bounds_are_inclusive() {
        let classifier = solark();
        assert_eq!(classifier.classify(59), RegisterClass::ReadOnly);
        assert_eq!(classifier.classify(60), RegisterClass::ReadWrite);
        assert_eq!(classifier.classify(499), RegisterClass::ReadWrite);
        assert_eq!(classifier.classify(500), RegisterClass::ReadOnly);
    }

    #[test]
    fn test_classes_are_exclusive_and_exhaustive() {
        let classifier = solark();
        for address in 0..=u16::MAX {
            let flags = [
                classifier.is_virtual(address),
                classifier.is_read_write(address),
                classifier.is_read_only(address),
            ];
            assert_eq!(flags.iter().filter(|flag| **flag).count(), 1, "address {address}");
        }
    }

    #[test]
    fn test_device_extension_is_additive() {
        let classifier = solark();
        assert!(classifier.is_device_extension(10000));
        assert!(classifier.is_device_extension(10069));
        assert!(!classifier.is_device_extension(10070));
        assert_eq!(classifier.classify(10010), RegisterClass::ReadOnly);
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let overlap = AddressClassifier::new(
            RegisterRange::new(400, 600),
            RegisterRange::new(60, 499),
            None,
        );
        assert!(matches!(
            overlap,
            Err(AddressSpaceError::OverlappingRanges { .. })
        ));

        let inverted = AddressClassifier::new(
            RegisterRange::new(30000, 32000),
            RegisterRange::new(499, 60),
            None,
        );
        assert!(matches!(
            inverted,
            Err(AddressSpaceError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_range_len() {
        assert_eq!(RegisterRange::new(60, 499).len(), 440);
        assert_eq!(RegisterRange::new(7, 7).len(), 1);
        assert!(RegisterRange::new(8, 7).is_empty());
    }
}
