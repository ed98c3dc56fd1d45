// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Address space handling
//!
//! - [`classifier`]: partitions register addresses into virtual, read-write and
//!   read-only classes.
//! - [`translator`]: maps component-prefixed logical addresses to the physical
//!   register numbers understood by the serial device.

pub mod classifier;
pub mod translator;

pub use classifier::{AddressClassifier, AddressSpaceError, RegisterClass, RegisterRange};
pub use translator::{AddressTranslator, TranslationError};
