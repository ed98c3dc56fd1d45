// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Errors raised by register banks and the physical device client

use std::time::Duration;

use thiserror::Error;
use tokio_modbus::ExceptionCode;

use crate::address::TranslationError;
use crate::table::TableError;

/// Failure while talking to the serial-attached device
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Device client is disconnected")]
    Disconnected,

    #[error("Device answered with exception {0:?}")]
    Exception(ExceptionCode),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Failure of a register bank read or write
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("No physical mapping for address {address}: {reason}")]
    Routing { address: u16, reason: String },

    #[error("Registers {address}+{count} are not backed by initialized storage")]
    AddressOutOfRange { address: u16, count: u16 },

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceError),
}

impl RegisterError {
    /// Modbus exception reported to the TCP client for this error
    pub fn exception_code(&self) -> ExceptionCode {
        match self {
            RegisterError::Table(_)
            | RegisterError::Routing { .. }
            | RegisterError::AddressOutOfRange { .. } => ExceptionCode::IllegalDataAddress,
            RegisterError::DeviceUnavailable(_) => ExceptionCode::ServerDeviceFailure,
        }
    }

    pub(crate) fn from_translation(address: u16, err: TranslationError) -> Self {
        match err {
            TranslationError::Table(table_err) => RegisterError::Table(table_err),
            other => RegisterError::Routing {
                address,
                reason: other.to_string(),
            },
        }
    }
}
