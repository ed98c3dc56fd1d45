// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust Modbus gateway library
//!
//! Exposes a serial Modbus RTU device to Modbus TCP clients. Logical TCP
//! addresses are translated to physical device registers through a CSV
//! address map, virtual registers are kept in memory, and a polling driver
//! decodes registers into typed measurements.

pub mod address;
pub mod config;
pub mod daemon;
pub mod modbus;
pub mod poller;
pub mod table;
