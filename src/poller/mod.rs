// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Polling driver for the gateway
//!
//! The poller is an ordinary Modbus TCP client of the gateway. It reads a list
//! of registers on a fixed interval, decodes each word with [`ValueCodec`] and
//! stores every cycle as a batch of [`Measurement`]s.

pub mod codec;
pub mod driver;
pub mod sink;

pub use codec::{CodecError, DecodeType, DecodedValue, ScaleFactor, ValueCodec};
pub use driver::{PollingDriver, RegisterReader, RegisterSpec, TcpRegisterReader};
pub use sink::{JsonLinesSink, LogSink, Measurement, MeasurementSink};
