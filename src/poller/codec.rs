// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register word codec
//!
//! Converts raw 16-bit register words into typed values according to the type
//! tag declared for each register, and back for writes.
//!
//! | Tag | Decoded value |
//! |-----|---------------|
//! | `ASCII` | two characters, high byte first |
//! | `boolean` | `"Enabled"` when non-zero, `"Disabled"` otherwise |
//! | `-` | word multiplied by the numeric scale, raw word for a label scale; whole scales give integers |
//! | `U16` | raw word |
//! | `S16` | two's complement of the word |
//! | `hex` | lowercase `0x` prefixed string |
//!
//! The inverter reports `65535` for readings it does not know; callers use
//! [`ValueCodec::decode_or_unknown`] which turns those, and any decode
//! failure, into `0`.

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value reported by the device for an unknown reading
pub const UNKNOWN_READING: u16 = u16::MAX;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("Unsupported register type '{0}'")]
    UnsupportedType(String),

    #[error("Value {value} cannot be encoded as {type_tag}")]
    InvalidValue { type_tag: String, value: String },
}

/// Type tag of a register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeType {
    Ascii,
    Boolean,
    Scaled,
    U16,
    S16,
    Hex,
}

impl FromStr for DecodeType {
    type Err = CodecError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "ASCII" => Ok(DecodeType::Ascii),
            "boolean" => Ok(DecodeType::Boolean),
            "-" => Ok(DecodeType::Scaled),
            "U16" => Ok(DecodeType::U16),
            "S16" => Ok(DecodeType::S16),
            "hex" => Ok(DecodeType::Hex),
            other => Err(CodecError::UnsupportedType(other.to_string())),
        }
    }
}

impl fmt::Display for DecodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            DecodeType::Ascii => "ASCII",
            DecodeType::Boolean => "boolean",
            DecodeType::Scaled => "-",
            DecodeType::U16 => "U16",
            DecodeType::S16 => "S16",
            DecodeType::Hex => "hex",
        };
        f.write_str(tag)
    }
}

/// Scale of a register: a multiplier, or a label such as `"-"` for unscaled values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleFactor {
    Numeric(f64),
    Label(String),
}

impl ScaleFactor {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            ScaleFactor::Numeric(factor) => Some(*factor),
            ScaleFactor::Label(_) => None,
        }
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        ScaleFactor::Numeric(1.0)
    }
}

/// A decoded register value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl DecodedValue {
    /// The value recorded for unknown or failed readings
    pub const fn unknown() -> Self {
        DecodedValue::Integer(0)
    }

    fn is_unknown_reading(&self) -> bool {
        match self {
            DecodedValue::Integer(value) => *value == i64::from(UNKNOWN_READING),
            DecodedValue::Float(value) => *value == f64::from(UNKNOWN_READING),
            DecodedValue::Text(_) => false,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Integer(value) => write!(f, "{}", value),
            DecodedValue::Float(value) => write!(f, "{}", value),
            DecodedValue::Text(value) => f.write_str(value),
        }
    }
}

/// Stateless word codec
pub struct ValueCodec;

impl ValueCodec {
    /// Decode `word` according to `type_tag`
    ///
    /// A decoded value equal to 65535 is returned as `0`.
    pub fn decode(word: u16, type_tag: &str, scale: &ScaleFactor) -> Result<DecodedValue, CodecError> {
        let value = match type_tag.parse::<DecodeType>()? {
            DecodeType::Ascii => {
                let [high, low] = word.to_be_bytes();
                DecodedValue::Text([char::from(high), char::from(low)].iter().collect())
            }
            DecodeType::Boolean => {
                let state = if word != 0 { "Enabled" } else { "Disabled" };
                DecodedValue::Text(state.to_string())
            }
            DecodeType::Scaled => match scale.as_numeric() {
                Some(factor) if factor.fract() == 0.0 => {
                    DecodedValue::Integer(i64::from(word).saturating_mul(factor as i64))
                }
                Some(factor) => DecodedValue::Float(f64::from(word) * factor),
                None => DecodedValue::Integer(i64::from(word)),
            },
            DecodeType::U16 => DecodedValue::Integer(i64::from(word)),
            DecodeType::S16 => DecodedValue::Integer(i64::from(word as i16)),
            DecodeType::Hex => DecodedValue::Text(format!("{:#x}", word)),
        };

        if value.is_unknown_reading() {
            return Ok(DecodedValue::unknown());
        }
        Ok(value)
    }

    /// Decode `word`, recording `0` when it cannot be decoded
    pub fn decode_or_unknown(word: u16, type_tag: &str, scale: &ScaleFactor) -> DecodedValue {
        Self::decode(word, type_tag, scale).unwrap_or_else(|err| {
            warn!("Cannot decode word {:#06x}: {}", word, err);
            DecodedValue::unknown()
        })
    }

    /// Encode `value` into a register word according to `type_tag`
    pub fn encode(value: &DecodedValue, type_tag: &str, scale: &ScaleFactor) -> Result<u16, CodecError> {
        let decode_type = type_tag.parse::<DecodeType>()?;
        let invalid = || CodecError::InvalidValue {
            type_tag: type_tag.to_string(),
            value: value.to_string(),
        };

        match (decode_type, value) {
            (DecodeType::Ascii, DecodedValue::Text(text)) => {
                let bytes = text
                    .chars()
                    .map(|c| u8::try_from(u32::from(c)).map_err(|_| invalid()))
                    .collect::<Result<Vec<u8>, _>>()?;
                match bytes.as_slice() {
                    [high, low] => Ok(u16::from_be_bytes([*high, *low])),
                    _ => Err(invalid()),
                }
            }
            (DecodeType::Boolean, DecodedValue::Text(text)) => match text.as_str() {
                "Enabled" => Ok(1),
                "Disabled" => Ok(0),
                _ => Err(invalid()),
            },
            (DecodeType::Scaled, DecodedValue::Integer(_) | DecodedValue::Float(_)) => {
                let raw = numeric(value).ok_or_else(invalid)?;
                let raw = match scale.as_numeric() {
                    Some(factor) if factor != 0.0 => raw / factor,
                    Some(_) => return Err(invalid()),
                    None => raw,
                };
                to_word(raw.round()).ok_or_else(invalid)
            }
            (DecodeType::U16, DecodedValue::Integer(number)) => {
                u16::try_from(*number).map_err(|_| invalid())
            }
            (DecodeType::S16, DecodedValue::Integer(number)) => i16::try_from(*number)
                .map(|signed| signed as u16)
                .map_err(|_| invalid()),
            (DecodeType::Hex, DecodedValue::Text(text)) => {
                let digits = text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                    .ok_or_else(invalid)?;
                u16::from_str_radix(digits, 16).map_err(|_| invalid())
            }
            _ => Err(invalid()),
        }
    }
}

fn numeric(value: &DecodedValue) -> Option<f64> {
    match value {
        DecodedValue::Integer(number) => Some(*number as f64),
        DecodedValue::Float(number) => Some(*number),
        DecodedValue::Text(_) => None,
    }
}

fn to_word(value: f64) -> Option<u16> {
    if (0.0..=f64::from(u16::MAX)).contains(&value) {
        Some(value as u16)
    } else {
        None
    }
}
