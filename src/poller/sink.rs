// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Measurement persistence

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{debug, info};
use serde::Serialize;

use super::codec::{DecodedValue, ScaleFactor};

/// One decoded register reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub timestamp: DateTime<Local>,
    pub key: String,
    pub mode: String,
    pub scale: ScaleFactor,
    pub value: DecodedValue,
    pub unit: String,
    pub device_id: String,
    pub asset_id: String,
}

/// Destination of the measurements of a polling cycle
pub trait MeasurementSink {
    /// Store one polling cycle
    ///
    /// A batch is either stored whole or not at all.
    fn store(&mut self, batch: &[Measurement]) -> Result<()>;
}

/// Appends measurements to a file, one JSON object per line
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: File,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open measurement file {:?}", path))?;
        Ok(Self { path, file })
    }
}

impl MeasurementSink for JsonLinesSink {
    fn store(&mut self, batch: &[Measurement]) -> Result<()> {
        let mut buffer = Vec::new();
        for measurement in batch {
            serde_json::to_writer(&mut buffer, measurement)
                .context("Failed to serialize measurement")?;
            buffer.push(b'\n');
        }
        // whole batch in one write
        self.file
            .write_all(&buffer)
            .and_then(|_| self.file.flush())
            .with_context(|| format!("Failed to append measurements to {:?}", self.path))?;
        debug!("Stored {} measurements in {:?}", batch.len(), self.path);
        Ok(())
    }
}

/// Logs every measurement at info level
#[derive(Debug, Default)]
pub struct LogSink;

impl MeasurementSink for LogSink {
    fn store(&mut self, batch: &[Measurement]) -> Result<()> {
        for m in batch {
            info!(
                "{} {} [{}] {} = {} {}",
                m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                m.device_id,
                m.mode,
                m.key,
                m.value,
                m.unit
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn measurement(key: &str, value: DecodedValue) -> Measurement {
        Measurement {
            timestamp: Local::now(),
            key: key.to_string(),
            mode: "R".to_string(),
            scale: ScaleFactor::Numeric(0.1),
            value,
            unit: "V".to_string(),
            device_id: "inverter-01".to_string(),
            asset_id: "site-a".to_string(),
        }
    }

    #[test]
    fn test_json_lines_are_appended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("measurements.jsonl");

        let mut sink = JsonLinesSink::open(&path).unwrap();
        sink.store(&[
            measurement("grid_voltage", DecodedValue::Float(230.5)),
            measurement("state", DecodedValue::Text("Enabled".to_string())),
        ])
        .unwrap();
        let mut sink = JsonLinesSink::open(&path).unwrap();
        sink.store(&[measurement("soc", DecodedValue::Integer(87))]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["key"], "grid_voltage");
        assert_eq!(lines[0]["value"], 230.5);
        assert_eq!(lines[1]["value"], "Enabled");
        assert_eq!(lines[2]["value"], 87);
        assert_eq!(lines[2]["asset_id"], "site-a");
    }

    #[test]
    fn test_log_sink_accepts_any_batch() {
        let mut sink = LogSink;
        assert!(sink.store(&[]).is_ok());
        assert!(sink
            .store(&[measurement("soc", DecodedValue::Integer(0))])
            .is_ok());
    }
}
