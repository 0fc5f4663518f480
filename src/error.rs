/*
 * This file is part of SensorTest.
 *
 * Copyright (C) 2025 SensorTest contributors
 *
 * SensorTest is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * SensorTest is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with SensorTest. If not, see <https://www.gnu.org/licenses/>.
 */

//! Error types shared by the engine.
//!
//! None of these terminate the process. Callers turn them into a status
//! line or a per-pin marker; only configuration errors abort startup.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SensorError>;

/// Failures raised by a [`crate::bus::Bus`] implementation.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error on {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid pin {0}")]
    InvalidPin(u8),

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("hardware worker failed: {0}")]
    Worker(String),
}

impl BusError {
    pub fn io(target: impl Into<String>, source: io::Error) -> Self {
        BusError::Io { target: target.into(), source }
    }
}

#[derive(Error, Debug)]
pub enum SensorError {
    #[error("failed to load plugin from {origin}: {reason}")]
    PluginLoad { origin: String, reason: String },

    #[error("detection by {plugin} timed out after {timeout_ms} ms")]
    DetectionTimeout { plugin: String, timeout_ms: u64 },

    #[error("hardware transaction failed: {0}")]
    HardwareTransaction(String),

    #[error("no logical line for physical pin {0}")]
    MappingGap(u8),

    #[error("pin {0} carries a fixed bus function")]
    ReservedPin(u8),

    #[error("bus unavailable: {0}")]
    BusUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<BusError> for SensorError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Unavailable(msg) => SensorError::BusUnavailable(msg),
            other => SensorError::HardwareTransaction(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_bus_maps_to_bus_unavailable() {
        let err: SensorError = BusError::Unavailable("/dev/i2c-1".into()).into();
        assert!(matches!(err, SensorError::BusUnavailable(ref m) if m == "/dev/i2c-1"));
    }

    #[test]
    fn test_other_bus_errors_map_to_transaction_failure() {
        let io = io::Error::new(io::ErrorKind::Other, "boom");
        let err: SensorError = BusError::io("/sys/class/gpio/gpio4/value", io).into();
        match err {
            SensorError::HardwareTransaction(msg) => assert!(msg.contains("gpio4")),
            other => panic!("unexpected {other:?}"),
        }

        let err: SensorError = BusError::InvalidPin(99).into();
        assert!(matches!(err, SensorError::HardwareTransaction(_)));
    }

    #[test]
    fn test_error_messages() {
        let err = SensorError::DetectionTimeout { plugin: "DHT22".into(), timeout_ms: 500 };
        assert_eq!(err.to_string(), "detection by DHT22 timed out after 500 ms");
        assert_eq!(SensorError::MappingGap(6).to_string(), "no logical line for physical pin 6");
    }
}
