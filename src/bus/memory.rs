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

//! In-memory simulated board, used by `--simulate` and by tests.
//!
//! Clones share state, so a test can keep one clone and hand another to
//! the coordinator.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Bus, Level, PinMode, Pull};
use crate::error::BusError;

const MAX_LINE: u8 = 53;

#[derive(Default)]
struct MemoryState {
    levels: HashMap<u8, Level>,
    modes: HashMap<u8, PinMode>,
    writes: Vec<(u8, Level)>,
    i2c_devices: BTreeSet<u8>,
    i2c_missing: bool,
    files: BTreeMap<PathBuf, String>,
    failing_pins: HashSet<u8>,
    latency: Duration,
    transactions: u64,
}

#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small bench setup: a DS18B20 on line 4, a DHT22 on line 17, a
    /// button on line 22 and a BMP280 at 0x76.
    pub fn demo() -> Self {
        let bus = Self::new();
        bus.add_file("/sys/bus/w1/devices/28-0000075c3a1f/w1_slave",
            "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n");
        bus.add_file("/proc/device-tree/dht11@11/name", "dht11");
        bus.add_file("/sys/bus/iio/devices/iio:device0/name", "dht11\n");
        bus.add_file("/sys/bus/iio/devices/iio:device0/in_temp_input", "21400\n");
        bus.add_file("/sys/bus/iio/devices/iio:device0/in_humidityrelative_input", "48200\n");
        bus.set_level(22, Level::High);
        bus.set_level(27, Level::High);
        bus.add_i2c_device(0x76);
        bus
    }

    pub fn set_level(&self, pin: u8, level: Level) {
        self.state.lock().levels.insert(pin, level);
    }

    pub fn add_i2c_device(&self, addr: u8) {
        self.state.lock().i2c_devices.insert(addr);
    }

    pub fn set_i2c_available(&self, available: bool) {
        self.state.lock().i2c_missing = !available;
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: &str) {
        self.state.lock().files.insert(path.into(), contents.to_string());
    }

    /// Makes every level operation on `pin` fail with an I/O error.
    pub fn fail_pin(&self, pin: u8) {
        self.state.lock().failing_pins.insert(pin);
    }

    /// Blocking delay applied to every operation.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn writes(&self) -> Vec<(u8, Level)> {
        self.state.lock().writes.clone()
    }

    pub fn transactions(&self) -> u64 {
        self.state.lock().transactions
    }

    fn begin(&self, pin: Option<u8>) -> Result<(), BusError> {
        let latency = {
            let mut st = self.state.lock();
            st.transactions += 1;
            if let Some(pin) = pin {
                if pin > MAX_LINE {
                    return Err(BusError::InvalidPin(pin));
                }
                if st.failing_pins.contains(&pin) {
                    return Err(BusError::io(
                        format!("gpio{pin}"),
                        io::Error::new(io::ErrorKind::Other, "simulated failure"),
                    ));
                }
            }
            st.latency
        };
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        Ok(())
    }
}

impl Bus for MemoryBus {
    fn setup_input(&mut self, pin: u8, pull: Pull) -> Result<(), BusError> {
        self.begin(Some(pin))?;
        let mut st = self.state.lock();
        st.modes.insert(pin, PinMode::Input);
        if !st.levels.contains_key(&pin) {
            match pull {
                Pull::Up => {
                    st.levels.insert(pin, Level::High);
                }
                Pull::Down => {
                    st.levels.insert(pin, Level::Low);
                }
                Pull::None => {}
            }
        }
        Ok(())
    }

    fn read_level(&mut self, pin: u8) -> Result<Level, BusError> {
        self.begin(Some(pin))?;
        Ok(self.state.lock().levels.get(&pin).copied().unwrap_or(Level::Low))
    }

    fn setup_output(&mut self, pin: u8, initial: Level) -> Result<(), BusError> {
        self.begin(Some(pin))?;
        let mut st = self.state.lock();
        st.modes.insert(pin, PinMode::Output);
        st.levels.insert(pin, initial);
        Ok(())
    }

    fn write_level(&mut self, pin: u8, level: Level) -> Result<(), BusError> {
        self.begin(Some(pin))?;
        let mut st = self.state.lock();
        st.levels.insert(pin, level);
        st.writes.push((pin, level));
        Ok(())
    }

    fn pin_mode(&mut self, pin: u8) -> Result<PinMode, BusError> {
        self.begin(Some(pin))?;
        Ok(self.state.lock().modes.get(&pin).copied().unwrap_or(PinMode::Input))
    }

    fn open_i2c(&mut self) -> Result<(), BusError> {
        self.begin(None)?;
        if self.state.lock().i2c_missing {
            return Err(BusError::Unavailable("simulated I2C adapter missing".to_string()));
        }
        Ok(())
    }

    fn i2c_probe(&mut self, addr: u8) -> Result<bool, BusError> {
        self.open_i2c()?;
        Ok(self.state.lock().i2c_devices.contains(&addr))
    }

    fn read_attribute(&mut self, path: &Path) -> Result<String, BusError> {
        self.begin(None)?;
        self.state
            .lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| BusError::io(path.display().to_string(), io::Error::from(io::ErrorKind::NotFound)))
    }

    fn list_dir(&mut self, path: &Path) -> Result<Vec<String>, BusError> {
        self.begin(None)?;
        let st = self.state.lock();
        let names: BTreeSet<String> = st
            .files
            .keys()
            .filter_map(|p| p.strip_prefix(path).ok())
            .filter_map(|rest| rest.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if names.is_empty() {
            return Err(BusError::io(path.display().to_string(), io::Error::from(io::ErrorKind::NotFound)));
        }
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_sets_idle_level() {
        let mut bus = MemoryBus::new();
        bus.setup_input(5, Pull::Up).unwrap();
        assert_eq!(bus.read_level(5).unwrap(), Level::High);
        bus.setup_input(6, Pull::Down).unwrap();
        assert_eq!(bus.read_level(6).unwrap(), Level::Low);
    }

    #[test]
    fn test_list_dir_from_virtual_files() {
        let mut bus = MemoryBus::demo();
        let entries = bus.list_dir(Path::new("/sys/bus/w1/devices")).unwrap();
        assert_eq!(entries, vec!["28-0000075c3a1f".to_string()]);
        assert!(bus.list_dir(Path::new("/nope")).is_err());
    }

    #[test]
    fn test_i2c_unavailable() {
        let mut bus = MemoryBus::new();
        bus.add_i2c_device(0x40);
        assert!(bus.i2c_probe(0x40).unwrap());
        assert!(!bus.i2c_probe(0x41).unwrap());
        bus.set_i2c_available(false);
        assert!(matches!(bus.i2c_probe(0x40), Err(BusError::Unavailable(_))));
    }

    #[test]
    fn test_failing_and_invalid_pins() {
        let mut bus = MemoryBus::new();
        bus.fail_pin(9);
        assert!(bus.read_level(9).is_err());
        assert!(matches!(bus.read_level(200), Err(BusError::InvalidPin(200))));
    }

    #[test]
    fn test_writes_are_recorded() {
        let handle = MemoryBus::new();
        let mut bus = handle.clone();
        bus.setup_output(23, Level::Low).unwrap();
        bus.write_level(23, Level::High).unwrap();
        assert_eq!(handle.writes(), vec![(23, Level::High)]);
        assert_eq!(handle.transactions(), 2);
    }
}
