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

//! Linux bus backed by `/sys/class/gpio` and `/dev/i2c-N`.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Bus, Level, PinMode, Pull};
use crate::error::BusError;

const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_SMBUS: libc::c_ulong = 0x0720;
const I2C_SMBUS_WRITE: u8 = 0;
const I2C_SMBUS_QUICK: u32 = 0;

#[repr(C)]
struct SmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut u8,
}

pub struct SysfsBus {
    gpio_root: PathBuf,
    gpio_base: u32,
    i2c_path: PathBuf,
    i2c: Option<File>,
    exported: BTreeSet<u8>,
}

impl SysfsBus {
    pub fn new(gpio_root: impl Into<PathBuf>, gpio_base: u32, i2c_path: impl Into<PathBuf>) -> Self {
        SysfsBus {
            gpio_root: gpio_root.into(),
            gpio_base,
            i2c_path: i2c_path.into(),
            i2c: None,
            exported: BTreeSet::new(),
        }
    }

    fn line_dir(&self, pin: u8) -> PathBuf {
        self.gpio_root.join(format!("gpio{}", self.gpio_base + u32::from(pin)))
    }

    fn export(&mut self, pin: u8) -> Result<PathBuf, BusError> {
        let dir = self.line_dir(pin);
        if dir.join("direction").exists() {
            return Ok(dir);
        }
        let export = self.gpio_root.join("export");
        fs::write(&export, (self.gpio_base + u32::from(pin)).to_string())
            .map_err(|e| BusError::io(export.display().to_string(), e))?;
        self.exported.insert(pin);
        // udev may need a moment to create the attribute files
        for _ in 0..10 {
            if dir.join("direction").exists() {
                return Ok(dir);
            }
            thread::sleep(Duration::from_millis(10));
        }
        Err(BusError::io(
            dir.display().to_string(),
            io::Error::new(io::ErrorKind::TimedOut, "exported line did not appear"),
        ))
    }

    fn write_attr(path: &Path, value: &str) -> Result<(), BusError> {
        fs::write(path, value).map_err(|e| BusError::io(path.display().to_string(), e))
    }

    fn read_attr(path: &Path) -> Result<String, BusError> {
        fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| BusError::io(path.display().to_string(), e))
    }
}

impl Bus for SysfsBus {
    fn setup_input(&mut self, pin: u8, pull: Pull) -> Result<(), BusError> {
        let dir = self.export(pin)?;
        if pull != Pull::None {
            debug!(pin, ?pull, "sysfs GPIO cannot set bias; relying on board pull configuration");
        }
        Self::write_attr(&dir.join("direction"), "in")
    }

    fn read_level(&mut self, pin: u8) -> Result<Level, BusError> {
        let dir = self.export(pin)?;
        let raw = Self::read_attr(&dir.join("value"))?;
        Ok(Level::from(raw == "1"))
    }

    fn setup_output(&mut self, pin: u8, initial: Level) -> Result<(), BusError> {
        let dir = self.export(pin)?;
        let value = if initial.is_high() { "high" } else { "low" };
        Self::write_attr(&dir.join("direction"), value)
    }

    fn write_level(&mut self, pin: u8, level: Level) -> Result<(), BusError> {
        let dir = self.export(pin)?;
        Self::write_attr(&dir.join("value"), if level.is_high() { "1" } else { "0" })
    }

    fn pin_mode(&mut self, pin: u8) -> Result<PinMode, BusError> {
        let direction = self.line_dir(pin).join("direction");
        if !direction.exists() {
            return Ok(PinMode::Unknown);
        }
        Ok(match Self::read_attr(&direction)?.as_str() {
            "in" => PinMode::Input,
            "out" => PinMode::Output,
            _ => PinMode::Unknown,
        })
    }

    fn open_i2c(&mut self) -> Result<(), BusError> {
        if self.i2c.is_some() {
            return Ok(());
        }
        match OpenOptions::new().read(true).write(true).open(&self.i2c_path) {
            Ok(f) => {
                self.i2c = Some(f);
                Ok(())
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => {
                Err(BusError::Unavailable(format!("{}: {}", self.i2c_path.display(), e)))
            }
            Err(e) => Err(BusError::io(self.i2c_path.display().to_string(), e)),
        }
    }

    fn i2c_probe(&mut self, addr: u8) -> Result<bool, BusError> {
        self.open_i2c()?;
        let fd = match &self.i2c {
            Some(f) => f.as_raw_fd(),
            None => return Err(BusError::Unavailable(self.i2c_path.display().to_string())),
        };
        let rc = unsafe { libc::ioctl(fd, I2C_SLAVE as _, libc::c_ulong::from(addr)) };
        if rc < 0 {
            return Err(BusError::io(format!("i2c address 0x{addr:02X}"), io::Error::last_os_error()));
        }
        let mut args = SmbusIoctlData {
            read_write: I2C_SMBUS_WRITE,
            command: 0,
            size: I2C_SMBUS_QUICK,
            data: std::ptr::null_mut(),
        };
        let rc = unsafe { libc::ioctl(fd, I2C_SMBUS as _, &mut args as *mut SmbusIoctlData) };
        Ok(rc >= 0)
    }

    fn read_attribute(&mut self, path: &Path) -> Result<String, BusError> {
        fs::read_to_string(path).map_err(|e| BusError::io(path.display().to_string(), e))
    }

    fn list_dir(&mut self, path: &Path) -> Result<Vec<String>, BusError> {
        let entries = fs::read_dir(path).map_err(|e| BusError::io(path.display().to_string(), e))?;
        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }
}

impl Drop for SysfsBus {
    fn drop(&mut self) {
        let unexport = self.gpio_root.join("unexport");
        for pin in std::mem::take(&mut self.exported) {
            if let Err(e) = fs::write(&unexport, (self.gpio_base + u32::from(pin)).to_string()) {
                warn!(pin, error = %e, "failed to unexport GPIO line");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_line(root: &Path, n: u32, direction: &str, value: &str) {
        let dir = root.join(format!("gpio{n}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("direction"), direction).unwrap();
        fs::write(dir.join("value"), value).unwrap();
    }

    #[test]
    fn test_reads_existing_line() {
        let tmp = TempDir::new().unwrap();
        fake_line(tmp.path(), 4, "in\n", "1\n");
        let mut bus = SysfsBus::new(tmp.path(), 0, tmp.path().join("i2c-1"));
        assert_eq!(bus.pin_mode(4).unwrap(), PinMode::Input);
        assert_eq!(bus.read_level(4).unwrap(), Level::High);
        assert_eq!(bus.pin_mode(5).unwrap(), PinMode::Unknown);
    }

    #[test]
    fn test_gpio_base_offset() {
        let tmp = TempDir::new().unwrap();
        fake_line(tmp.path(), 516, "out\n", "0\n");
        let mut bus = SysfsBus::new(tmp.path(), 512, tmp.path().join("i2c-1"));
        assert_eq!(bus.pin_mode(4).unwrap(), PinMode::Output);
        bus.write_level(4, Level::High).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("gpio516/value")).unwrap(), "1");
    }

    #[test]
    fn test_missing_adapter_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let mut bus = SysfsBus::new(tmp.path(), 0, tmp.path().join("i2c-9"));
        assert!(matches!(bus.open_i2c(), Err(BusError::Unavailable(_))));
        assert!(matches!(bus.i2c_probe(0x76), Err(BusError::Unavailable(_))));
    }

    #[test]
    fn test_list_dir_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("28-b")).unwrap();
        fs::create_dir_all(tmp.path().join("28-a")).unwrap();
        let mut bus = SysfsBus::new(tmp.path(), 0, tmp.path().join("i2c-1"));
        assert_eq!(bus.list_dir(tmp.path()).unwrap(), vec!["28-a".to_string(), "28-b".to_string()]);
    }
}
