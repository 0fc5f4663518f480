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

//! Read-only settings. Nothing here is ever written back.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SensorError;
use crate::registry::PluginSources;

pub const PLUGINS_DIR_ENV: &str = "SENSOR_PLUGINS_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub first_pin: u8,
    pub last_pin: u8,
    pub plugin_timeout_ms: u64,
    pub pin_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig { first_pin: 2, last_pin: 27, plugin_timeout_ms: 500, pin_delay_ms: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct I2cConfig {
    pub bus: u8,
    pub first_address: u8,
    pub last_address: u8,
    pub probe_delay_ms: u64,
}

impl Default for I2cConfig {
    fn default() -> Self {
        I2cConfig { bus: 1, first_address: 0x03, last_address: 0x77, probe_delay_ms: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub item_delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig { interval_ms: 10_000, item_delay_ms: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HardwareConfig {
    /// Size of the blocking worker pool that runs bus transactions.
    pub worker_threads: usize,
    pub gpio_root: PathBuf,
    /// Offset of the first line of the header's GPIO chip in sysfs numbering.
    pub gpio_base: u32,
    pub device_root: PathBuf,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        HardwareConfig {
            worker_threads: 2,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            gpio_base: 0,
            device_root: PathBuf::from("/dev"),
        }
    }
}

impl HardwareConfig {
    pub fn i2c_device(&self, bus: u8) -> PathBuf {
        self.device_root.join(format!("i2c-{bus}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    pub builtins: bool,
    pub dirs: Vec<PathBuf>,
    pub override_dir: Option<PathBuf>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        PluginConfig {
            builtins: true,
            dirs: vec![PathBuf::from("/usr/share/sensortest/plugins"), PathBuf::from("plugins")],
            override_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PinoutConfig {
    pub command: Vec<String>,
    pub timeout_ms: u64,
    pub summary_lines: usize,
}

impl Default for PinoutConfig {
    fn default() -> Self {
        PinoutConfig { command: vec!["pinout".to_string()], timeout_ms: 3000, summary_lines: 18 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub scan: ScanConfig,
    pub i2c: I2cConfig,
    pub poll: PollConfig,
    pub hardware: HardwareConfig,
    pub plugins: PluginConfig,
    pub pinout: PinoutConfig,
}

impl Settings {
    pub fn plugin_sources(&self) -> PluginSources {
        PluginSources {
            builtins: self.plugins.builtins,
            dirs: self.plugins.dirs.clone(),
            override_dir: self.plugins.override_dir.clone(),
        }
    }

    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_millis(self.scan.plugin_timeout_ms)
    }
}

pub fn config_path() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        return Path::new(&xdg).join("sensortest").join("config.json");
    }
    if let Ok(home) = env::var("HOME") {
        return Path::new(&home).join(".config").join("sensortest").join("config.json");
    }
    PathBuf::from("/etc/sensortest/config.json")
}

fn parse_settings(path: &Path) -> Result<Settings, SensorError> {
    let data = fs::read_to_string(path)
        .map_err(|e| SensorError::Config(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&data).map_err(|e| SensorError::Config(format!("{}: parse error: {}", path.display(), e)))
}

/// Loads settings, then applies the environment override and validates.
///
/// An explicitly named file must exist and parse. The default location is
/// optional and falls back to built-in defaults when absent or broken.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, SensorError> {
    let mut settings = match explicit {
        Some(path) => parse_settings(path)?,
        None => {
            let path = config_path();
            if path.exists() {
                match parse_settings(&path) {
                    Ok(s) => {
                        info!(path = %path.display(), "loaded settings");
                        s
                    }
                    Err(e) => {
                        warn!(error = %e, "ignoring unreadable settings file");
                        Settings::default()
                    }
                }
            } else {
                Settings::default()
            }
        }
    };
    apply_env(&mut settings);
    validate_settings(&settings).map_err(SensorError::Config)?;
    Ok(settings)
}

pub fn apply_env(settings: &mut Settings) {
    if let Ok(dir) = env::var(PLUGINS_DIR_ENV) {
        if !dir.trim().is_empty() {
            info!(dir = %dir, "{} set", PLUGINS_DIR_ENV);
            settings.plugins.override_dir = Some(PathBuf::from(dir));
        }
    }
}

pub fn validate_settings(s: &Settings) -> Result<(), String> {
    if s.scan.first_pin > s.scan.last_pin {
        return Err(format!("scan range {}..{} is empty", s.scan.first_pin, s.scan.last_pin));
    }
    if s.scan.last_pin > 53 {
        return Err("scan range exceeds the last GPIO line (53)".to_string());
    }
    if s.scan.plugin_timeout_ms == 0 {
        return Err("scan.plugin_timeout_ms must be positive".to_string());
    }
    if s.i2c.first_address > s.i2c.last_address || s.i2c.last_address > 0x7f {
        return Err("i2c address range must lie within 0x00..0x7f".to_string());
    }
    if s.poll.interval_ms == 0 {
        return Err("poll.interval_ms must be positive".to_string());
    }
    if s.hardware.worker_threads == 0 || s.hardware.worker_threads > 64 {
        return Err("hardware.worker_threads must be between 1 and 64".to_string());
    }
    if s.pinout.command.is_empty() || s.pinout.command[0].trim().is_empty() {
        return Err("pinout.command must name a program".to_string());
    }
    if s.pinout.timeout_ms == 0 {
        return Err("pinout.timeout_ms must be positive".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let s = Settings::default();
        assert!(validate_settings(&s).is_ok());
        assert_eq!(s.scan.plugin_timeout_ms, 500);
        assert_eq!(s.poll.interval_ms, 10_000);
        assert_eq!(s.i2c.last_address, 0x77);
        assert_eq!(s.hardware.i2c_device(1), PathBuf::from("/dev/i2c-1"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{"scan": {{"plugin_timeout_ms": 250}}, "poll": {{"interval_ms": 2000}}}}"#).unwrap();
        let s = parse_settings(f.path()).unwrap();
        assert_eq!(s.scan.plugin_timeout_ms, 250);
        assert_eq!(s.scan.first_pin, 2);
        assert_eq!(s.poll.interval_ms, 2000);
        assert_eq!(s.poll.item_delay_ms, 100);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{"scan": {{"bogus": 1}}}}"#).unwrap();
        assert!(matches!(parse_settings(f.path()), Err(SensorError::Config(_))));
    }

    #[test]
    fn test_validation_errors() {
        let mut s = Settings::default();
        s.scan.first_pin = 30;
        s.scan.last_pin = 2;
        assert!(validate_settings(&s).is_err());

        let mut s = Settings::default();
        s.hardware.worker_threads = 0;
        assert!(validate_settings(&s).is_err());

        let mut s = Settings::default();
        s.pinout.command.clear();
        assert!(validate_settings(&s).is_err());
    }

    #[test]
    #[serial]
    fn test_explicit_missing_file_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/sensortest.json")));
        assert!(matches!(err, Err(SensorError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_override_dir() {
        env::set_var(PLUGINS_DIR_ENV, "/opt/my-plugins");
        let mut s = Settings::default();
        apply_env(&mut s);
        env::remove_var(PLUGINS_DIR_ENV);
        assert_eq!(s.plugins.override_dir, Some(PathBuf::from("/opt/my-plugins")));
        assert_eq!(s.plugin_sources().override_dir, Some(PathBuf::from("/opt/my-plugins")));
    }

    #[test]
    #[serial]
    fn test_config_path_prefers_xdg() {
        let old = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", "/tmp/xdg-test");
        assert_eq!(config_path(), PathBuf::from("/tmp/xdg-test/sensortest/config.json"));
        match old {
            Some(v) => env::set_var("XDG_CONFIG_HOME", v),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }
}
