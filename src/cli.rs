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

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;

#[derive(Debug, Parser)]
#[command(name = "sensortest", version, about = "GPIO sensor diagnostic tool")]
pub struct Cli {
    /// Settings file (JSON). Defaults to the per-user config location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Extra plugin directory; takes precedence over every other source.
    #[arg(long, global = true)]
    pub plugins_dir: Option<PathBuf>,

    /// Run against a simulated board instead of real hardware.
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Write a log file (default /tmp/sensortest.log).
    #[arg(long, global = true)]
    pub logging: bool,

    /// Write the log to this file; implies --logging.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Interactive pin table (default).
    Tui,
    /// List discovered plugins and the assignment catalog.
    Plugins,
    /// Run one scan without the interface and print the results.
    Scan {
        /// Scan only this GPIO line.
        #[arg(long, conflicts_with = "i2c")]
        pin: Option<u8>,
        /// Probe the I2C bus instead of the GPIO lines.
        #[arg(long)]
        i2c: bool,
    },
    /// Print the pin identity map.
    Pins,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Tui)
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging || self.log_file.is_some()
    }

    /// Command-line flags override file and environment settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.plugins_dir {
            settings.plugins.override_dir = Some(dir.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_tui() {
        let cli = Cli::parse_from(["sensortest"]);
        assert_eq!(cli.command(), Command::Tui);
        assert!(!cli.logging_enabled());
    }

    #[test]
    fn test_scan_pin_and_global_flags() {
        let cli = Cli::parse_from(["sensortest", "scan", "--pin", "4", "--simulate", "--log-file", "/tmp/x.log"]);
        assert_eq!(cli.command(), Command::Scan { pin: Some(4), i2c: false });
        assert!(cli.simulate);
        assert!(cli.logging_enabled());
    }

    #[test]
    fn test_pin_and_i2c_conflict() {
        assert!(Cli::try_parse_from(["sensortest", "scan", "--pin", "4", "--i2c"]).is_err());
    }

    #[test]
    fn test_plugins_dir_overrides_settings() {
        let cli = Cli::parse_from(["sensortest", "--plugins-dir", "/opt/p"]);
        let mut s = Settings::default();
        cli.apply(&mut s);
        assert_eq!(s.plugins.override_dir, Some(PathBuf::from("/opt/p")));
    }
}
