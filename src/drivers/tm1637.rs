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

//! TM1637 four-digit LED display on two lines (CLK and DIO).
//!
//! There is nothing to read back from the chip, so a "reading" writes the
//! current time to the display and reports what was written.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Timelike};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::bus::{Bus, BusHandle, Level};
use crate::error::BusError;
use crate::plugin::{PluginIdentity, RoleMap, ScanResult, SensorPlugin};
use crate::registry::{DriverFactory, PluginManifest};

pub const CLK_ENV: &str = "TM1637_CLK_PIN";
pub const DIO_ENV: &str = "TM1637_DIO_PIN";

const DIGITS: [u8; 10] = [0x3f, 0x06, 0x5b, 0x4f, 0x66, 0x6d, 0x7d, 0x07, 0x7f, 0x6f];
const COLON: u8 = 0x80;

const CMD_DATA_AUTO: u8 = 0x40;
const CMD_ADDRESS: u8 = 0xC0;
const CMD_DISPLAY_ON: u8 = 0x88;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Params {
    brightness: u8,
}

impl Default for Params {
    fn default() -> Self {
        Params { brightness: 7 }
    }
}

/// Segment bytes for `HH:MM`, colon lit.
pub fn clock_segments(hour: u32, minute: u32) -> [u8; 4] {
    let d = |v: u32| DIGITS[(v % 10) as usize];
    [d(hour / 10), d(hour) | COLON, d(minute / 10), d(minute)]
}

struct Wire<'a> {
    bus: &'a mut dyn Bus,
    clk: u8,
    dio: u8,
}

impl Wire<'_> {
    fn start(&mut self) -> Result<(), BusError> {
        self.bus.write_level(self.dio, Level::Low)
    }

    fn stop(&mut self) -> Result<(), BusError> {
        self.bus.write_level(self.clk, Level::Low)?;
        self.bus.write_level(self.dio, Level::Low)?;
        self.bus.write_level(self.clk, Level::High)?;
        self.bus.write_level(self.dio, Level::High)
    }

    /// LSB first; the ACK clock is issued but the ACK bit is not checked.
    fn byte(&mut self, byte: u8) -> Result<(), BusError> {
        for i in 0..8 {
            self.bus.write_level(self.clk, Level::Low)?;
            self.bus.write_level(self.dio, Level::from((byte >> i) & 1 == 1))?;
            self.bus.write_level(self.clk, Level::High)?;
        }
        self.bus.write_level(self.clk, Level::Low)?;
        self.bus.write_level(self.dio, Level::High)?;
        self.bus.write_level(self.clk, Level::High)?;
        self.bus.write_level(self.clk, Level::Low)
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.start()?;
        for b in bytes {
            self.byte(*b)?;
        }
        self.stop()
    }
}

fn write_frame(bus: &mut dyn Bus, clk: u8, dio: u8, segments: [u8; 4], brightness: u8) -> Result<(), BusError> {
    bus.setup_output(clk, Level::High)?;
    bus.setup_output(dio, Level::High)?;
    let mut wire = Wire { bus, clk, dio };
    wire.command(&[CMD_DATA_AUTO])?;
    let mut frame = vec![CMD_ADDRESS];
    frame.extend_from_slice(&segments);
    wire.command(&frame)?;
    wire.command(&[CMD_DISPLAY_ON | (brightness & 0x07)])
}

fn env_pin(var: &str) -> Option<u8> {
    env::var(var).ok()?.trim().parse().ok()
}

pub struct Tm1637 {
    identity: PluginIdentity,
    brightness: u8,
    last: Mutex<Option<String>>,
}

impl Tm1637 {
    async fn show_time(&self, clk: u8, dio: u8, bus: &mut BusHandle) -> Result<String, BusError> {
        let now = Local::now();
        let segments = clock_segments(now.hour(), now.minute());
        let brightness = self.brightness;
        bus.run(move |b| write_frame(b, clk, dio, segments, brightness)).await?;
        let message = format!("Displayed time {:02}:{:02}", now.hour(), now.minute());
        *self.last.lock() = Some(message.clone());
        Ok(message)
    }

    fn role_pins(roles: &RoleMap) -> (Option<u8>, Option<u8>) {
        (roles.get("CLK").copied(), roles.get("DIO").copied())
    }
}

#[async_trait]
impl SensorPlugin for Tm1637 {
    fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    async fn detect(&self, _pin: u8, _bus: &mut BusHandle) -> Option<ScanResult> {
        None
    }

    async fn read(&self, _pin: u8, _bus: &mut BusHandle) -> Option<ScanResult> {
        let last = self.last.lock().clone();
        last.map(|m| ScanResult::warn(self.name(), m))
    }

    async fn read_with_roles(&self, roles: &RoleMap, bus: &mut BusHandle) -> Option<ScanResult> {
        let (Some(clk), Some(dio)) = Self::role_pins(roles) else {
            return None;
        };
        match self.show_time(clk, dio, bus).await {
            Ok(message) => Some(ScanResult::warn(self.name(), message)),
            Err(e) => {
                debug!(clk, dio, error = %e, "TM1637 write failed");
                None
            }
        }
    }

    async fn details(&self, physical: u8, _logical: Option<u8>, roles: &RoleMap, bus: &mut BusHandle) -> String {
        let (clk, dio) = Self::role_pins(roles);
        let clk = clk.or_else(|| env_pin(CLK_ENV));
        let dio = dio.or_else(|| env_pin(DIO_ENV));
        let (Some(clk), Some(dio)) = (clk, dio) else {
            return format!(
                "Pin {}\nSensor: {}\nAssign {}:CLK and {}:DIO to two pins,\nor set {} and {}.",
                physical,
                self.name(),
                self.name(),
                self.name(),
                CLK_ENV,
                DIO_ENV
            );
        };
        let outcome = match self.show_time(clk, dio, bus).await {
            Ok(message) => message,
            Err(e) => format!("Display error: {e}"),
        };
        format!("Pin {}\nSensor: {}\nCLK={} DIO={}\n{}", physical, self.name(), clk, dio, outcome)
    }
}

pub(crate) fn create(manifest: &PluginManifest) -> Result<Arc<dyn SensorPlugin>, String> {
    let params: Params = manifest.params()?;
    Ok(Arc::new(Tm1637 {
        identity: manifest.identity(PluginIdentity::new("TM1637", false, &["CLK", "DIO"])),
        brightness: params.brightness,
        last: Mutex::new(None),
    }))
}

inventory::submit! {
    DriverFactory { kind: "tm1637", order: 70, builtin: true, create }
}
