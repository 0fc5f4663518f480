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

//! DS18B20 one-wire thermometer, read through the kernel `w1-therm` driver.
//!
//! The one-wire overlay owns a single data line, so detection only
//! succeeds on that line.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::bus::BusHandle;
use crate::plugin::{PluginIdentity, RoleMap, ScanResult, SensorPlugin};
use crate::registry::{DriverFactory, PluginManifest};

const FAMILY_PREFIX: &str = "28-";
const MIN_C: f64 = -55.0;
const MAX_C: f64 = 125.0;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Params {
    w1_root: PathBuf,
    data_pin: u8,
}

impl Default for Params {
    fn default() -> Self {
        Params { w1_root: PathBuf::from("/sys/bus/w1/devices"), data_pin: 4 }
    }
}

pub struct Ds18b20 {
    identity: PluginIdentity,
    params: Params,
}

/// Temperature in °C from a `w1_slave` file, if the CRC line says `YES`.
pub fn parse_w1_slave(text: &str) -> Option<f64> {
    if !text.contains("YES") {
        return None;
    }
    let raw = text.split("t=").nth(1)?.split_whitespace().next()?;
    raw.parse::<i64>().ok().map(|milli| milli as f64 / 1000.0)
}

impl Ds18b20 {
    async fn temperature(&self, bus: &mut BusHandle) -> Option<f64> {
        let entries = bus.list_dir(self.params.w1_root.clone()).await.ok()?;
        let device = entries.into_iter().find(|e| e.starts_with(FAMILY_PREFIX))?;
        let text = bus
            .read_attribute(self.params.w1_root.join(&device).join("w1_slave"))
            .await
            .ok()?;
        let celsius = parse_w1_slave(&text)?;
        if !(MIN_C..=MAX_C).contains(&celsius) {
            debug!(device = %device, celsius, "DS18B20 reading out of range");
            return None;
        }
        Some(celsius)
    }

    async fn reading(&self, bus: &mut BusHandle) -> Option<ScanResult> {
        let t = self.temperature(bus).await?;
        Some(ScanResult::normal(self.name(), format!("{t:.1}°C")))
    }
}

#[async_trait]
impl SensorPlugin for Ds18b20 {
    fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    async fn detect(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
        if pin != self.params.data_pin {
            return None;
        }
        self.reading(bus).await
    }

    async fn read(&self, _pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
        self.reading(bus).await
    }

    async fn details(&self, physical: u8, _logical: Option<u8>, _roles: &RoleMap, bus: &mut BusHandle) -> String {
        let info = self.reading(bus).await.map(|r| format!("Temperature: {}", r.info));
        super::reading_details(physical, self.name(), info)
    }
}

pub(crate) fn create(manifest: &PluginManifest) -> Result<Arc<dyn SensorPlugin>, String> {
    Ok(Arc::new(Ds18b20 {
        identity: manifest.identity(PluginIdentity::new("DS18B20", true, &[])),
        params: manifest.params()?,
    }))
}

inventory::submit! {
    DriverFactory { kind: "ds18b20", order: 40, builtin: true, create }
}
