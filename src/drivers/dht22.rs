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

//! DHT22 temperature/humidity sensor via the kernel `dht11` IIO driver.
//!
//! The driver is bound by a device-tree overlay whose node is named
//! `dht11@<line in hex>`; that node tells us which line the sensor is on.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::bus::BusHandle;
use crate::plugin::{PluginIdentity, RoleMap, ScanResult, SensorPlugin};
use crate::registry::{DriverFactory, PluginManifest};

const IIO_NAME: &str = "dht11";

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Params {
    device_tree: PathBuf,
    iio_root: PathBuf,
    attempts: u32,
    retry_delay_ms: u64,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            device_tree: PathBuf::from("/proc/device-tree"),
            iio_root: PathBuf::from("/sys/bus/iio/devices"),
            attempts: 2,
            retry_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Climate {
    pub celsius: f64,
    pub humidity: f64,
}

impl Climate {
    fn plausible(&self) -> bool {
        (-40.0..=80.0).contains(&self.celsius) && (0.0..=100.0).contains(&self.humidity)
    }
}

pub struct Dht22 {
    identity: PluginIdentity,
    params: Params,
}

fn parse_milli(text: &str) -> Option<f64> {
    text.trim().parse::<i64>().ok().map(|v| v as f64 / 1000.0)
}

impl Dht22 {
    async fn overlay_on(&self, pin: u8, bus: &mut BusHandle) -> bool {
        let node = format!("{IIO_NAME}@{pin:x}");
        match bus.list_dir(self.params.device_tree.clone()).await {
            Ok(entries) => entries.iter().any(|e| *e == node),
            Err(_) => false,
        }
    }

    async fn iio_device(&self, bus: &mut BusHandle) -> Option<PathBuf> {
        let entries = bus.list_dir(self.params.iio_root.clone()).await.ok()?;
        for entry in entries.iter().filter(|e| e.starts_with("iio:device")) {
            let dir = self.params.iio_root.join(entry);
            if let Ok(name) = bus.read_attribute(dir.join("name")).await {
                if name.trim() == IIO_NAME {
                    return Some(dir);
                }
            }
        }
        None
    }

    async fn sample(&self, dir: &Path, bus: &mut BusHandle) -> Option<Climate> {
        let t = bus.read_attribute(dir.join("in_temp_input")).await.ok()?;
        let h = bus.read_attribute(dir.join("in_humidityrelative_input")).await.ok()?;
        Some(Climate { celsius: parse_milli(&t)?, humidity: parse_milli(&h)? })
    }

    /// The kernel driver fails the odd transfer, so a bad sample is retried.
    async fn climate(&self, pin: u8, bus: &mut BusHandle) -> Option<Climate> {
        if !self.overlay_on(pin, bus).await {
            return None;
        }
        let dir = self.iio_device(bus).await?;
        for attempt in 0..self.params.attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(self.params.retry_delay_ms)).await;
            }
            match self.sample(&dir, bus).await {
                Some(c) if c.plausible() => return Some(c),
                other => debug!(pin, attempt, sample = ?other, "DHT22 sample rejected"),
            }
        }
        None
    }

    async fn reading(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
        let c = self.climate(pin, bus).await?;
        Some(ScanResult::normal(self.name(), format!("{:.1}°C / {:.1}%", c.celsius, c.humidity)))
    }
}

#[async_trait]
impl SensorPlugin for Dht22 {
    fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    async fn detect(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
        self.reading(pin, bus).await
    }

    async fn read(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
        self.reading(pin, bus).await
    }

    async fn details(&self, physical: u8, logical: Option<u8>, _roles: &RoleMap, bus: &mut BusHandle) -> String {
        let climate = match logical {
            Some(pin) => self.climate(pin, bus).await,
            None => None,
        };
        let info = climate.map(|c| format!("Temperature: {:.1}°C\nHumidity: {:.1}%", c.celsius, c.humidity));
        super::reading_details(physical, self.name(), info)
    }
}

pub(crate) fn create(manifest: &PluginManifest) -> Result<Arc<dyn SensorPlugin>, String> {
    Ok(Arc::new(Dht22 {
        identity: manifest.identity(PluginIdentity::new("DHT22", true, &[])),
        params: manifest.params()?,
    }))
}

inventory::submit! {
    DriverFactory { kind: "dht22", order: 30, builtin: true, create }
}
