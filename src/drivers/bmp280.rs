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

//! BMP280 pressure sensor presence check on the I2C bus.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::bus::BusHandle;
use crate::plugin::{PluginIdentity, RoleMap, ScanResult, SensorPlugin};
use crate::registry::{DriverFactory, PluginManifest};

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Params {
    addresses: Vec<u8>,
}

impl Default for Params {
    fn default() -> Self {
        Params { addresses: vec![0x76, 0x77] }
    }
}

pub struct Bmp280 {
    identity: PluginIdentity,
    addresses: Vec<u8>,
}

impl Bmp280 {
    async fn find(&self, bus: &mut BusHandle) -> Option<u8> {
        for &addr in &self.addresses {
            if let Ok(true) = bus.i2c_probe(addr).await {
                return Some(addr);
            }
        }
        None
    }
}

#[async_trait]
impl SensorPlugin for Bmp280 {
    fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    async fn detect(&self, _pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
        let addr = self.find(bus).await?;
        Some(ScanResult::warn(self.name(), format!("Addr 0x{addr:02X}")))
    }

    async fn read(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
        self.detect(pin, bus).await
    }

    async fn details(&self, physical: u8, _logical: Option<u8>, _roles: &RoleMap, bus: &mut BusHandle) -> String {
        let info = self.find(bus).await.map(|a| format!("I2C address: 0x{a:02X}"));
        super::reading_details(physical, self.name(), info)
    }
}

pub(crate) fn create(manifest: &PluginManifest) -> Result<Arc<dyn SensorPlugin>, String> {
    let params: Params = manifest.params()?;
    if params.addresses.iter().any(|a| *a > 0x7f) {
        return Err("I2C addresses are 7-bit".to_string());
    }
    Ok(Arc::new(Bmp280 {
        identity: manifest.identity(PluginIdentity::new("BMP280", false, &[])),
        addresses: params.addresses,
    }))
}

inventory::submit! {
    DriverFactory { kind: "bmp280", order: 10, builtin: true, create }
}
