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

//! The contract every sensor driver satisfies.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bus::BusHandle;

/// How a result should be highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub sensor_type: String,
    pub info: String,
    pub severity: Severity,
}

impl ScanResult {
    pub fn new(sensor_type: impl Into<String>, info: impl Into<String>, severity: Severity) -> Self {
        ScanResult { sensor_type: sensor_type.into(), info: info.into(), severity }
    }

    pub fn normal(sensor_type: impl Into<String>, info: impl Into<String>) -> Self {
        Self::new(sensor_type, info, Severity::Normal)
    }

    pub fn warn(sensor_type: impl Into<String>, info: impl Into<String>) -> Self {
        Self::new(sensor_type, info, Severity::Warn)
    }
}

/// Role name -> logical pin, for multi-pin drivers.
pub type RoleMap = BTreeMap<String, u8>;

/// Identity shared by every driver: the registry key and capability flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginIdentity {
    pub name: String,
    pub auto_detectable: bool,
    pub pin_roles: Vec<String>,
}

impl PluginIdentity {
    pub fn new(name: &str, auto_detectable: bool, pin_roles: &[&str]) -> Self {
        PluginIdentity {
            name: name.to_string(),
            auto_detectable,
            pin_roles: pin_roles.iter().map(|r| r.to_string()).collect(),
        }
    }
}

/// A sensor driver.
///
/// `detect` is best effort and may take a while; callers bound it with a
/// timeout. Every method receives the bus handle already acquired, so a
/// driver can only touch hardware inside the caller's transaction.
#[async_trait]
pub trait SensorPlugin: Send + Sync {
    fn identity(&self) -> &PluginIdentity;

    fn name(&self) -> &str {
        &self.identity().name
    }

    fn auto_detectable(&self) -> bool {
        self.identity().auto_detectable
    }

    fn pin_roles(&self) -> &[String] {
        &self.identity().pin_roles
    }

    async fn detect(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult>;

    async fn read(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult>;

    async fn read_with_roles(&self, _roles: &RoleMap, _bus: &mut BusHandle) -> Option<ScanResult> {
        None
    }

    /// Human readable description for the detail pane. Never fails.
    async fn details(&self, physical: u8, logical: Option<u8>, roles: &RoleMap, bus: &mut BusHandle) -> String {
        let _ = roles;
        let pin = match logical {
            Some(l) => l,
            None => return unavailable_details(physical, self.name()),
        };
        match self.read(pin, bus).await {
            Some(r) => format!("Pin {}\nSensor: {}\n{}", physical, self.name(), r.info),
            None => unavailable_details(physical, self.name()),
        }
    }
}

pub fn unavailable_details(physical: u8, name: &str) -> String {
    format!("Pin {physical}\nSensor: {name}\nReading failed or unavailable")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::bus::HardwareCoordinator;

    struct Fixed {
        identity: PluginIdentity,
        result: Option<ScanResult>,
    }

    #[async_trait]
    impl SensorPlugin for Fixed {
        fn identity(&self) -> &PluginIdentity {
            &self.identity
        }
        async fn detect(&self, _pin: u8, _bus: &mut BusHandle) -> Option<ScanResult> {
            None
        }
        async fn read(&self, _pin: u8, _bus: &mut BusHandle) -> Option<ScanResult> {
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn test_default_details_and_roles() {
        let hw = HardwareCoordinator::new(Box::new(MemoryBus::new()));
        let ok = Fixed {
            identity: PluginIdentity::new("Probe", true, &[]),
            result: Some(ScanResult::normal("Probe", "42")),
        };
        let mut bus = hw.acquire().await;
        assert_eq!(ok.details(7, Some(4), &RoleMap::new(), &mut bus).await, "Pin 7\nSensor: Probe\n42");
        assert!(ok.read_with_roles(&RoleMap::new(), &mut bus).await.is_none());

        let broken = Fixed { identity: PluginIdentity::new("Broken", false, &[]), result: None };
        assert_eq!(
            broken.details(11, Some(17), &RoleMap::new(), &mut bus).await,
            "Pin 11\nSensor: Broken\nReading failed or unavailable"
        );
        assert_eq!(
            ok.details(1, None, &RoleMap::new(), &mut bus).await,
            unavailable_details(1, "Probe")
        );
    }
}
