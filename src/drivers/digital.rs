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

//! Sensors that report a single digital level: LM393 light comparator,
//! push button, PIR motion detector, and anything a manifest describes
//! through the `digital-input` factory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::bus::{BusHandle, Level, Pull};
use crate::plugin::{PluginIdentity, RoleMap, ScanResult, SensorPlugin};
use crate::registry::{DriverFactory, PluginManifest};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PullParam {
    None,
    Up,
    Down,
}

impl From<PullParam> for Pull {
    fn from(p: PullParam) -> Self {
        match p {
            PullParam::None => Pull::None,
            PullParam::Up => Pull::Up,
            PullParam::Down => Pull::Down,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DigitalParams {
    pull: Option<PullParam>,
    high: Option<String>,
    low: Option<String>,
    settle_ms: Option<u64>,
}

struct Preset {
    name: &'static str,
    pull: Pull,
    high: &'static str,
    low: &'static str,
    settle_ms: u64,
}

const GENERIC: Preset = Preset { name: "", pull: Pull::None, high: "HIGH", low: "LOW", settle_ms: 20 };
const LM393: Preset = Preset { name: "LM393", pull: Pull::None, high: "BRIGHT", low: "DARK", settle_ms: 20 };
const BUTTON: Preset = Preset { name: "Button", pull: Pull::Up, high: "RELEASED", low: "PRESSED", settle_ms: 20 };
const PIR: Preset = Preset { name: "PIR HC-SR501", pull: Pull::None, high: "MOTION", low: "NO MOTION", settle_ms: 50 };

pub struct DigitalInput {
    identity: PluginIdentity,
    pull: Pull,
    high: String,
    low: String,
    settle: Duration,
}

impl DigitalInput {
    fn from_manifest(preset: &Preset, manifest: &PluginManifest) -> Result<Self, String> {
        let params: DigitalParams = manifest.params()?;
        Ok(DigitalInput {
            identity: manifest.identity(PluginIdentity::new(preset.name, false, &[])),
            pull: params.pull.map(Pull::from).unwrap_or(preset.pull),
            high: params.high.unwrap_or_else(|| preset.high.to_string()),
            low: params.low.unwrap_or_else(|| preset.low.to_string()),
            settle: Duration::from_millis(params.settle_ms.unwrap_or(preset.settle_ms)),
        })
    }

    fn state(&self, level: Level) -> &str {
        if level.is_high() { &self.high } else { &self.low }
    }

    async fn sample(&self, pin: u8, bus: &mut BusHandle) -> Option<Level> {
        bus.setup_input(pin, self.pull).await.ok()?;
        bus.read_level(pin).await.ok()
    }
}

#[async_trait]
impl SensorPlugin for DigitalInput {
    fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    /// Two reads `settle` apart must agree.
    async fn detect(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
        let first = self.sample(pin, bus).await?;
        tokio::time::sleep(self.settle).await;
        let second = bus.read_level(pin).await.ok()?;
        (first == second).then(|| ScanResult::normal(self.name(), self.state(first)))
    }

    async fn read(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
        let level = self.sample(pin, bus).await?;
        Some(ScanResult::normal(self.name(), self.state(level)))
    }

    async fn read_with_roles(&self, roles: &RoleMap, bus: &mut BusHandle) -> Option<ScanResult> {
        let pin = *roles.values().next()?;
        self.read(pin, bus).await
    }

    async fn details(&self, physical: u8, logical: Option<u8>, roles: &RoleMap, bus: &mut BusHandle) -> String {
        let pin = roles.values().next().copied().or(logical);
        let state = match pin {
            Some(p) => self.read(p, bus).await.map(|r| r.info),
            None => None,
        };
        format!(
            "Pin {}\nSensor: {}\nState: {}",
            physical,
            self.name(),
            state.as_deref().unwrap_or("unknown")
        )
    }
}

pub(crate) fn create_generic(manifest: &PluginManifest) -> Result<Arc<dyn SensorPlugin>, String> {
    if manifest.name.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err("digital-input plugins need a name".to_string());
    }
    Ok(Arc::new(DigitalInput::from_manifest(&GENERIC, manifest)?))
}

fn create_lm393(manifest: &PluginManifest) -> Result<Arc<dyn SensorPlugin>, String> {
    Ok(Arc::new(DigitalInput::from_manifest(&LM393, manifest)?))
}

fn create_button(manifest: &PluginManifest) -> Result<Arc<dyn SensorPlugin>, String> {
    Ok(Arc::new(DigitalInput::from_manifest(&BUTTON, manifest)?))
}

fn create_pir(manifest: &PluginManifest) -> Result<Arc<dyn SensorPlugin>, String> {
    Ok(Arc::new(DigitalInput::from_manifest(&PIR, manifest)?))
}

inventory::submit! {
    DriverFactory { kind: "digital-input", order: 0, builtin: false, create: create_generic }
}

inventory::submit! {
    DriverFactory { kind: "button", order: 20, builtin: true, create: create_button }
}

inventory::submit! {
    DriverFactory { kind: "lm393", order: 50, builtin: true, create: create_lm393 }
}

inventory::submit! {
    DriverFactory { kind: "pir-hc-sr501", order: 60, builtin: true, create: create_pir }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::bus::HardwareCoordinator;
    use serde_json::json;

    fn manifest(factory: &str, params: serde_json::Value) -> PluginManifest {
        PluginManifest { factory: factory.into(), params, ..Default::default() }
    }

    #[tokio::test]
    async fn test_button_reports_pressed_when_low() {
        let mem = MemoryBus::new();
        let hw = HardwareCoordinator::new(Box::new(mem.clone()));
        let button = create_button(&PluginManifest::builtin("button")).unwrap();
        assert_eq!(button.name(), "Button");
        assert!(!button.auto_detectable());

        let mut bus = hw.acquire().await;
        // Pull-up with nothing attached reads high.
        assert_eq!(button.read(5, &mut bus).await.unwrap().info, "RELEASED");
        mem.set_level(5, Level::Low);
        assert_eq!(button.read(5, &mut bus).await.unwrap().info, "PRESSED");
    }

    #[tokio::test]
    async fn test_detect_requires_stable_level() {
        let mem = MemoryBus::new();
        mem.set_level(17, Level::High);
        let hw = HardwareCoordinator::new(Box::new(mem));
        let lm = create_lm393(&manifest("lm393", json!({"settle_ms": 1}))).unwrap();
        let mut bus = hw.acquire().await;
        let r = lm.detect(17, &mut bus).await.unwrap();
        assert_eq!((r.sensor_type.as_str(), r.info.as_str()), ("LM393", "BRIGHT"));
    }

    #[tokio::test]
    async fn test_failed_read_gives_unknown_details() {
        let mem = MemoryBus::new();
        mem.fail_pin(23);
        let hw = HardwareCoordinator::new(Box::new(mem));
        let pir = create_pir(&PluginManifest::builtin("pir-hc-sr501")).unwrap();
        let mut bus = hw.acquire().await;
        assert!(pir.read(23, &mut bus).await.is_none());
        assert_eq!(
            pir.details(16, Some(23), &RoleMap::new(), &mut bus).await,
            "Pin 16\nSensor: PIR HC-SR501\nState: unknown"
        );
    }

    #[test]
    fn test_generic_needs_name_and_valid_params() {
        assert!(create_generic(&manifest("digital-input", serde_json::Value::Null)).is_err());

        let mut m = manifest("digital-input", json!({"pull": "sideways"}));
        m.name = Some("Reed".into());
        assert!(create_generic(&m).is_err());

        let mut m = manifest("digital-input", json!({"pull": "up", "high": "OPEN", "low": "CLOSED"}));
        m.name = Some("Reed".into());
        m.auto_detectable = Some(true);
        let reed = create_generic(&m).unwrap();
        assert_eq!(reed.name(), "Reed");
        assert!(reed.auto_detectable());
    }
}
