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

//! Wires the registry, bus, assignment store, display, scans and poll loop
//! together and exposes the operations the front ends call.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::assignments::{AssignedSensor, AssignmentStore, SharedAssignments};
use crate::bus::{Bus, HardwareCoordinator, PinMode};
use crate::config::Settings;
use crate::display::{mark_pin, Column, Display, PinTable, SharedDisplay};
use crate::error::SensorError;
use crate::logger::log_event;
use crate::pinout::summarize;
use crate::pins::{is_reserved, PinIdentity, PinMap};
use crate::plugin::{RoleMap, Severity};
use crate::poll::{self, PollContext, PollHandle};
use crate::registry::{CatalogEntry, Registry};
use crate::scan::{ScanContext, ScanCoordinator, ScanSettings};
use crate::system::run_pin_description;

#[derive(Clone)]
pub struct Engine {
    pub settings: Arc<Settings>,
    pub pins: Arc<PinMap>,
    pub registry: Arc<Registry>,
    pub hardware: HardwareCoordinator,
    pub assignments: SharedAssignments,
    pub display: SharedDisplay,
    pub scans: ScanCoordinator,
    pub poll: PollHandle,
}

impl Engine {
    /// Builds the engine and starts the poll loop on the current runtime.
    pub fn start(settings: Settings, pins: PinMap, registry: Registry, bus: Box<dyn Bus>) -> Self {
        Self::assemble(settings, pins, registry, bus, true)
    }

    /// Builds the engine without a poll loop, for one-shot commands.
    pub fn headless(settings: Settings, pins: PinMap, registry: Registry, bus: Box<dyn Bus>) -> Self {
        Self::assemble(settings, pins, registry, bus, false)
    }

    fn assemble(settings: Settings, pins: PinMap, registry: Registry, bus: Box<dyn Bus>, polling: bool) -> Self {
        let registry = Arc::new(registry);
        let hardware = HardwareCoordinator::new(bus);
        let assignments = AssignmentStore::shared();
        let display = SharedDisplay::new(PinTable::new(pins.clone()));
        let sink: Arc<dyn Display> = Arc::new(display.clone());

        let poll = if polling {
            poll::spawn(PollContext::new(
                &settings,
                registry.clone(),
                hardware.clone(),
                assignments.clone(),
                sink.clone(),
            ))
        } else {
            PollHandle::detached()
        };
        let scans = ScanCoordinator::new(ScanContext {
            registry: registry.clone(),
            hardware: hardware.clone(),
            assignments: assignments.clone(),
            display: sink,
            poll: poll.clone(),
            settings: ScanSettings::from_settings(&settings),
        });
        info!(plugins = registry.len(), pins = pins.len(), polling, "engine ready");

        Engine {
            settings: Arc::new(settings),
            pins: Arc::new(pins),
            registry,
            hardware,
            assignments,
            display,
            scans,
            poll,
        }
    }

    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.registry.catalog()
    }

    /// Manually binds a catalog entry to a pin. A role moved off another
    /// pin leaves that pin's row cleared.
    pub fn assign(&self, pin: &PinIdentity, entry: &CatalogEntry) -> Result<(), SensorError> {
        let Some(logical) = pin.logical else {
            self.display
                .publish_status(&format!("Pin {} has no GPIO line to assign", pin.physical));
            return Err(SensorError::MappingGap(pin.physical));
        };
        let moved_from = self.assignments.lock().assign_manual(logical, entry.target.clone());
        if let Some(prev) = moved_from {
            mark_pin(&self.display, prev, "-", Severity::Error);
        }
        self.display
            .set_cell(logical, Column::Sensor, &entry.target.to_string(), Severity::Normal);
        self.display.set_cell(logical, Column::Info, "manual", Severity::Normal);
        self.display
            .publish_status(&format!("Assigned {} to pin {}", entry.label, logical));
        log_event(
            "assigned",
            json!({ "pin": logical, "sensor": entry.target.to_string(), "moved_from": moved_from }),
        );
        Ok(())
    }

    /// Fetches and shows the detail text for a pin.
    pub async fn details(&self, pin: &PinIdentity) -> String {
        let text = self.detail_text(pin).await;
        self.display.set_details(text.clone());
        text
    }

    async fn detail_text(&self, pin: &PinIdentity) -> String {
        let none = format!("Pin {}: No sensor detected", pin.physical);
        let Some(logical) = pin.logical else {
            return none;
        };
        let (sensor, roles) = {
            let store = self.assignments.lock();
            let Some(a) = store.get(logical) else {
                return none;
            };
            let roles = match &a.sensor {
                AssignedSensor::Role { plugin, .. } => store.role_pins(plugin),
                _ => RoleMap::new(),
            };
            (a.sensor.clone(), roles)
        };
        let name = match &sensor {
            AssignedSensor::BusDevice => {
                let info = self.display.cell(logical, Column::Info).map(|c| c.text).unwrap_or_default();
                return format!("Pin {}\nSensor: I2C device\n{}", pin.physical, info);
            }
            AssignedSensor::Plugin(name) | AssignedSensor::Role { plugin: name, .. } => name.clone(),
        };
        let Some(desc) = self.registry.get(&name) else {
            return format!("Pin {}\nSensor: {}\nPlugin not loaded", pin.physical, name);
        };
        let driver = desc.driver.clone();
        let mut bus = self.hardware.acquire().await;
        driver.details(pin.physical, Some(logical), &roles, &mut bus).await
    }

    /// Re-reads mode and level of every unreserved GPIO line.
    pub async fn refresh_levels(&self) {
        let lines: Vec<u8> = self
            .pins
            .pins()
            .iter()
            .filter_map(|p| p.logical)
            .filter(|l| !is_reserved(*l))
            .collect();
        for line in lines {
            let sample = {
                let mut bus = self.hardware.acquire().await;
                bus.run(move |b| Ok((b.pin_mode(line)?, b.read_level(line)?))).await
            };
            match sample {
                Ok((mode, level)) => {
                    let mode_severity = if mode == PinMode::Unknown { Severity::Warn } else { Severity::Normal };
                    self.display.set_cell(line, Column::Mode, &mode.to_string(), mode_severity);
                    self.display.set_cell(line, Column::Level, &level.to_string(), Severity::Normal);
                }
                Err(e) => {
                    debug!(line, error = %e, "level refresh failed");
                    self.display.set_cell(line, Column::Mode, "N/A", Severity::Error);
                    self.display.set_cell(line, Column::Level, "N/A", Severity::Error);
                }
            }
        }
    }

    /// Re-runs the pin description command into the summary pane.
    pub async fn refresh_summary(&self) {
        let cfg = &self.settings.pinout;
        let text = run_pin_description(&cfg.command, Duration::from_millis(cfg.timeout_ms)).await;
        let summary = summarize(text.as_deref().unwrap_or(""), cfg.summary_lines);
        self.display.set_summary(summary);
    }

    pub async fn shutdown(&self) {
        self.scans.stop_all();
        self.poll.shutdown().await;
        info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use crate::bus::Level;
    use crate::test_utils::test_utils::{fast_settings, FakePlugin};
    use crate::registry::PluginSource;

    fn engine(plugins: Vec<Arc<FakePlugin>>, bus: MemoryBus) -> Engine {
        let mut registry = Registry::new();
        for p in plugins {
            registry.register(p, PluginSource::Runtime);
        }
        Engine::headless(fast_settings(), PinMap::static_header(), registry, Box::new(bus))
    }

    fn pin(engine: &Engine, logical: u8) -> PinIdentity {
        engine.pins.identity_for_logical(logical).cloned().unwrap()
    }

    fn entry(engine: &Engine, label: &str) -> CatalogEntry {
        engine.catalog().into_iter().find(|e| e.label == label).unwrap()
    }

    #[tokio::test]
    async fn test_assign_shows_manual() {
        let e = engine(vec![Arc::new(FakePlugin::new("Fake"))], MemoryBus::new());
        e.assign(&pin(&e, 17), &entry(&e, "Fake")).unwrap();
        assert_eq!(e.display.cell(17, Column::Sensor).unwrap().text, "Fake");
        assert_eq!(e.display.cell(17, Column::Info).unwrap().text, "manual");
        assert_eq!(e.display.status(), "Assigned Fake to pin 17");
    }

    #[tokio::test]
    async fn test_assign_to_power_pin_is_mapping_gap() {
        let e = engine(vec![], MemoryBus::new());
        let power = e.pins.identity(1).cloned().unwrap();
        let err = e.assign(&power, &entry(&e, "I2C Device"));
        assert!(matches!(err, Err(SensorError::MappingGap(1))));
        assert!(e.assignments.lock().is_empty());
    }

    #[tokio::test]
    async fn test_moving_role_clears_old_pin() {
        let e = engine(vec![Arc::new(FakePlugin::new("Disp").roles(&["CLK", "DIO"]))], MemoryBus::new());
        let clk = entry(&e, "Disp:CLK");
        e.assign(&pin(&e, 23), &clk).unwrap();
        e.assign(&pin(&e, 24), &clk).unwrap();
        assert!(!e.assignments.lock().contains(23));
        assert_eq!(e.display.cell(23, Column::Sensor).unwrap().text, "-");
        assert_eq!(e.display.cell(24, Column::Sensor).unwrap().text, "Disp:CLK");
    }

    #[tokio::test]
    async fn test_details() {
        let e = engine(vec![Arc::new(FakePlugin::new("Fake"))], MemoryBus::new());
        let p = pin(&e, 17);
        assert_eq!(e.details(&p).await, "Pin 11: No sensor detected");

        e.assign(&p, &entry(&e, "Fake")).unwrap();
        let text = e.details(&p).await;
        assert_eq!(text, "Pin 11\nSensor: Fake\nreading 17");
        assert_eq!(e.display.lock().details, text);
    }

    #[tokio::test]
    async fn test_refresh_levels_skips_reserved() {
        let bus = MemoryBus::new();
        bus.set_level(22, Level::High);
        let e = engine(vec![], bus);
        e.refresh_levels().await;
        assert_eq!(e.display.cell(22, Column::Level).unwrap().text, "HIGH");
        assert_eq!(e.display.cell(22, Column::Mode).unwrap().text, "INPUT");
        assert_eq!(e.display.cell(2, Column::Level).unwrap().text, "N/A");
    }
}
