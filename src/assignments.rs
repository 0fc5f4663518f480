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

//! Logical pin -> sensor assignments.
//!
//! Manual assignments always win. Detection only fills vacant pins, and
//! nothing here removes an entry on its own.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::plugin::RoleMap;
use crate::registry::Registry;

/// What a pin is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssignedSensor {
    Plugin(String),
    Role { plugin: String, role: String },
    /// A device on the I2C bus, refreshed without a driver.
    BusDevice,
}

impl AssignedSensor {
    pub fn plugin_name(&self) -> Option<&str> {
        match self {
            AssignedSensor::Plugin(name) => Some(name),
            AssignedSensor::Role { plugin, .. } => Some(plugin),
            AssignedSensor::BusDevice => None,
        }
    }
}

impl fmt::Display for AssignedSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignedSensor::Plugin(name) => f.write_str(name),
            AssignedSensor::Role { plugin, role } => write!(f, "{plugin}:{role}"),
            AssignedSensor::BusDevice => f.write_str("I2C"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Manual,
    Detected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub sensor: AssignedSensor,
    pub origin: Origin,
}

#[derive(Debug, Default)]
pub struct AssignmentStore {
    by_pin: BTreeMap<u8, Assignment>,
}

pub type SharedAssignments = Arc<Mutex<AssignmentStore>>;

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedAssignments {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Binds `pin` to `sensor`, replacing whatever was there.
    ///
    /// A role can only live on one pin; if it was bound elsewhere that pin
    /// is cleared and returned.
    pub fn assign_manual(&mut self, pin: u8, sensor: AssignedSensor) -> Option<u8> {
        let mut moved_from = None;
        if matches!(sensor, AssignedSensor::Role { .. }) {
            let previous = self
                .by_pin
                .iter()
                .find(|(p, a)| **p != pin && a.sensor == sensor)
                .map(|(p, _)| *p);
            if let Some(prev) = previous {
                self.by_pin.remove(&prev);
                moved_from = Some(prev);
            }
        }
        self.by_pin.insert(pin, Assignment { sensor, origin: Origin::Manual });
        moved_from
    }

    /// Records a detection. Returns false when the pin was already taken.
    pub fn record_detected(&mut self, pin: u8, plugin: &str) -> bool {
        if self.by_pin.contains_key(&pin) {
            return false;
        }
        self.by_pin.insert(
            pin,
            Assignment { sensor: AssignedSensor::Plugin(plugin.to_string()), origin: Origin::Detected },
        );
        true
    }

    pub fn get(&self, pin: u8) -> Option<&Assignment> {
        self.by_pin.get(&pin)
    }

    pub fn contains(&self, pin: u8) -> bool {
        self.by_pin.contains_key(&pin)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Assignment)> {
        self.by_pin.iter().map(|(p, a)| (*p, a))
    }

    pub fn len(&self) -> usize {
        self.by_pin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pin.is_empty()
    }

    pub fn role_pins(&self, plugin: &str) -> RoleMap {
        self.by_pin
            .iter()
            .filter_map(|(pin, a)| match &a.sensor {
                AssignedSensor::Role { plugin: p, role } if p == plugin => Some((role.clone(), *pin)),
                _ => None,
            })
            .collect()
    }

    /// Multi-pin plugins whose every role is bound.
    pub fn complete_groups(&self, registry: &Registry) -> Vec<(String, RoleMap)> {
        registry
            .plugins()
            .iter()
            .filter(|d| !d.pin_roles.is_empty())
            .filter_map(|d| {
                let roles = self.role_pins(&d.name);
                d.pin_roles
                    .iter()
                    .all(|r| roles.contains_key(r))
                    .then(|| (d.name.clone(), roles))
            })
            .collect()
    }
}
