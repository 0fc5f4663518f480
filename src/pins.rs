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

//! Pin identity map: physical header position <-> logical (BCM) line.
//!
//! The map is built once at startup and never mutated. Power and ground
//! positions carry no logical line.

use std::collections::HashMap;

use crate::pinout::PinoutEntry;

pub const HEADER_PINS: u8 = 40;

/// Logical line of the I2C data pin; bus probe results land on its row.
pub const I2C_SDA: u8 = 2;

const PHYS_TO_LOGICAL: [(u8, u8); 26] = [
    (3, 2), (5, 3), (7, 4), (8, 14), (10, 15), (11, 17), (12, 18), (13, 27), (15, 22),
    (16, 23), (18, 24), (19, 10), (21, 9), (22, 25), (23, 11), (24, 8), (26, 7),
    (29, 5), (31, 6), (32, 12), (33, 13), (35, 19), (36, 16), (37, 26), (38, 20), (40, 21),
];

const NON_GPIO: [(u8, &str); 14] = [
    (1, "3V3"), (2, "5V"), (4, "5V"), (6, "GND"), (9, "GND"), (14, "GND"), (17, "3V3"),
    (20, "GND"), (25, "GND"), (27, "ID_SD"), (28, "ID_SC"), (30, "GND"), (34, "GND"), (39, "GND"),
];

const RESERVED: [(u8, &str); 9] = [
    (2, "I2C SDA"), (3, "I2C SCL"), (14, "UART TX"), (15, "UART RX"), (10, "SPI MOSI"),
    (9, "SPI MISO"), (11, "SPI SCLK"), (8, "SPI CE0"), (7, "SPI CE1"),
];

const PWM_CAPABLE: [u8; 4] = [12, 13, 18, 19];

/// Fixed bus function of a logical line, if any.
pub fn reserved_function(logical: u8) -> Option<&'static str> {
    RESERVED.iter().find(|(l, _)| *l == logical).map(|(_, f)| *f)
}

pub fn is_reserved(logical: u8) -> bool {
    reserved_function(logical).is_some()
}

pub fn pwm_capable(logical: u8) -> bool {
    PWM_CAPABLE.contains(&logical)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinIdentity {
    pub physical: u8,
    pub logical: Option<u8>,
    pub reserved_function: Option<String>,
    /// Label for the board function column (`GPIO`, `3V3`, `GND`, `I2C SDA`, ...).
    pub function: String,
}

impl PinIdentity {
    fn new(physical: u8, logical: Option<u8>, name: &str) -> Self {
        let reserved_function = logical.and_then(reserved_function).map(str::to_string);
        let function = match (&reserved_function, logical) {
            (Some(f), _) => f.clone(),
            (None, Some(_)) if name.is_empty() => "GPIO".to_string(),
            _ => name.to_string(),
        };
        PinIdentity { physical, logical, reserved_function, function }
    }
}

#[derive(Debug, Clone)]
pub struct PinMap {
    pins: Vec<PinIdentity>,
    by_logical: HashMap<u8, u8>,
    placeholder: bool,
}

impl PinMap {
    /// The 40-pin J8 header of a Raspberry Pi.
    pub fn static_header() -> Self {
        let pins = (1..=HEADER_PINS)
            .map(|phys| {
                if let Some((_, logical)) = PHYS_TO_LOGICAL.iter().find(|(p, _)| *p == phys) {
                    PinIdentity::new(phys, Some(*logical), "GPIO")
                } else {
                    let name = NON_GPIO.iter().find(|(p, _)| *p == phys).map(|(_, n)| *n).unwrap_or("");
                    PinIdentity::new(phys, None, name)
                }
            })
            .collect();
        Self::from_identities(pins, false)
    }

    /// Every header position with no logical line, used when the host
    /// could not describe its pins.
    pub fn placeholder() -> Self {
        let pins = (1..=HEADER_PINS).map(|phys| PinIdentity::new(phys, None, "")).collect();
        Self::from_identities(pins, true)
    }

    /// Builds the map from host-provided entries, rejecting anything that
    /// would break the physical <-> logical bijection.
    pub fn from_entries(entries: &[PinoutEntry]) -> Result<Self, String> {
        if entries.is_empty() {
            return Err("no pin entries".to_string());
        }
        let mut seen_phys = HashMap::new();
        let mut seen_logical = HashMap::new();
        let mut pins = Vec::with_capacity(entries.len());
        for e in entries {
            if e.physical == 0 {
                return Err("physical pin 0 is not a header position".to_string());
            }
            if seen_phys.insert(e.physical, ()).is_some() {
                return Err(format!("physical pin {} listed twice", e.physical));
            }
            if let Some(l) = e.logical {
                if let Some(prev) = seen_logical.insert(l, e.physical) {
                    return Err(format!("logical line {} on physical pins {} and {}", l, prev, e.physical));
                }
            }
            pins.push(PinIdentity::new(e.physical, e.logical, &e.name));
        }
        pins.sort_by_key(|p| p.physical);
        Ok(Self::from_identities(pins, false))
    }

    fn from_identities(pins: Vec<PinIdentity>, placeholder: bool) -> Self {
        let by_logical = pins
            .iter()
            .filter_map(|p| p.logical.map(|l| (l, p.physical)))
            .collect();
        PinMap { pins, by_logical, placeholder }
    }

    pub fn logical_of(&self, physical: u8) -> Option<u8> {
        self.identity(physical).and_then(|p| p.logical)
    }

    /// Physical position of a logical line. Unmapped lines fall back to the
    /// input value so callers can still address a table row.
    pub fn physical_of(&self, logical: u8) -> u8 {
        self.by_logical.get(&logical).copied().unwrap_or(logical)
    }

    pub fn is_reserved(&self, logical: u8) -> bool {
        is_reserved(logical)
    }

    pub fn identity(&self, physical: u8) -> Option<&PinIdentity> {
        self.pins.iter().find(|p| p.physical == physical)
    }

    pub fn identity_for_logical(&self, logical: u8) -> Option<&PinIdentity> {
        self.by_logical.get(&logical).and_then(|phys| self.identity(*phys))
    }

    pub fn pins(&self) -> &[PinIdentity] {
        &self.pins
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}
