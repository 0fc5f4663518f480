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

//! The display boundary the engine writes to, and the pin table that
//! implements it for the terminal front end.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::pins::{pwm_capable, PinIdentity, PinMap};
use crate::plugin::{ScanResult, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Mode,
    Level,
    Sensor,
    Info,
}

/// Sink for everything the engine wants the user to see.
///
/// `pin` is always a logical line. Updates are idempotent.
#[cfg_attr(test, mockall::automock)]
pub trait Display: Send + Sync {
    fn set_cell(&self, pin: u8, column: Column, text: &str, severity: Severity);
    fn selected_pin(&self) -> Option<PinIdentity>;
    fn publish_status(&self, text: &str);
}

/// Writes a driver result into the sensor and info columns.
pub fn publish_result(display: &dyn Display, pin: u8, result: &ScanResult) {
    display.set_cell(pin, Column::Sensor, &result.sensor_type, result.severity);
    display.set_cell(pin, Column::Info, &result.info, result.severity);
}

/// Transient marker in the sensor column with an empty info cell.
pub fn mark_pin(display: &dyn Display, pin: u8, text: &str, severity: Severity) {
    display.set_cell(pin, Column::Sensor, text, severity);
    display.set_cell(pin, Column::Info, "", severity);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    pub severity: Severity,
}

impl Cell {
    fn new(text: &str, severity: Severity) -> Self {
        Cell { text: text.to_string(), severity }
    }
}

#[derive(Debug, Clone)]
pub struct PinRow {
    pub identity: PinIdentity,
    pub mode: Cell,
    pub level: Cell,
    pub sensor: Cell,
    pub info: Cell,
}

#[derive(Debug)]
pub struct PinTable {
    pins: PinMap,
    rows: Vec<PinRow>,
    selected: usize,
    pub status: String,
    pub summary: String,
    pub details: String,
}

impl PinTable {
    pub fn new(pins: PinMap) -> Self {
        let rows = pins
            .pins()
            .iter()
            .map(|p| PinRow {
                identity: p.clone(),
                mode: Cell::new("N/A", Severity::Normal),
                level: Cell::new("N/A", Severity::Normal),
                sensor: Cell::new("-", Severity::Error),
                info: Cell::new(
                    match p.logical {
                        Some(l) if pwm_capable(l) => "PWM:Y",
                        Some(_) => "PWM:N",
                        None => "",
                    },
                    Severity::Normal,
                ),
            })
            .collect();
        let status = if pins.is_placeholder() {
            "No pin info from system tools; showing placeholders".to_string()
        } else {
            String::new()
        };
        PinTable {
            pins,
            rows,
            selected: 0,
            status,
            summary: "Press 's' to load the pin summary".to_string(),
            details: String::new(),
        }
    }

    pub fn rows(&self) -> &[PinRow] {
        &self.rows
    }

    pub fn pins(&self) -> &PinMap {
        &self.pins
    }

    /// Row for a logical line, using the identity fallback for unmapped lines.
    pub fn row_for(&self, pin: u8) -> Option<&PinRow> {
        let physical = self.pins.physical_of(pin);
        self.rows.iter().find(|r| r.identity.physical == physical)
    }

    fn row_for_mut(&mut self, pin: u8) -> Option<&mut PinRow> {
        let physical = self.pins.physical_of(pin);
        self.rows.iter_mut().find(|r| r.identity.physical == physical)
    }

    pub fn set_cell(&mut self, pin: u8, column: Column, text: &str, severity: Severity) {
        if let Some(row) = self.row_for_mut(pin) {
            let cell = match column {
                Column::Mode => &mut row.mode,
                Column::Level => &mut row.level,
                Column::Sensor => &mut row.sensor,
                Column::Info => &mut row.info,
            };
            *cell = Cell::new(text, severity);
        }
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&PinRow> {
        self.rows.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.rows.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_index(&mut self, idx: usize) {
        if !self.rows.is_empty() {
            self.selected = idx.min(self.rows.len() - 1);
        }
    }
}

/// The pin table shared between the engine tasks and the renderer.
#[derive(Clone)]
pub struct SharedDisplay {
    inner: Arc<Mutex<PinTable>>,
}

impl SharedDisplay {
    pub fn new(table: PinTable) -> Self {
        SharedDisplay { inner: Arc::new(Mutex::new(table)) }
    }

    pub fn lock(&self) -> MutexGuard<'_, PinTable> {
        self.inner.lock()
    }

    pub fn set_details(&self, text: impl Into<String>) {
        self.inner.lock().details = text.into();
    }

    pub fn set_summary(&self, text: impl Into<String>) {
        self.inner.lock().summary = text.into();
    }

    pub fn status(&self) -> String {
        self.inner.lock().status.clone()
    }

    pub fn cell(&self, pin: u8, column: Column) -> Option<Cell> {
        let table = self.inner.lock();
        table.row_for(pin).map(|r| match column {
            Column::Mode => r.mode.clone(),
            Column::Level => r.level.clone(),
            Column::Sensor => r.sensor.clone(),
            Column::Info => r.info.clone(),
        })
    }
}

impl Display for SharedDisplay {
    fn set_cell(&self, pin: u8, column: Column, text: &str, severity: Severity) {
        self.inner.lock().set_cell(pin, column, text, severity);
    }

    fn selected_pin(&self) -> Option<PinIdentity> {
        self.inner.lock().selected().map(|r| r.identity.clone())
    }

    fn publish_status(&self, text: &str) {
        self.inner.lock().status = text.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_initial_rows() {
        let table = PinTable::new(PinMap::static_header());
        assert_eq!(table.rows().len(), 40);
        let row = table.row_for(18).unwrap();
        assert_eq!(row.identity.physical, 12);
        assert_eq!(row.info.text, "PWM:Y");
        assert_eq!(row.sensor.text, "-");
        assert_eq!(table.row_for(4).unwrap().info.text, "PWM:N");
    }

    #[test]
    fn test_set_cell_addresses_logical_line() {
        let shared = SharedDisplay::new(PinTable::new(PinMap::static_header()));
        shared.set_cell(4, Column::Sensor, "DS18B20", Severity::Normal);
        let table = shared.lock();
        let row = table.rows().iter().find(|r| r.identity.physical == 7).unwrap();
        assert_eq!(row.sensor.text, "DS18B20");
    }

    #[test]
    fn test_placeholder_rows_use_identity_fallback() {
        let shared = SharedDisplay::new(PinTable::new(PinMap::placeholder()));
        assert!(shared.status().contains("placeholders"));
        shared.set_cell(4, Column::Info, "x", Severity::Warn);
        assert_eq!(shared.lock().rows()[3].info.text, "x");
    }

    #[test]
    fn test_selection_bounds() {
        let mut table = PinTable::new(PinMap::static_header());
        table.select_prev();
        assert_eq!(table.selected_index(), 0);
        table.select_index(100);
        assert_eq!(table.selected_index(), 39);
        table.select_next();
        assert_eq!(table.selected_index(), 39);
        assert_eq!(table.selected().unwrap().identity.physical, 40);
    }

    #[test]
    fn test_publish_result_writes_both_columns() {
        let mut mock = MockDisplay::new();
        mock.expect_set_cell()
            .with(eq(4u8), eq(Column::Sensor), eq("DHT22"), eq(Severity::Normal))
            .times(1)
            .return_const(());
        mock.expect_set_cell()
            .with(eq(4u8), eq(Column::Info), eq("21.4°C / 48.2%"), eq(Severity::Normal))
            .times(1)
            .return_const(());
        publish_result(&mock, 4, &ScanResult::normal("DHT22", "21.4°C / 48.2%"));
    }
}
