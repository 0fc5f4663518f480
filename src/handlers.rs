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

use tracing::debug;

use crate::app::App;
use crate::display::Display;

pub fn select_next(app: &mut App) {
    app.engine.display.lock().select_next();
}

pub fn select_prev(app: &mut App) {
    app.engine.display.lock().select_prev();
}

pub fn select_first(app: &mut App) {
    app.engine.display.lock().select_index(0);
}

pub fn select_last(app: &mut App) {
    app.engine.display.lock().select_index(usize::MAX);
}

pub fn page_down(app: &mut App) {
    let mut table = app.engine.display.lock();
    let idx = table.selected_index();
    table.select_index(idx.saturating_add(10));
}

pub fn page_up(app: &mut App) {
    let mut table = app.engine.display.lock();
    let idx = table.selected_index();
    table.select_index(idx.saturating_sub(10));
}

pub fn toggle_full_scan(app: &mut App) {
    app.engine.scans.toggle_full_scan();
}

pub fn toggle_bus_probe(app: &mut App) {
    app.engine.scans.toggle_bus_probe();
}

pub fn stop_scans(app: &mut App) {
    app.engine.scans.stop_all();
}

pub fn scan_selected(app: &mut App) {
    let Some(pin) = app.selected_pin() else { return };
    // Rejections are already on the status line
    if let Err(e) = app.engine.scans.scan_pin(&pin) {
        debug!(error = %e, "pin scan not started");
    }
}

pub fn show_details(app: &mut App) {
    let Some(pin) = app.selected_pin() else { return };
    app.engine.display.set_details(format!("Pin {}: reading...", pin.physical));
    let engine = app.engine.clone();
    tokio::spawn(async move {
        engine.details(&pin).await;
    });
}

pub fn load_summary(app: &mut App) {
    app.engine.display.set_summary("Loading pin summary...");
    let engine = app.engine.clone();
    tokio::spawn(async move {
        engine.refresh_summary().await;
    });
}

pub fn refresh_levels(app: &mut App) {
    app.refresh();
    app.engine.display.publish_status("Refreshing pin levels");
}

pub fn open_assign_popup(app: &mut App) {
    let Some(pin) = app.selected_pin() else { return };
    if pin.logical.is_none() {
        app.engine
            .display
            .publish_status(&format!("Pin {} ({}) cannot carry a sensor", pin.physical, pin.function));
        return;
    }
    app.catalog = app.engine.catalog();
    app.assign_idx = 0;
    app.assign_target = Some(pin);
    app.show_assign_popup = true;
}

pub fn assign_move(app: &mut App, delta: i32) {
    if app.catalog.is_empty() {
        return;
    }
    let last = app.catalog.len() - 1;
    app.assign_idx = if delta < 0 {
        app.assign_idx.saturating_sub(delta.unsigned_abs() as usize)
    } else {
        (app.assign_idx + delta as usize).min(last)
    };
}

pub fn apply_assignment(app: &mut App) {
    let target = app.assign_target.take();
    let entry = app.catalog.get(app.assign_idx).cloned();
    app.show_assign_popup = false;
    if let (Some(pin), Some(entry)) = (target, entry) {
        if let Err(e) = app.engine.assign(&pin, &entry) {
            debug!(error = %e, "assignment rejected");
        }
    }
}

pub fn cancel_assign_popup(app: &mut App) {
    app.show_assign_popup = false;
    app.assign_target = None;
}

pub fn toggle_help(app: &mut App) {
    app.show_help_popup = !app.show_help_popup;
}
