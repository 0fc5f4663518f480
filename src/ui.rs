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

pub mod ui_components;
pub mod ui_main;

use ratatui::Frame;

use crate::app::App;

pub fn ui(f: &mut Frame, app: &App) {
    let size = f.area();
    ui_main::render_main_view(f, app, size);

    if app.show_assign_popup {
        ui_components::render_assign_popup(f, app, size);
    }
    if app.show_help_popup {
        ui_components::render_help_popup(f, size);
    }
}
