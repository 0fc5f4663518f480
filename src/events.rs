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

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::App;
use crate::handlers::*;

/// Main event handler. Returns `Ok(true)` when the app should quit.
pub fn handle_key_event(app: &mut App, key_event: KeyEvent) -> anyhow::Result<bool> {
    let KeyEvent { code, modifiers, .. } = key_event;

    if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
        return Ok(true);
    }

    // Popups take every key while open
    if handle_popup_events(app, code)? {
        return Ok(false);
    }

    handle_global_events(app, code)
}

fn handle_popup_events(app: &mut App, code: KeyCode) -> anyhow::Result<bool> {
    if app.show_help_popup {
        app.show_help_popup = false;
        return Ok(true);
    }

    if app.show_assign_popup {
        match code {
            KeyCode::Esc => cancel_assign_popup(app),
            KeyCode::Enter => apply_assignment(app),
            KeyCode::Up | KeyCode::Char('k') => assign_move(app, -1),
            KeyCode::Down | KeyCode::Char('j') => assign_move(app, 1),
            KeyCode::PageUp => assign_move(app, -10),
            KeyCode::PageDown => assign_move(app, 10),
            _ => {}
        }
        return Ok(true);
    }

    Ok(false)
}

fn handle_global_events(app: &mut App, code: KeyCode) -> anyhow::Result<bool> {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
        KeyCode::Up | KeyCode::Char('k') => select_prev(app),
        KeyCode::Down | KeyCode::Char('j') => select_next(app),
        KeyCode::PageUp => page_up(app),
        KeyCode::PageDown => page_down(app),
        KeyCode::Home => select_first(app),
        KeyCode::End => select_last(app),
        KeyCode::Char('g') => toggle_full_scan(app),
        KeyCode::Char('i') => toggle_bus_probe(app),
        KeyCode::Char('x') => stop_scans(app),
        KeyCode::Char('p') => scan_selected(app),
        KeyCode::Char('a') => open_assign_popup(app),
        KeyCode::Enter => show_details(app),
        KeyCode::Char('s') => load_summary(app),
        KeyCode::Char('r') => refresh_levels(app),
        KeyCode::Char('?') | KeyCode::Char('h') => toggle_help(app),
        _ => {}
    }
    Ok(false)
}
