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

use ratatui::layout::Rect;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use crate::plugin::Severity;

/// Helper function to create a centered rectangle for popups
pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

pub fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Normal => Style::default().fg(Color::Green),
        Severity::Warn => Style::default().fg(Color::Yellow),
        Severity::Error => Style::default().fg(Color::Red),
    }
}

/// Clips to `max` characters, not bytes.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Render the sensor assignment popup
pub fn render_assign_popup(f: &mut Frame, app: &App, size: Rect) {
    let area = centered_rect(50, 60, size);
    let title = match &app.assign_target {
        Some(pin) => format!(
            " Assign sensor to pin {} (GPIO{}) ",
            pin.physical,
            pin.logical.map(|l| l.to_string()).unwrap_or_default()
        ),
        None => " Assign sensor ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(inner);

    let items: Vec<ListItem> = app.catalog.iter().map(|e| ListItem::new(e.label.clone())).collect();
    let mut state = ListState::default();
    if !app.catalog.is_empty() {
        state.select(Some(app.assign_idx));
    }
    let list = List::new(items).highlight_style(Style::default().bg(Color::Blue).fg(Color::White));
    f.render_stateful_widget(list, rows[0], &mut state);

    let hint = Paragraph::new("Enter assign   Esc cancel").style(Style::default().fg(Color::Gray));
    f.render_widget(hint, rows[1]);
}

pub fn render_help_popup(f: &mut Frame, size: Rect) {
    let area = centered_rect(60, 60, size);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(" Keys ");
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let lines = vec![
        Line::styled("Scanning", bold),
        Line::from("  g        start/stop the GPIO scan (pauses polling)"),
        Line::from("  i        start/stop the I2C address scan"),
        Line::from("  p        scan the selected pin only"),
        Line::from("  x        stop every running scan"),
        Line::from(""),
        Line::styled("Pins", bold),
        Line::from("  Up/Down  select a pin (PgUp/PgDn/Home/End)"),
        Line::from("  a        assign a sensor to the selected pin"),
        Line::from("  Enter    show details for the selected pin"),
        Line::from("  r        re-read mode and level of every pin"),
        Line::from("  s        load the pin summary"),
        Line::from(""),
        Line::from("  q / Esc  quit            any key closes this"),
    ];
    f.render_widget(Clear, area);
    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), area);
}
