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

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use super::ui_components::{severity_style, truncate};
use crate::app::App;
use crate::display::{PinRow, PinTable};
use crate::scan::{ScanKind, ScanTaskState};

/// Render the main view: header | pin table + side panes | status | keys
pub fn render_main_view(f: &mut Frame, app: &App, size: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(8),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(size);

    render_header(f, app, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(chunks[1]);
    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(body[1]);

    let table = app.engine.display.lock();
    render_pin_table(f, &table, body[0]);
    render_text_pane(f, " Pin Summary ", &table.summary, side[0]);
    render_text_pane(f, " Details ", &table.details, side[1]);

    let status = Paragraph::new(format!(" {}", table.status)).style(Style::default().fg(Color::Yellow));
    f.render_widget(status, chunks[2]);
    drop(table);

    let keys = Paragraph::new(
        " g GPIO scan  i I2C scan  x stop  p scan pin  a assign  Enter details  s summary  r levels  ? help  q quit",
    )
    .style(Style::default().fg(Color::Gray));
    f.render_widget(keys, chunks[3]);
}

fn scan_label(app: &App, kind: ScanKind) -> &'static str {
    match app.engine.scans.state(kind) {
        ScanTaskState::Running => "running",
        ScanTaskState::Cancelling => "stopping",
        ScanTaskState::Completed => "done",
        ScanTaskState::Idle => "idle",
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let header_cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let header_text = format!(
        " Board: {}{}    |    Plugins: {}",
        app.board_model,
        if app.simulated { " (simulated)" } else { "" },
        app.engine.registry.len()
    );
    let header = Paragraph::new(header_text).style(Style::default().fg(Color::Yellow));
    f.render_widget(header, header_cols[0]);

    let poll = if app.engine.poll.is_paused() { "paused" } else { "on" };
    let scans = Paragraph::new(format!(
        "GPIO: {}  I2C: {}  Poll: {} ",
        scan_label(app, ScanKind::FullRange),
        scan_label(app, ScanKind::BusProbe),
        poll
    ))
    .alignment(Alignment::Right)
    .style(Style::default().fg(Color::Gray));
    f.render_widget(scans, header_cols[1]);
}

fn row_line(row: &PinRow) -> Line<'static> {
    let id = &row.identity;
    let logical = id.logical.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
    let function_style = if id.reserved_function.is_some() {
        Style::default().fg(Color::Magenta)
    } else if id.logical.is_none() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::raw(format!("{:>3}  {:>4}  ", id.physical, logical)),
        Span::styled(format!("{:<10} ", truncate(&id.function, 10)), function_style),
        Span::raw(format!("{:<7} {:<5} ", truncate(&row.mode.text, 7), truncate(&row.level.text, 5))),
        Span::styled(format!("{:<16} ", truncate(&row.sensor.text, 16)), severity_style(row.sensor.severity)),
        Span::styled(row.info.text.clone(), severity_style(row.info.severity)),
    ])
}

fn render_pin_table(f: &mut Frame, table: &PinTable, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" PINS ({}) ", table.rows().len()))
        .border_style(Style::default().fg(Color::Cyan));

    let header_style = Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
    let highlight = Style::default().bg(Color::Blue).fg(Color::White);

    let mut items: Vec<ListItem> = Vec::with_capacity(table.rows().len() + 1);
    items.push(
        ListItem::new(format!(
            "{:>3}  {:>4}  {:<10} {:<7} {:<5} {:<16} {}",
            "Pin", "GPIO", "Function", "Mode", "Level", "Sensor", "Info"
        ))
        .style(header_style),
    );
    items.extend(table.rows().iter().map(|r| ListItem::new(row_line(r))));

    let mut state = ListState::default();
    if !table.rows().is_empty() {
        state.select(Some(table.selected_index() + 1));
    }

    let list = List::new(items).block(block).highlight_style(highlight);
    f.render_stateful_widget(list, area, &mut state);
}

fn render_text_pane(f: &mut Frame, title: &str, text: &str, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let para = Paragraph::new(text.to_string()).block(block).wrap(Wrap { trim: false });
    f.render_widget(para, area);
}
