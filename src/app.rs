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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::Engine;
use crate::pins::PinIdentity;
use crate::registry::CatalogEntry;

pub struct App {
    pub engine: Engine,
    // header
    pub board_model: String,
    pub simulated: bool,
    // assignment popup
    pub catalog: Vec<CatalogEntry>,
    pub show_assign_popup: bool,
    pub assign_idx: usize,
    pub assign_target: Option<PinIdentity>,
    pub show_help_popup: bool,
    // periodic level refresh
    pub last_refresh: Instant,
    pub refresh_interval: Duration,
    pub refreshing: Arc<AtomicBool>,
}

impl App {
    pub fn new(engine: Engine, board_model: String, simulated: bool) -> Self {
        let catalog = engine.catalog();
        App {
            engine,
            board_model,
            simulated,
            catalog,
            show_assign_popup: false,
            assign_idx: 0,
            assign_target: None,
            show_help_popup: false,
            last_refresh: Instant::now(),
            refresh_interval: Duration::from_secs(2),
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn selected_pin(&self) -> Option<PinIdentity> {
        self.engine.display.lock().selected().map(|r| r.identity.clone())
    }

    /// Starts a level refresh unless one is already running.
    pub fn refresh(&mut self) {
        self.last_refresh = Instant::now();
        if self.refreshing.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = self.engine.clone();
        let flag = self.refreshing.clone();
        tokio::spawn(async move {
            engine.refresh_levels().await;
            flag.store(false, Ordering::SeqCst);
        });
    }

    pub fn tick(&mut self) {
        if self.last_refresh.elapsed() >= self.refresh_interval {
            self.refresh();
        }
    }
}
