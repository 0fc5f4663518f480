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

//! SensorTest - GPIO sensor diagnostic TUI for single-board computers
//!
//! This library provides the pin identity map, the sensor plugin registry,
//! serialized hardware access, the scan coordinator and the poll loop that
//! keeps assigned sensors on screen.

pub mod app;
pub mod assignments;
pub mod bus;
pub mod cli;
pub mod config;
pub mod display;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod events;
pub mod handlers;
pub mod logger;
pub mod pinout;
pub mod pins;
pub mod plugin;
pub mod poll;
pub mod registry;
pub mod scan;
pub mod system;
pub mod ui;

#[cfg(test)]
pub mod test_utils;
