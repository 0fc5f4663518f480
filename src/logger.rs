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

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_PATH: &str = "/tmp/sensortest.log";

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Routes tracing output to a file; the terminal belongs to the TUI.
///
/// Falls back to [`DEFAULT_LOG_PATH`] when `path` cannot be opened and
/// returns the file actually used.
pub fn init_logging(path: Option<&Path>) -> Option<PathBuf> {
    let requested = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH));
    let (file, used) = match open_append(&requested) {
        Some(f) => (f, requested),
        None => {
            let fallback = PathBuf::from(DEFAULT_LOG_PATH);
            (open_append(&fallback)?, fallback)
        }
    };
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_env_filter(env_filter("info"))
        .try_init()
        .ok()?;
    Some(used)
}

/// Stderr logging for the headless subcommands.
pub fn init_console_logging(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(env_filter(if verbose { "info" } else { "warn" }))
        .try_init();
}

/// Structured milestone event (scan start/finish, assignment, override).
pub fn log_event(event: &str, data: Value) {
    let line = json!({
        "ts_ms": now_millis(),
        "event": event,
        "data": data,
    });
    tracing::info!(target: "events", "{}", line);
}
