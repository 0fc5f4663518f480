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

use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::PinoutConfig;
use crate::pinout::parse_pinout;
use crate::pins::PinMap;

pub fn read_board_model() -> String {
    board_model_from(Path::new("/proc/device-tree/model"), Path::new("/proc/cpuinfo"))
}

fn board_model_from(model: &Path, cpuinfo: &Path) -> String {
    if let Ok(mut s) = fs::read_to_string(model) {
        s.retain(|c| c != '\u{0}');
        let s = s.trim();
        if !s.is_empty() {
            return s.to_string();
        }
    }
    // Older kernels only expose the board in cpuinfo
    if let Ok(s) = fs::read_to_string(cpuinfo) {
        let mut hardware: Option<String> = None;
        for line in s.lines() {
            if let Some((k, v)) = line.split_once(':') {
                let val = v.trim();
                if val.is_empty() {
                    continue;
                }
                match k.trim().to_ascii_lowercase().as_str() {
                    "model" => return val.to_string(),
                    "hardware" if hardware.is_none() => hardware = Some(val.to_string()),
                    _ => {}
                }
            }
        }
        if let Some(h) = hardware {
            return h;
        }
    }
    "Unknown board".to_string()
}

/// Runs the host's pin description command. `None` when it is missing,
/// fails, prints nothing or outlives `timeout`.
pub async fn run_pin_description(command: &[String], timeout: Duration) -> Option<String> {
    let (program, args) = command.split_first()?;
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => {
            debug!(program = %program, error = %e, "pin description command failed to run");
            return None;
        }
        Err(_) => {
            warn!(program = %program, timeout = ?timeout, "pin description command timed out");
            return None;
        }
    };
    if !output.status.success() {
        debug!(program = %program, status = %output.status, "pin description command failed");
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    (!text.trim().is_empty()).then_some(text)
}

/// Builds the pin map from the host. Anything unusable gives the
/// placeholder map; the raw output is returned for the summary pane.
pub async fn load_pin_map(cfg: &PinoutConfig) -> (PinMap, Option<String>) {
    let output = run_pin_description(&cfg.command, Duration::from_millis(cfg.timeout_ms)).await;
    let Some(text) = output else {
        warn!("no pin description from the host; using placeholders");
        return (PinMap::placeholder(), None);
    };
    let map = pin_map_from_text(&text);
    (map, Some(text))
}

pub fn pin_map_from_text(text: &str) -> PinMap {
    match PinMap::from_entries(&parse_pinout(text)) {
        Ok(map) => {
            info!(pins = map.len(), "pin map loaded");
            map
        }
        Err(reason) => {
            warn!(%reason, "pin description unusable; using placeholders");
            PinMap::placeholder()
        }
    }
}
