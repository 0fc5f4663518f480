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

//! Defensive parser for the text printed by the `pinout` tool.
//!
//! The `J8:` header block is parsed first. When it is missing the parser
//! falls back to free-form `GPIOn ... physical pin m` lines. Anything it
//! cannot understand is ignored, so garbage input yields an empty list.

use lazy_static::lazy_static;
use regex::Regex;

/// One physical header position as described by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinoutEntry {
    pub physical: u8,
    pub logical: Option<u8>,
    pub name: String,
}

lazy_static! {
    static ref J8_ROW: Regex = Regex::new(r"^\s*(\S+)\s*\((\d+)\)\s*\((\d+)\)\s*(\S+)\s*$").unwrap();
    static ref J8_ROW_LOOSE: Regex = Regex::new(r"^\s*(\S+)\s*\((\d+)\)\s*\((\d+)\)\s*(.+?)\s*$").unwrap();
    static ref GPIO_LINE: Regex =
        Regex::new(r"(?i)GPIO\s*(\d+)\s*(?:\(([^)]+)\))?.*?physical\s*pin\s*(\d+)").unwrap();
    static ref POWER_LINE: Regex = Regex::new(r"(?i)(3V3|3\.3V|5V|GND|GROUND).+physical\s*pin\s*(\d+)").unwrap();
}

pub fn parse_pinout(text: &str) -> Vec<PinoutEntry> {
    let mut entries = parse_j8_block(text);
    if entries.is_empty() {
        entries = parse_free_form(text);
    }
    entries.sort_by_key(|e| e.physical);
    entries
}

fn parse_j8_block(text: &str) -> Vec<PinoutEntry> {
    let mut lines = text.lines().skip_while(|l| !l.trim_start().starts_with("J8:"));
    if lines.next().is_none() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        let caps = match J8_ROW.captures(line).or_else(|| J8_ROW_LOOSE.captures(line)) {
            Some(c) => c,
            None => continue,
        };
        let (Ok(left_phys), Ok(right_phys)) = (caps[2].parse::<u8>(), caps[3].parse::<u8>()) else {
            continue;
        };
        out.push(header_entry(caps[1].trim(), left_phys));
        out.push(header_entry(caps[4].trim(), right_phys));
    }
    out
}

fn header_entry(name: &str, physical: u8) -> PinoutEntry {
    let upper = name.to_ascii_uppercase();
    if let Some(n) = upper.strip_prefix("GPIO").and_then(|rest| rest.parse::<u8>().ok()) {
        return PinoutEntry { physical, logical: Some(n), name: "GPIO".to_string() };
    }
    let name = match upper.as_str() {
        "3V3" | "3.3V" => "3V3".to_string(),
        "5V" => "5V".to_string(),
        "GND" | "GROUND" => "GND".to_string(),
        _ => name.to_string(),
    };
    PinoutEntry { physical, logical: None, name }
}

fn bus_label(label: &str) -> Option<&'static str> {
    Some(match label {
        "SDA" | "SDA1" => "I2C SDA",
        "SCL" | "SCL1" => "I2C SCL",
        "TXD" => "UART TX",
        "RXD" => "UART RX",
        "MOSI" => "SPI MOSI",
        "MISO" => "SPI MISO",
        "SCLK" | "SCK" => "SPI SCLK",
        "CE0" => "SPI CE0",
        "CE1" => "SPI CE1",
        _ => return None,
    })
}

fn parse_free_form(text: &str) -> Vec<PinoutEntry> {
    let mut out: Vec<PinoutEntry> = Vec::new();
    for line in text.lines() {
        let Some(caps) = GPIO_LINE.captures(line) else { continue };
        let (Ok(logical), Ok(physical)) = (caps[1].parse::<u8>(), caps[3].parse::<u8>()) else {
            continue;
        };
        let label = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        let name = if label.is_empty() {
            "GPIO".to_string()
        } else {
            bus_label(&label.to_ascii_uppercase())
                .map(str::to_string)
                .unwrap_or_else(|| label.to_string())
        };
        out.push(PinoutEntry { physical, logical: Some(logical), name });
    }

    for line in text.lines() {
        let Some(caps) = POWER_LINE.captures(line) else { continue };
        let Ok(physical) = caps[2].parse::<u8>() else { continue };
        if out.iter().any(|e| e.physical == physical) {
            continue;
        }
        let name = match caps[1].to_ascii_uppercase().as_str() {
            "3.3V" | "3V3" => "3V3".to_string(),
            "GND" | "GROUND" => "GND".to_string(),
            other => other.to_string(),
        };
        out.push(PinoutEntry { physical, logical: None, name });
    }
    out
}

/// First `max_lines` non-empty lines of the tool output, for the summary pane.
pub fn summarize(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).take(max_lines).collect();
    if lines.is_empty() {
        "No output".to_string()
    } else {
        lines.join("\n")
    }
}
