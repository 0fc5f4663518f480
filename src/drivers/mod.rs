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

//! Built-in sensor drivers. Each module registers its factories with
//! `inventory::submit!`; see [`crate::registry`].

pub mod bmp280;
pub mod dht22;
pub mod digital;
pub mod ds18b20;
pub mod tm1637;

use crate::registry::CreateFn;

/// Touches every driver module so the linker keeps their registrations
/// when the library is linked into another crate.
pub fn ensure_linked() {
    let factories: [CreateFn; 5] = [
        bmp280::create,
        dht22::create,
        digital::create_generic,
        ds18b20::create,
        tm1637::create,
    ];
    std::hint::black_box(factories);
}

fn reading_details(physical: u8, name: &str, info: Option<String>) -> String {
    match info {
        Some(info) => format!("Pin {physical}\nSensor: {name}\n{info}"),
        None => crate::plugin::unavailable_details(physical, name),
    }
}
