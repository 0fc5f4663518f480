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

//! Hardware access coordination.
//!
//! Every physical-bus transaction goes through [`HardwareCoordinator::acquire`],
//! which hands out the single [`BusHandle`]. Blocking bus calls run on
//! tokio's bounded blocking pool while the handle keeps exclusive ownership.

pub mod memory;
pub mod sysfs;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::BusError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Low => "LOW",
            Level::High => "HIGH",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
    Alt(u8),
    Unknown,
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinMode::Input => f.write_str("INPUT"),
            PinMode::Output => f.write_str("OUTPUT"),
            PinMode::Alt(n) => write!(f, "ALT{n}"),
            PinMode::Unknown => f.write_str("N/A"),
        }
    }
}

/// Raw, blocking access to the board's GPIO lines, I2C bus and sysfs.
///
/// Implementations are only ever driven from one thread at a time; the
/// coordinator guarantees it.
pub trait Bus: Send {
    fn setup_input(&mut self, pin: u8, pull: Pull) -> Result<(), BusError>;
    fn read_level(&mut self, pin: u8) -> Result<Level, BusError>;
    fn setup_output(&mut self, pin: u8, initial: Level) -> Result<(), BusError>;
    fn write_level(&mut self, pin: u8, level: Level) -> Result<(), BusError>;
    fn pin_mode(&mut self, pin: u8) -> Result<PinMode, BusError>;
    /// Opens the I2C adapter; `BusError::Unavailable` when there is none.
    fn open_i2c(&mut self) -> Result<(), BusError>;
    /// SMBus quick write; `Ok(true)` when a device acknowledged `addr`.
    fn i2c_probe(&mut self, addr: u8) -> Result<bool, BusError>;
    fn read_attribute(&mut self, path: &Path) -> Result<String, BusError>;
    /// Entry names of a directory, sorted.
    fn list_dir(&mut self, path: &Path) -> Result<Vec<String>, BusError>;
}

#[derive(Debug, Default)]
struct BusStats {
    acquisitions: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStatsSnapshot {
    pub acquisitions: u64,
    pub in_flight: usize,
    pub max_in_flight: usize,
}

/// Owner of the bus. Cloning shares the same exclusion.
#[derive(Clone)]
pub struct HardwareCoordinator {
    bus: Arc<Mutex<Box<dyn Bus>>>,
    stats: Arc<BusStats>,
}

impl HardwareCoordinator {
    pub fn new(bus: Box<dyn Bus>) -> Self {
        HardwareCoordinator { bus: Arc::new(Mutex::new(bus)), stats: Arc::new(BusStats::default()) }
    }

    /// Waits for exclusive access. Waiters are woken in FIFO order.
    pub async fn acquire(&self) -> BusHandle {
        let guard = self.bus.clone().lock_owned().await;
        self.stats.acquisitions.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        BusHandle { exclusive: Some(Exclusive { guard, stats: self.stats.clone() }) }
    }

    pub fn stats(&self) -> BusStatsSnapshot {
        BusStatsSnapshot {
            acquisitions: self.stats.acquisitions.load(Ordering::SeqCst),
            in_flight: self.stats.in_flight.load(Ordering::SeqCst),
            max_in_flight: self.stats.max_in_flight.load(Ordering::SeqCst),
        }
    }
}

struct Exclusive {
    guard: OwnedMutexGuard<Box<dyn Bus>>,
    stats: Arc<BusStats>,
}

impl Drop for Exclusive {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive access to the bus for one transaction.
///
/// Dropping the handle releases the bus. If the owning task is cancelled
/// while a blocking call is running, the bus is released as soon as that
/// call returns.
pub struct BusHandle {
    exclusive: Option<Exclusive>,
}

impl BusHandle {
    /// Runs a blocking operation against the bus on the worker pool.
    pub async fn run<T, F>(&mut self, op: F) -> Result<T, BusError>
    where
        F: FnOnce(&mut dyn Bus) -> Result<T, BusError> + Send + 'static,
        T: Send + 'static,
    {
        let mut exclusive = self
            .exclusive
            .take()
            .ok_or_else(|| BusError::Worker("bus handle lost after a failed operation".to_string()))?;
        let joined = tokio::task::spawn_blocking(move || {
            let out = op(&mut **exclusive.guard);
            (exclusive, out)
        })
        .await;
        match joined {
            Ok((exclusive, out)) => {
                self.exclusive = Some(exclusive);
                out
            }
            Err(e) => Err(BusError::Worker(e.to_string())),
        }
    }

    pub async fn setup_input(&mut self, pin: u8, pull: Pull) -> Result<(), BusError> {
        self.run(move |bus| bus.setup_input(pin, pull)).await
    }

    pub async fn read_level(&mut self, pin: u8) -> Result<Level, BusError> {
        self.run(move |bus| bus.read_level(pin)).await
    }

    pub async fn setup_output(&mut self, pin: u8, initial: Level) -> Result<(), BusError> {
        self.run(move |bus| bus.setup_output(pin, initial)).await
    }

    pub async fn write_level(&mut self, pin: u8, level: Level) -> Result<(), BusError> {
        self.run(move |bus| bus.write_level(pin, level)).await
    }

    pub async fn pin_mode(&mut self, pin: u8) -> Result<PinMode, BusError> {
        self.run(move |bus| bus.pin_mode(pin)).await
    }

    pub async fn open_i2c(&mut self) -> Result<(), BusError> {
        self.run(|bus| bus.open_i2c()).await
    }

    pub async fn i2c_probe(&mut self, addr: u8) -> Result<bool, BusError> {
        self.run(move |bus| bus.i2c_probe(addr)).await
    }

    pub async fn read_attribute(&mut self, path: impl Into<PathBuf>) -> Result<String, BusError> {
        let path = path.into();
        self.run(move |bus| bus.read_attribute(&path)).await
    }

    pub async fn list_dir(&mut self, path: impl Into<PathBuf>) -> Result<Vec<String>, BusError> {
        let path = path.into();
        self.run(move |bus| bus.list_dir(&path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryBus;
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handle_round_trips_through_worker() {
        let mem = MemoryBus::new();
        mem.set_level(4, Level::High);
        let hw = HardwareCoordinator::new(Box::new(mem.clone()));

        let mut bus = hw.acquire().await;
        bus.setup_input(4, Pull::None).await.unwrap();
        assert_eq!(bus.read_level(4).await.unwrap(), Level::High);
        assert_eq!(bus.pin_mode(4).await.unwrap(), PinMode::Input);
        assert_eq!(hw.stats().in_flight, 1);
        drop(bus);

        let stats = hw.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.acquisitions, 1);
    }

    #[tokio::test]
    async fn test_second_acquire_waits_for_release() {
        let hw = HardwareCoordinator::new(Box::new(MemoryBus::new()));
        let first = hw.acquire().await;

        let hw2 = hw.clone();
        let waiter = tokio::spawn(async move {
            let _second = hw2.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(hw.stats().max_in_flight, 1);
    }

    #[tokio::test]
    async fn test_cancelled_transaction_releases_bus() {
        let mem = MemoryBus::new();
        mem.set_latency(Duration::from_millis(50));
        let hw = HardwareCoordinator::new(Box::new(mem));

        let hw2 = hw.clone();
        let task = tokio::spawn(async move {
            let mut bus = hw2.acquire().await;
            let _ = bus.read_level(4).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.abort();
        let _ = task.await;

        let acquired = tokio::time::timeout(Duration::from_secs(2), hw.acquire()).await;
        assert!(acquired.is_ok());
    }

    #[test]
    fn test_level_and_mode_display() {
        assert_eq!(Level::High.to_string(), "HIGH");
        assert_eq!(Level::from(false), Level::Low);
        assert_eq!(PinMode::Alt(0).to_string(), "ALT0");
        assert_eq!(PinMode::Unknown.to_string(), "N/A");
    }
}
