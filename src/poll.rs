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

//! Background refresh of every assigned sensor.
//!
//! One pass walks the assignment store in pin order. Between passes the
//! loop sleeps for the configured interval, or until it is resumed after a
//! pause, or until shutdown.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assignments::{AssignedSensor, SharedAssignments};
use crate::bus::HardwareCoordinator;
use crate::config::Settings;
use crate::display::{publish_result, Column, Display};
use crate::plugin::{ScanResult, Severity};
use crate::registry::Registry;

pub struct PollContext {
    pub registry: Arc<Registry>,
    pub hardware: HardwareCoordinator,
    pub assignments: SharedAssignments,
    pub display: Arc<dyn Display>,
    pub interval: Duration,
    pub item_delay: Duration,
}

impl PollContext {
    pub fn new(
        settings: &Settings,
        registry: Arc<Registry>,
        hardware: HardwareCoordinator,
        assignments: SharedAssignments,
        display: Arc<dyn Display>,
    ) -> Self {
        PollContext {
            registry,
            hardware,
            assignments,
            display,
            interval: Duration::from_millis(settings.poll.interval_ms),
            item_delay: Duration::from_millis(settings.poll.item_delay_ms),
        }
    }
}

#[derive(Default)]
struct PollShared {
    pauses: AtomicUsize,
    wake: Notify,
    shutdown: CancellationToken,
    passes: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Control surface of the poll loop. Clones share one loop.
#[derive(Clone, Default)]
pub struct PollHandle {
    shared: Arc<PollShared>,
}

impl PollHandle {
    /// A handle with no loop behind it; pausing only adjusts the counter.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Pauses are counted; the loop runs again once every pause is resumed.
    pub fn pause(&self) {
        let n = self.shared.pauses.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(pauses = n, "poll loop paused");
    }

    pub fn resume(&self) {
        let prev = self
            .shared
            .pauses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if prev == Ok(1) {
            debug!("poll loop resumed");
            self.shared.wake.notify_one();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.pauses.load(Ordering::SeqCst) > 0
    }

    /// Completed passes since start.
    pub fn passes(&self) -> u64 {
        self.shared.passes.load(Ordering::SeqCst)
    }

    /// Stops the loop after the pass in progress, if any, and waits for it.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let task = self.shared.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Starts the loop on the current runtime.
pub fn spawn(ctx: PollContext) -> PollHandle {
    let handle = PollHandle::detached();
    let shared = handle.shared.clone();
    let task = tokio::spawn(run(ctx, shared));
    *handle.shared.task.lock() = Some(task);
    handle
}

async fn run(ctx: PollContext, shared: Arc<PollShared>) {
    info!(interval = ?ctx.interval, "poll loop started");
    loop {
        if shared.shutdown.is_cancelled() {
            break;
        }
        if shared.pauses.load(Ordering::SeqCst) == 0 {
            poll_pass(&ctx).await;
            shared.passes.fetch_add(1, Ordering::SeqCst);
        }
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = shared.wake.notified() => {}
            _ = tokio::time::sleep(ctx.interval) => {}
        }
    }
    info!("poll loop stopped");
}

/// Runs one driver call as its own task; a panic loses only that reading.
async fn contained<F>(plugin: &str, call: F) -> Option<ScanResult>
where
    F: Future<Output = Option<ScanResult>> + Send + 'static,
{
    match tokio::spawn(call).await {
        Ok(result) => result,
        Err(e) => {
            warn!(plugin, error = %e, "sensor read failed");
            None
        }
    }
}

/// One refresh of every assignment. Returns how many entries produced a
/// reading.
pub async fn poll_pass(ctx: &PollContext) -> usize {
    let (entries, groups) = {
        let store = ctx.assignments.lock();
        let entries: Vec<(u8, AssignedSensor)> = store.iter().map(|(pin, a)| (pin, a.sensor.clone())).collect();
        (entries, store.complete_groups(&ctx.registry))
    };

    let mut updated = 0;
    let mut groups_done: HashSet<String> = HashSet::new();
    for (pin, sensor) in entries {
        match sensor {
            AssignedSensor::Plugin(name) => {
                let Some(desc) = ctx.registry.get(&name) else {
                    debug!(pin, plugin = %name, "assigned plugin is not registered");
                    continue;
                };
                let driver = desc.driver.clone();
                let hardware = ctx.hardware.clone();
                let result = contained(&name, async move {
                    let mut bus = hardware.acquire().await;
                    driver.read(pin, &mut bus).await
                })
                .await;
                match result {
                    Some(r) => {
                        publish_result(ctx.display.as_ref(), pin, &r);
                        updated += 1;
                    }
                    None => debug!(pin, plugin = %name, "read returned nothing"),
                }
            }
            AssignedSensor::Role { plugin, .. } => {
                if groups_done.contains(&plugin) {
                    continue;
                }
                let Some((_, roles)) = groups.iter().find(|(name, _)| *name == plugin) else {
                    continue;
                };
                let Some(desc) = ctx.registry.get(&plugin) else {
                    continue;
                };
                groups_done.insert(plugin.clone());
                let driver = desc.driver.clone();
                let hardware = ctx.hardware.clone();
                let group = roles.clone();
                let result = contained(&plugin, async move {
                    let mut bus = hardware.acquire().await;
                    driver.read_with_roles(&group, &mut bus).await
                })
                .await;
                match result {
                    Some(r) => {
                        for p in roles.values() {
                            publish_result(ctx.display.as_ref(), *p, &r);
                        }
                        updated += 1;
                    }
                    None => debug!(plugin = %plugin, "group read returned nothing"),
                }
            }
            AssignedSensor::BusDevice => {
                ctx.display.set_cell(pin, Column::Sensor, "I2C", Severity::Warn);
                ctx.display.set_cell(pin, Column::Info, "active", Severity::Warn);
                updated += 1;
            }
        }
        tokio::time::sleep(ctx.item_delay).await;
    }
    updated
}
