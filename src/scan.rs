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

//! Scan tasks: the full-range GPIO scan, the single-pin scan and the I2C
//! address probe.
//!
//! Each kind has at most one task. Starting a kind that is already running
//! stops it instead. Cancelling a task drops it at its next suspension
//! point; results already written stay on screen and in the store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assignments::SharedAssignments;
use crate::bus::HardwareCoordinator;
use crate::config::Settings;
use crate::display::{mark_pin, publish_result, Column, Display};
use crate::error::SensorError;
use crate::logger::log_event;
use crate::pins::{is_reserved, reserved_function, PinIdentity, I2C_SDA};
use crate::plugin::{ScanResult, SensorPlugin, Severity};
use crate::poll::PollHandle;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanKind {
    FullRange,
    SinglePin,
    BusProbe,
}

impl ScanKind {
    fn label(self) -> &'static str {
        match self {
            ScanKind::FullRange => "GPIO scan",
            ScanKind::SinglePin => "pin scan",
            ScanKind::BusProbe => "I2C scan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanTaskState {
    #[default]
    Idle,
    Running,
    /// Stop requested; the task has not yet observed it.
    Cancelling,
    /// Ran to the end. Stays here until the kind is started again.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub first_pin: u8,
    pub last_pin: u8,
    pub plugin_timeout: Duration,
    pub pin_delay: Duration,
    pub first_address: u8,
    pub last_address: u8,
    pub probe_delay: Duration,
}

impl ScanSettings {
    pub fn from_settings(s: &Settings) -> Self {
        ScanSettings {
            first_pin: s.scan.first_pin,
            last_pin: s.scan.last_pin,
            plugin_timeout: s.plugin_timeout(),
            pin_delay: Duration::from_millis(s.scan.pin_delay_ms),
            first_address: s.i2c.first_address,
            last_address: s.i2c.last_address,
            probe_delay: Duration::from_millis(s.i2c.probe_delay_ms),
        }
    }
}

/// Everything a scan task touches.
pub struct ScanContext {
    pub registry: Arc<Registry>,
    pub hardware: HardwareCoordinator,
    pub assignments: SharedAssignments,
    pub display: Arc<dyn Display>,
    pub poll: PollHandle,
    pub settings: ScanSettings,
}

#[derive(Default)]
struct Slot {
    state: ScanTaskState,
    token: Option<CancellationToken>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

type Slots = Arc<Mutex<HashMap<ScanKind, Slot>>>;

/// Keeps the poll loop paused for as long as it lives.
struct PauseGuard(PollHandle);

impl PauseGuard {
    fn new(poll: PollHandle) -> Self {
        poll.pause();
        PauseGuard(poll)
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        self.0.resume();
    }
}

#[derive(Clone)]
pub struct ScanCoordinator {
    ctx: Arc<ScanContext>,
    slots: Slots,
}

impl ScanCoordinator {
    pub fn new(ctx: ScanContext) -> Self {
        ScanCoordinator { ctx: Arc::new(ctx), slots: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn state(&self, kind: ScanKind) -> ScanTaskState {
        self.slots.lock().get(&kind).map(|s| s.state).unwrap_or_default()
    }

    pub fn is_active(&self, kind: ScanKind) -> bool {
        matches!(self.state(kind), ScanTaskState::Running | ScanTaskState::Cancelling)
    }

    pub fn toggle_full_scan(&self) -> ToggleOutcome {
        if self.is_active(ScanKind::FullRange) {
            self.cancel(ScanKind::FullRange);
            self.ctx.display.publish_status("GPIO scan stopped");
            return ToggleOutcome::Stopping;
        }
        let pause = PauseGuard::new(self.ctx.poll.clone());
        self.start(ScanKind::FullRange, move |ctx| async move {
            let _pause = pause;
            full_scan(&ctx).await;
        });
        ToggleOutcome::Started
    }

    /// Scans one pin. Supersedes a running full-range scan and any earlier
    /// single-pin scan.
    pub fn scan_pin(&self, pin: &PinIdentity) -> Result<(), SensorError> {
        let Some(logical) = pin.logical else {
            self.ctx
                .display
                .publish_status(&format!("Pin {} has no GPIO line to scan", pin.physical));
            return Err(SensorError::MappingGap(pin.physical));
        };
        if let Some(function) = reserved_function(logical) {
            self.ctx
                .display
                .publish_status(&format!("Pin {} is reserved for {}", pin.physical, function));
            return Err(SensorError::ReservedPin(logical));
        }
        if self.is_active(ScanKind::FullRange) {
            info!("single-pin scan supersedes the GPIO scan");
            self.cancel(ScanKind::FullRange);
        }
        self.cancel(ScanKind::SinglePin);
        self.start(ScanKind::SinglePin, move |ctx| async move {
            single_scan(&ctx, logical).await;
        });
        Ok(())
    }

    pub fn toggle_bus_probe(&self) -> ToggleOutcome {
        if self.is_active(ScanKind::BusProbe) {
            self.cancel(ScanKind::BusProbe);
            self.ctx.display.publish_status("I2C scan stopped");
            return ToggleOutcome::Stopping;
        }
        self.start(ScanKind::BusProbe, |ctx| async move {
            bus_probe(&ctx).await;
        });
        ToggleOutcome::Started
    }

    /// Cancels every running scan. Returns whether anything was running.
    pub fn stop_all(&self) -> bool {
        let mut stopped = false;
        for kind in [ScanKind::FullRange, ScanKind::SinglePin, ScanKind::BusProbe] {
            stopped |= self.cancel(kind);
        }
        self.ctx
            .display
            .publish_status(if stopped { "All scans stopped" } else { "No scans running" });
        stopped
    }

    /// Waits for the current task of `kind`, if any, to end.
    pub async fn wait(&self, kind: ScanKind) {
        let task = self.slots.lock().get_mut(&kind).and_then(|s| s.task.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn cancel(&self, kind: ScanKind) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&kind) else {
            return false;
        };
        if slot.state != ScanTaskState::Running {
            return false;
        }
        slot.state = ScanTaskState::Cancelling;
        if let Some(token) = &slot.token {
            token.cancel();
        }
        log_event("scan_cancelled", json!({ "kind": kind.label() }));
        true
    }

    fn start<F, Fut>(&self, kind: ScanKind, body: F)
    where
        F: FnOnce(Arc<ScanContext>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(kind).or_default();
            slot.generation += 1;
            slot.state = ScanTaskState::Running;
            slot.token = Some(token.clone());
            slot.generation
        };
        debug!(kind = kind.label(), generation, "scan task starting");

        // The body runs as its own task so a panicking driver ends only that
        // task and the slot below is still released.
        let mut work = tokio::spawn(body(self.ctx.clone()));
        let slots = self.slots.clone();
        let ctx = self.ctx.clone();
        let task = tokio::spawn(async move {
            let ended = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    work.abort();
                    let _ = (&mut work).await;
                    Ended::Cancelled
                }
                joined = &mut work => match joined {
                    Ok(()) => Ended::Finished,
                    Err(e) if e.is_cancelled() => Ended::Cancelled,
                    Err(e) => {
                        warn!(kind = kind.label(), error = %e, "scan task failed");
                        ctx.display.publish_status(&format!("{} aborted: driver failure", kind.label()));
                        Ended::Failed
                    }
                },
            };
            finish(&slots, kind, generation, ended);
        });

        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&kind) {
            if slot.generation == generation {
                slot.task = Some(task);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    Finished,
    Cancelled,
    Failed,
}

fn finish(slots: &Slots, kind: ScanKind, generation: u64, ended: Ended) {
    let mut slots = slots.lock();
    if let Some(slot) = slots.get_mut(&kind) {
        // A newer task of the same kind owns the slot now.
        if slot.generation != generation {
            return;
        }
        slot.state = match ended {
            Ended::Finished => ScanTaskState::Completed,
            Ended::Cancelled | Ended::Failed => ScanTaskState::Idle,
        };
        slot.token = None;
    }
    debug!(kind = kind.label(), generation, ?ended, "scan task ended");
}

async fn full_scan(ctx: &ScanContext) {
    let s = &ctx.settings;
    ctx.display.publish_status("GPIO scan started");
    log_event("scan_started", json!({ "kind": "gpio", "first": s.first_pin, "last": s.last_pin }));

    let mut detected = 0usize;
    for pin in s.first_pin..=s.last_pin {
        if is_reserved(pin) {
            continue;
        }
        let taken = ctx.assignments.lock().contains(pin);
        if taken {
            debug!(pin, "pin already assigned; not scanned");
            continue;
        }
        ctx.display.publish_status(&format!("Checking pin {pin}"));
        if probe_pin(ctx, pin).await.is_some() {
            detected += 1;
        }
        tokio::time::sleep(s.pin_delay).await;
    }

    ctx.display.publish_status("GPIO scan finished");
    log_event("scan_finished", json!({ "kind": "gpio", "detected": detected }));
}

async fn single_scan(ctx: &ScanContext, pin: u8) {
    ctx.display.publish_status(&format!("Scanning pin {pin}"));
    let status = match probe_pin(ctx, pin).await {
        Some(r) => format!("Pin {}: {} detected", pin, r.sensor_type),
        None => format!("Pin {pin}: no known sensor found"),
    };
    ctx.display.publish_status(&status);
}

/// A detection running as its own task. Dropping it aborts the task, so a
/// cancelled scan does not leave a driver on the bus.
struct Detection(JoinHandle<Result<Option<ScanResult>, Elapsed>>);

impl Drop for Detection {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn spawn_detection(ctx: &ScanContext, driver: Arc<dyn SensorPlugin>, pin: u8) -> Detection {
    let hardware = ctx.hardware.clone();
    let limit = ctx.settings.plugin_timeout;
    Detection(tokio::spawn(async move {
        let mut bus = hardware.acquire().await;
        tokio::time::timeout(limit, driver.detect(pin, &mut bus)).await
    }))
}

/// True once the pin has an entry, including one made while a driver was
/// still probing it.
fn claimed(ctx: &ScanContext, pin: u8) -> bool {
    ctx.assignments.lock().contains(pin)
}

fn timeout_ms(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

/// Tries each auto-detectable plugin on `pin` until one claims it.
///
/// Leaves the row alone once the pin gets assigned by someone else.
async fn probe_pin(ctx: &ScanContext, pin: u8) -> Option<ScanResult> {
    let candidates: Vec<(String, Arc<dyn SensorPlugin>)> = ctx
        .registry
        .auto_detectable()
        .map(|d| (d.name.clone(), d.driver.clone()))
        .collect();
    let display = ctx.display.as_ref();

    for (name, driver) in candidates {
        if claimed(ctx, pin) {
            debug!(pin, "pin assigned while scanning; probing stopped");
            return None;
        }
        mark_pin(display, pin, &format!("Scan {name}"), Severity::Warn);
        let mut detection = spawn_detection(ctx, driver, pin);
        let outcome = (&mut detection.0).await;
        match outcome {
            Ok(Err(_)) => {
                let err = SensorError::DetectionTimeout {
                    plugin: name.clone(),
                    timeout_ms: timeout_ms(ctx.settings.plugin_timeout),
                };
                warn!(pin, error = %err, "detection timed out");
                if !claimed(ctx, pin) {
                    mark_pin(display, pin, &format!("Timeout {name}"), Severity::Error);
                }
            }
            Ok(Ok(Some(result))) => {
                let recorded = ctx.assignments.lock().record_detected(pin, &name);
                if !recorded {
                    info!(pin, plugin = %name, "pin assigned during detection; keeping the assignment");
                    return None;
                }
                publish_result(display, pin, &result);
                info!(pin, plugin = %name, info = %result.info, "sensor detected");
                log_event("sensor_detected", json!({ "pin": pin, "plugin": name, "info": result.info }));
                return Some(result);
            }
            Ok(Ok(None)) => {}
            Err(e) => {
                warn!(pin, plugin = %name, error = %e, "detection failed");
                if !claimed(ctx, pin) {
                    mark_pin(display, pin, &format!("Failed {name}"), Severity::Error);
                }
            }
        }
    }
    if !claimed(ctx, pin) {
        mark_pin(display, pin, "-", Severity::Error);
    }
    None
}

fn format_addresses(found: &[u8]) -> String {
    found.iter().map(|a| format!("0x{a:02X}")).collect::<Vec<_>>().join(", ")
}

fn report_bus_error(ctx: &ScanContext, err: SensorError) {
    match err {
        SensorError::BusUnavailable(reason) => {
            warn!(%reason, "I2C bus not available");
            ctx.display.publish_status("I2C bus not available");
        }
        other => {
            warn!(error = %other, "I2C scan aborted");
            ctx.display.publish_status(&format!("I2C scan failed: {other}"));
        }
    }
}

async fn bus_probe(ctx: &ScanContext) {
    let s = &ctx.settings;
    let opened = {
        let mut bus = ctx.hardware.acquire().await;
        bus.open_i2c().await
    };
    if let Err(e) = opened {
        report_bus_error(ctx, e.into());
        return;
    }

    ctx.display.publish_status("I2C scan started");
    log_event("scan_started", json!({ "kind": "i2c" }));

    let mut found = Vec::new();
    for addr in s.first_address..=s.last_address {
        ctx.display.publish_status(&format!("I2C scan: checking 0x{addr:02X}"));
        let hit = {
            let mut bus = ctx.hardware.acquire().await;
            bus.i2c_probe(addr).await
        };
        match hit {
            Ok(true) => {
                found.push(addr);
                ctx.display.set_cell(I2C_SDA, Column::Sensor, "I2C", Severity::Warn);
                ctx.display.set_cell(I2C_SDA, Column::Info, &format_addresses(&found), Severity::Warn);
            }
            Ok(false) => {}
            Err(e) => {
                let err = SensorError::from(e);
                if matches!(err, SensorError::BusUnavailable(_)) {
                    report_bus_error(ctx, err);
                    return;
                }
                debug!(addr, error = %err, "probe failed");
            }
        }
        tokio::time::sleep(s.probe_delay).await;
    }

    ctx.display.publish_status("I2C scan finished");
    log_event("scan_finished", json!({ "kind": "i2c", "addresses": format_addresses(&found) }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignments::{AssignedSensor, Origin};
    use crate::pins::PinMap;
    use crate::test_utils::test_utils::{bench, fast_settings, registry_with, wait_until, Bench, FakePlugin};

    fn coordinator(b: &Bench, plugins: Vec<Arc<FakePlugin>>, tweak: impl FnOnce(&mut ScanSettings)) -> ScanCoordinator {
        let mut settings = ScanSettings::from_settings(&fast_settings());
        tweak(&mut settings);
        ScanCoordinator::new(ScanContext {
            registry: registry_with(plugins),
            hardware: b.hardware.clone(),
            assignments: b.assignments.clone(),
            display: Arc::new(b.display.clone()),
            poll: PollHandle::detached(),
            settings,
        })
    }

    fn identity(logical: u8) -> PinIdentity {
        PinMap::static_header().identity_for_logical(logical).cloned().unwrap()
    }

    #[tokio::test]
    async fn test_full_scan_skips_reserved_and_assigned() {
        let b = bench();
        let fake = Arc::new(FakePlugin::new("Fake").auto(true).detects_on(&[4]));
        b.assignments.lock().assign_manual(5, AssignedSensor::Plugin("Manual".into()));
        let scans = coordinator(&b, vec![fake.clone()], |_| {});

        assert_eq!(scans.toggle_full_scan(), ToggleOutcome::Started);
        scans.wait(ScanKind::FullRange).await;
        assert_eq!(scans.state(ScanKind::FullRange), ScanTaskState::Completed);

        let calls = fake.detect_calls();
        for reserved in [2, 3, 7, 8, 9, 10, 11, 14, 15] {
            assert!(!calls.contains(&reserved), "detect called on reserved pin {reserved}");
        }
        assert!(!calls.contains(&5));
        assert!(calls.contains(&4) && calls.contains(&27));

        let store = b.assignments.lock();
        assert_eq!(store.get(4).unwrap().origin, Origin::Detected);
        assert_eq!(store.get(5).unwrap().sensor, AssignedSensor::Plugin("Manual".into()));
        drop(store);
        assert_eq!(b.display.cell(4, Column::Info).unwrap().text, "found on 4");
        assert_eq!(b.display.cell(6, Column::Sensor).unwrap().text, "-");
        assert_eq!(b.display.status(), "GPIO scan finished");
    }

    #[tokio::test]
    async fn test_first_detection_wins() {
        let b = bench();
        let first = Arc::new(FakePlugin::new("First").auto(true).detects_on(&[4]));
        let second = Arc::new(FakePlugin::new("Second").auto(true).detects_on(&[4]));
        let scans = coordinator(&b, vec![first.clone(), second.clone()], |s| {
            s.first_pin = 4;
            s.last_pin = 4;
        });
        scans.toggle_full_scan();
        scans.wait(ScanKind::FullRange).await;
        assert!(second.detect_calls().is_empty());
        assert_eq!(b.assignments.lock().get(4).unwrap().sensor, AssignedSensor::Plugin("First".into()));
    }

    #[tokio::test]
    async fn test_hanging_detect_times_out_and_scan_proceeds() {
        let b = bench();
        let stuck = Arc::new(FakePlugin::new("Stuck").auto(true).hangs());
        let after = Arc::new(FakePlugin::new("After").auto(true).detects_on(&[5]));
        let scans = coordinator(&b, vec![stuck.clone(), after.clone()], |s| {
            s.first_pin = 4;
            s.last_pin = 5;
            s.plugin_timeout = Duration::from_millis(50);
        });

        let started = tokio::time::Instant::now();
        scans.toggle_full_scan();
        scans.wait(ScanKind::FullRange).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(stuck.detect_calls(), vec![4, 5]);
        assert_eq!(after.detect_calls(), vec![4, 5]);
        assert_eq!(b.display.cell(5, Column::Sensor).unwrap().text, "After");
        assert_eq!(b.hardware.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_panicking_driver_is_skipped() {
        let b = bench();
        let faulty = Arc::new(FakePlugin::new("Faulty").auto(true).panics_on(&[4]));
        let after = Arc::new(FakePlugin::new("After").auto(true).detects_on(&[4, 5]));
        let scans = coordinator(&b, vec![faulty.clone(), after.clone()], |s| {
            s.first_pin = 4;
            s.last_pin = 5;
        });

        scans.toggle_full_scan();
        scans.wait(ScanKind::FullRange).await;
        assert_eq!(scans.state(ScanKind::FullRange), ScanTaskState::Completed);
        assert_eq!(b.display.status(), "GPIO scan finished");
        assert_eq!(b.assignments.lock().get(4).unwrap().sensor, AssignedSensor::Plugin("After".into()));
        assert_eq!(b.display.cell(4, Column::Sensor).unwrap().text, "After");
        assert_eq!(b.hardware.stats().in_flight, 0);

        assert_eq!(faulty.detect_calls(), vec![4, 5]);
        assert_eq!(after.detect_calls(), vec![4, 5]);

        // The kind can be started again
        assert_eq!(scans.toggle_full_scan(), ToggleOutcome::Started);
        scans.wait(ScanKind::FullRange).await;
        assert_eq!(scans.state(ScanKind::FullRange), ScanTaskState::Completed);
    }

    #[tokio::test]
    async fn test_failed_task_releases_slot_and_poll() {
        let b = bench();
        let poll = PollHandle::detached();
        let scans = ScanCoordinator::new(ScanContext {
            registry: registry_with(vec![]),
            hardware: b.hardware.clone(),
            assignments: b.assignments.clone(),
            display: Arc::new(b.display.clone()),
            poll: poll.clone(),
            settings: ScanSettings::from_settings(&fast_settings()),
        });

        let pause = PauseGuard::new(poll.clone());
        scans.start(ScanKind::FullRange, move |_ctx| async move {
            let _pause = pause;
            panic!("display went away");
        });
        scans.wait(ScanKind::FullRange).await;

        assert_eq!(scans.state(ScanKind::FullRange), ScanTaskState::Idle);
        assert!(!poll.is_paused());
        assert_eq!(b.display.status(), "GPIO scan aborted: driver failure");
        assert_eq!(scans.toggle_full_scan(), ToggleOutcome::Started);
        scans.wait(ScanKind::FullRange).await;
        assert_eq!(scans.state(ScanKind::FullRange), ScanTaskState::Completed);
    }

    #[tokio::test]
    async fn test_toggle_stops_and_keeps_results() {
        let b = bench();
        let fake = Arc::new(FakePlugin::new("Fake").auto(true).detects_on(&[4]));
        let poll = PollHandle::detached();
        let mut settings = ScanSettings::from_settings(&fast_settings());
        settings.pin_delay = Duration::from_millis(200);
        let scans = ScanCoordinator::new(ScanContext {
            registry: registry_with(vec![fake.clone()]),
            hardware: b.hardware.clone(),
            assignments: b.assignments.clone(),
            display: Arc::new(b.display.clone()),
            poll: poll.clone(),
            settings,
        });

        scans.toggle_full_scan();
        assert!(poll.is_paused());
        assert!(wait_until(|| b.assignments.lock().contains(4), Duration::from_secs(2)).await);

        assert_eq!(scans.toggle_full_scan(), ToggleOutcome::Stopping);
        scans.wait(ScanKind::FullRange).await;
        assert_eq!(scans.state(ScanKind::FullRange), ScanTaskState::Idle);
        assert!(!poll.is_paused());
        assert_eq!(b.display.status(), "GPIO scan stopped");
        assert_eq!(b.display.cell(4, Column::Sensor).unwrap().text, "Fake");
        assert!(!fake.detect_calls().contains(&27));
    }

    #[tokio::test]
    async fn test_single_pin_supersedes_full_scan() {
        let b = bench();
        let fake = Arc::new(FakePlugin::new("Fake").auto(true).detects_on(&[17]));
        let scans = coordinator(&b, vec![fake.clone()], |s| s.pin_delay = Duration::from_millis(200));

        scans.toggle_full_scan();
        scans.scan_pin(&identity(17)).unwrap();
        scans.wait(ScanKind::SinglePin).await;
        scans.wait(ScanKind::FullRange).await;

        assert_eq!(scans.state(ScanKind::FullRange), ScanTaskState::Idle);
        assert_eq!(scans.state(ScanKind::SinglePin), ScanTaskState::Completed);
        assert_eq!(b.display.status(), "Pin 17: Fake detected");
    }

    #[tokio::test]
    async fn test_single_pin_rejects_reserved_and_unmapped() {
        let b = bench();
        let scans = coordinator(&b, vec![], |_| {});
        assert!(matches!(scans.scan_pin(&identity(2)), Err(SensorError::ReservedPin(2))));
        let ground = PinMap::static_header().identity(6).cloned().unwrap();
        assert!(matches!(scans.scan_pin(&ground), Err(SensorError::MappingGap(6))));
        assert_eq!(scans.state(ScanKind::SinglePin), ScanTaskState::Idle);
    }

    #[tokio::test]
    async fn test_single_pin_without_match() {
        let b = bench();
        let scans = coordinator(&b, vec![Arc::new(FakePlugin::new("Fake").auto(true))], |_| {});
        scans.scan_pin(&identity(22)).unwrap();
        scans.wait(ScanKind::SinglePin).await;
        assert_eq!(b.display.status(), "Pin 22: no known sensor found");
        assert!(!b.assignments.lock().contains(22));
    }

    #[tokio::test]
    async fn test_bus_probe_lists_responders() {
        let b = bench();
        b.bus.add_i2c_device(0x40);
        b.bus.add_i2c_device(0x76);
        let scans = coordinator(&b, vec![], |_| {});
        scans.toggle_bus_probe();
        scans.wait(ScanKind::BusProbe).await;
        assert_eq!(b.display.cell(I2C_SDA, Column::Info).unwrap().text, "0x40, 0x76");
        assert_eq!(b.display.status(), "I2C scan finished");
    }

    #[tokio::test]
    async fn test_bus_probe_without_bus() {
        let b = bench();
        b.bus.set_i2c_available(false);
        let scans = coordinator(&b, vec![], |_| {});
        scans.toggle_bus_probe();
        scans.wait(ScanKind::BusProbe).await;
        assert_eq!(b.display.status(), "I2C bus not available");
        assert_eq!(scans.state(ScanKind::BusProbe), ScanTaskState::Completed);
    }

    #[test]
    fn test_timeout_ms_saturates() {
        assert_eq!(timeout_ms(Duration::from_millis(500)), 500);
        assert_eq!(timeout_ms(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_stop_all() {
        let b = bench();
        let scans = coordinator(&b, vec![], |s| s.probe_delay = Duration::from_millis(100));
        assert!(!scans.stop_all());
        assert_eq!(b.display.status(), "No scans running");

        scans.toggle_bus_probe();
        assert!(scans.stop_all());
        assert_eq!(b.display.status(), "All scans stopped");
        scans.wait(ScanKind::BusProbe).await;
        assert_eq!(scans.state(ScanKind::BusProbe), ScanTaskState::Idle);
    }
}
