/*
 * Test utilities and mock helpers for SensorTest
 *
 * This module provides a scriptable fake plugin and helpers that assemble
 * an engine over the simulated bus, for use across the unit test modules.
 */

#[cfg(test)]
pub mod test_utils {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::assignments::{AssignmentStore, SharedAssignments};
    use crate::bus::memory::MemoryBus;
    use crate::bus::{BusHandle, HardwareCoordinator};
    use crate::config::Settings;
    use crate::display::{PinTable, SharedDisplay};
    use crate::pins::PinMap;
    use crate::plugin::{PluginIdentity, RoleMap, ScanResult, SensorPlugin};
    use crate::registry::{PluginSource, Registry};

    /// A plugin whose behaviour is scripted per test.
    pub struct FakePlugin {
        identity: PluginIdentity,
        detect_on: Vec<u8>,
        hang: bool,
        fail_reads: bool,
        panic_on: Vec<u8>,
        detect_calls: Mutex<Vec<u8>>,
        read_calls: Mutex<Vec<u8>>,
        role_reads: Mutex<Vec<RoleMap>>,
    }

    impl FakePlugin {
        pub fn new(name: &str) -> Self {
            FakePlugin {
                identity: PluginIdentity::new(name, false, &[]),
                detect_on: Vec::new(),
                hang: false,
                fail_reads: false,
                panic_on: Vec::new(),
                detect_calls: Mutex::new(Vec::new()),
                read_calls: Mutex::new(Vec::new()),
                role_reads: Mutex::new(Vec::new()),
            }
        }

        pub fn auto(mut self, auto: bool) -> Self {
            self.identity.auto_detectable = auto;
            self
        }

        pub fn roles(mut self, roles: &[&str]) -> Self {
            self.identity.pin_roles = roles.iter().map(|r| r.to_string()).collect();
            self
        }

        pub fn detects_on(mut self, pins: &[u8]) -> Self {
            self.detect_on = pins.to_vec();
            self
        }

        /// `detect` never returns.
        pub fn hangs(mut self) -> Self {
            self.hang = true;
            self
        }

        /// `detect` and `read` panic on these pins.
        pub fn panics_on(mut self, pins: &[u8]) -> Self {
            self.panic_on = pins.to_vec();
            self
        }

        pub fn failing_reads(mut self) -> Self {
            self.fail_reads = true;
            self
        }

        pub fn detect_calls(&self) -> Vec<u8> {
            self.detect_calls.lock().clone()
        }

        pub fn read_calls(&self) -> Vec<u8> {
            self.read_calls.lock().clone()
        }

        pub fn role_reads(&self) -> Vec<RoleMap> {
            self.role_reads.lock().clone()
        }
    }

    #[async_trait]
    impl SensorPlugin for FakePlugin {
        fn identity(&self) -> &PluginIdentity {
            &self.identity
        }

        async fn detect(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
            self.detect_calls.lock().push(pin);
            if self.panic_on.contains(&pin) {
                panic!("{} failed on pin {pin}", self.identity.name);
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            let _ = bus.read_level(pin).await;
            self.detect_on
                .contains(&pin)
                .then(|| ScanResult::normal(self.identity.name.clone(), format!("found on {pin}")))
        }

        async fn read(&self, pin: u8, bus: &mut BusHandle) -> Option<ScanResult> {
            self.read_calls.lock().push(pin);
            if self.panic_on.contains(&pin) {
                panic!("{} failed on pin {pin}", self.identity.name);
            }
            let _ = bus.read_level(pin).await;
            if self.fail_reads {
                return None;
            }
            Some(ScanResult::normal(self.identity.name.clone(), format!("reading {pin}")))
        }

        async fn read_with_roles(&self, roles: &RoleMap, _bus: &mut BusHandle) -> Option<ScanResult> {
            self.role_reads.lock().push(roles.clone());
            Some(ScanResult::warn(self.identity.name.clone(), "group"))
        }
    }

    /// Settings with short delays so scans finish quickly.
    pub fn fast_settings() -> Settings {
        let mut s = Settings::default();
        s.scan.plugin_timeout_ms = 100;
        s.scan.pin_delay_ms = 1;
        s.i2c.probe_delay_ms = 0;
        s.poll.interval_ms = 50;
        s.poll.item_delay_ms = 1;
        s.plugins.builtins = false;
        s.plugins.dirs.clear();
        s
    }

    pub fn registry_with(plugins: Vec<Arc<FakePlugin>>) -> Arc<Registry> {
        let mut registry = Registry::new();
        for p in plugins {
            registry.register(p, PluginSource::Runtime);
        }
        Arc::new(registry)
    }

    pub struct Bench {
        pub bus: MemoryBus,
        pub hardware: HardwareCoordinator,
        pub assignments: SharedAssignments,
        pub display: SharedDisplay,
    }

    pub fn bench() -> Bench {
        let bus = MemoryBus::new();
        Bench {
            hardware: HardwareCoordinator::new(Box::new(bus.clone())),
            bus,
            assignments: AssignmentStore::shared(),
            display: SharedDisplay::new(PinTable::new(PinMap::static_header())),
        }
    }

    /// Polls `cond` until it holds or the deadline passes.
    pub async fn wait_until(mut cond: impl FnMut() -> bool, deadline: Duration) -> bool {
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }
}
