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

//! Plugin discovery and the name-keyed plugin registry.
//!
//! Drivers are linked into the binary and announce a [`DriverFactory`]
//! with `inventory::submit!`. Plugin directories hold JSON manifests that
//! instantiate those factories under new names or with new parameters.
//!
//! Sources are processed in a fixed order: built-in factories, then each
//! plugin directory, then the override directory. Files inside a directory
//! are processed in file-name order. When two sources define the same name
//! the later one wins and the replacement is recorded.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::assignments::AssignedSensor;
use crate::error::SensorError;
use crate::logger;
use crate::plugin::{PluginIdentity, SensorPlugin};

/// Parameters for one plugin instance, read from a `*.json` manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    pub factory: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auto_detectable: Option<bool>,
    #[serde(default)]
    pub pin_roles: Option<Vec<String>>,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl PluginManifest {
    pub fn builtin(factory: &str) -> Self {
        PluginManifest { factory: factory.to_string(), ..Default::default() }
    }

    /// Driver parameters; a missing `params` block reads as `{}`.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, String> {
        let value = if self.params.is_null() { json!({}) } else { self.params.clone() };
        serde_json::from_value(value).map_err(|e| format!("invalid params: {e}"))
    }

    /// Applies manifest overrides on top of a driver's default identity.
    pub fn identity(&self, defaults: PluginIdentity) -> PluginIdentity {
        PluginIdentity {
            name: self.name.clone().unwrap_or(defaults.name),
            auto_detectable: self.auto_detectable.unwrap_or(defaults.auto_detectable),
            pin_roles: self.pin_roles.clone().unwrap_or(defaults.pin_roles),
        }
    }
}

pub type CreateFn = fn(&PluginManifest) -> Result<Arc<dyn SensorPlugin>, String>;

/// A driver linked into the binary.
pub struct DriverFactory {
    /// Name used by manifests in their `factory` field.
    pub kind: &'static str,
    /// Position among built-ins; lower registers first.
    pub order: u32,
    /// Instantiate with default parameters at startup.
    pub builtin: bool,
    pub create: CreateFn,
}

inventory::collect!(DriverFactory);

pub fn factory(kind: &str) -> Option<&'static DriverFactory> {
    inventory::iter::<DriverFactory>().find(|f| f.kind == kind)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    Builtin(&'static str),
    Manifest(PathBuf),
    Runtime,
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSource::Builtin(kind) => write!(f, "built-in {kind}"),
            PluginSource::Manifest(path) => write!(f, "{}", path.display()),
            PluginSource::Runtime => f.write_str("runtime"),
        }
    }
}

#[derive(Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub auto_detectable: bool,
    pub pin_roles: Vec<String>,
    pub driver: Arc<dyn SensorPlugin>,
    pub source: PluginSource,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("auto_detectable", &self.auto_detectable)
            .field("pin_roles", &self.pin_roles)
            .field("source", &self.source)
            .finish()
    }
}

/// A duplicate name that replaced an earlier registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub name: String,
    pub replaced: PluginSource,
    pub by: PluginSource,
}

/// One selectable entry in the manual assignment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub label: String,
    pub target: AssignedSensor,
}

/// Where plugins are discovered from.
#[derive(Debug, Clone, Default)]
pub struct PluginSources {
    pub builtins: bool,
    pub dirs: Vec<PathBuf>,
    /// Takes precedence over everything else.
    pub override_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct Registry {
    plugins: Vec<PluginDescriptor>,
    overrides: Vec<Override>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discover(sources: &PluginSources) -> Self {
        let mut registry = Registry::new();
        if sources.builtins {
            registry.load_builtins();
        }
        for dir in &sources.dirs {
            registry.load_dir(dir);
        }
        if let Some(dir) = &sources.override_dir {
            registry.load_dir(dir);
        }
        info!(
            count = registry.plugins.len(),
            plugins = %registry.plugins.iter().map(|d| d.name.as_str()).collect::<Vec<_>>().join(", "),
            "plugins loaded"
        );
        registry
    }

    pub fn load_builtins(&mut self) -> usize {
        crate::drivers::ensure_linked();
        let mut factories: Vec<&'static DriverFactory> =
            inventory::iter::<DriverFactory>().filter(|f| f.builtin).collect();
        factories.sort_by_key(|f| (f.order, f.kind));

        let mut count = 0;
        for f in factories {
            match (f.create)(&PluginManifest::builtin(f.kind)) {
                Ok(driver) => {
                    if self.register(driver, PluginSource::Builtin(f.kind)) {
                        count += 1;
                    }
                }
                Err(reason) => {
                    let err = SensorError::PluginLoad { origin: format!("built-in {}", f.kind), reason };
                    warn!(error = %err, "skipping plugin");
                }
            }
        }
        count
    }

    /// Registers every manifest in `dir`. A missing directory is not an error.
    pub fn load_dir(&mut self, dir: &Path) -> usize {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "plugin directory not readable");
                return 0;
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().map(|x| x == "json").unwrap_or(false))
            .collect();
        paths.sort();

        let mut count = 0;
        for path in paths {
            match load_manifest(&path) {
                Ok(Some(driver)) => {
                    if self.register(driver, PluginSource::Manifest(path.clone())) {
                        count += 1;
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "skipping plugin"),
            }
        }
        count
    }

    /// Adds a driver under its own name. Returns false when the name is empty.
    pub fn register(&mut self, driver: Arc<dyn SensorPlugin>, source: PluginSource) -> bool {
        let name = driver.name().trim().to_string();
        if name.is_empty() {
            debug!(source = %source, "plugin has no name; skipped");
            return false;
        }
        let roles = driver.pin_roles().to_vec();
        let mut auto = driver.auto_detectable();
        if auto && !roles.is_empty() {
            warn!(plugin = %name, "multi-pin plugins cannot be auto-detected; auto-detection disabled");
            auto = false;
        }
        let descriptor = PluginDescriptor { name: name.clone(), auto_detectable: auto, pin_roles: roles, driver, source };

        info!(plugin = %name, auto_detect = auto, source = %descriptor.source, "plugin registered");
        if let Some(slot) = self.plugins.iter_mut().find(|d| d.name == name) {
            warn!(plugin = %name, replaced = %slot.source, by = %descriptor.source, "duplicate plugin name; later source wins");
            logger::log_event("plugin_override", json!({
                "name": name,
                "replaced": slot.source.to_string(),
                "by": descriptor.source.to_string(),
            }));
            self.overrides.push(Override {
                name,
                replaced: slot.source.clone(),
                by: descriptor.source.clone(),
            });
            *slot = descriptor;
        } else {
            self.plugins.push(descriptor);
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|d| d.name == name)
    }

    /// Plugins in registration order.
    pub fn plugins(&self) -> &[PluginDescriptor] {
        &self.plugins
    }

    pub fn auto_detectable(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.iter().filter(|d| d.auto_detectable)
    }

    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Entries for manual assignment, sorted by plugin name, with the bus
    /// device entry last.
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        let mut sorted: Vec<&PluginDescriptor> = self.plugins.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = Vec::new();
        for d in sorted {
            if d.pin_roles.is_empty() {
                out.push(CatalogEntry { label: d.name.clone(), target: AssignedSensor::Plugin(d.name.clone()) });
            } else {
                for role in &d.pin_roles {
                    out.push(CatalogEntry {
                        label: format!("{}:{}", d.name, role),
                        target: AssignedSensor::Role { plugin: d.name.clone(), role: role.clone() },
                    });
                }
            }
        }
        out.push(CatalogEntry { label: "I2C Device".to_string(), target: AssignedSensor::BusDevice });
        out
    }
}

/// `Ok(None)` when the manifest names no known factory.
fn load_manifest(path: &Path) -> Result<Option<Arc<dyn SensorPlugin>>, SensorError> {
    let origin = path.display().to_string();
    let data = fs::read_to_string(path)
        .map_err(|e| SensorError::PluginLoad { origin: origin.clone(), reason: e.to_string() })?;
    let manifest: PluginManifest = serde_json::from_str(&data)
        .map_err(|e| SensorError::PluginLoad { origin: origin.clone(), reason: format!("parse error: {e}") })?;
    let Some(f) = factory(&manifest.factory) else {
        debug!(path = %origin, factory = %manifest.factory, "no such driver factory; skipped");
        return Ok(None);
    };
    (f.create)(&manifest)
        .map(Some)
        .map_err(|reason| SensorError::PluginLoad { origin, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_utils::FakePlugin;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, file: &str, body: &str) {
        fs::write(dir.join(file), body).unwrap();
    }

    #[test]
    fn test_builtins_register_in_order() {
        let mut registry = Registry::new();
        let n = registry.load_builtins();
        assert!(n >= 7);
        let names: Vec<&str> = registry.plugins().iter().map(|d| d.name.as_str()).collect();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("BMP280") < pos("DHT22"));
        assert!(pos("DHT22") < pos("DS18B20"));
        assert!(pos("DS18B20") < pos("TM1637"));

        let auto: Vec<&str> = registry.auto_detectable().map(|d| d.name.as_str()).collect();
        assert_eq!(auto, vec!["DHT22", "DS18B20"]);
    }

    #[test]
    fn test_manifest_registers_named_instance() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "reed.json", r#"{"factory":"digital-input","name":"Reed","params":{"high":"OPEN","low":"CLOSED","pull":"up"}}"#);
        let mut registry = Registry::new();
        assert_eq!(registry.load_dir(tmp.path()), 1);
        let d = registry.get("Reed").unwrap();
        assert!(!d.auto_detectable);
        assert_eq!(d.source, PluginSource::Manifest(tmp.path().join("reed.json")));
    }

    #[test]
    fn test_bad_manifests_are_skipped() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a_broken.json", "{ not json");
        write(tmp.path(), "b_unknown.json", r#"{"factory":"flux-capacitor","name":"X"}"#);
        write(tmp.path(), "c_noname.json", r#"{"factory":"digital-input"}"#);
        write(tmp.path(), "d_blank.json", r#"{"factory":"button","name":"  "}"#);
        write(tmp.path(), "e_good.json", r#"{"factory":"button","name":"Door"}"#);
        write(tmp.path(), "notes.txt", "ignored");

        let mut registry = Registry::new();
        assert_eq!(registry.load_dir(tmp.path()), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("Door").is_some());
    }

    #[test]
    fn test_missing_directory_is_ignored() {
        let mut registry = Registry::new();
        assert_eq!(registry.load_dir(Path::new("/definitely/not/here")), 0);
    }

    #[test]
    fn test_roles_disable_auto_detection() {
        let mut registry = Registry::new();
        let fake = FakePlugin::new("Pair").auto(true).roles(&["A", "B"]);
        assert!(registry.register(Arc::new(fake), PluginSource::Runtime));
        assert!(!registry.get("Pair").unwrap().auto_detectable);
    }

    #[test]
    fn test_duplicate_replaces_in_place() {
        let mut registry = Registry::new();
        registry.register(Arc::new(FakePlugin::new("Foo")), PluginSource::Builtin("one"));
        registry.register(Arc::new(FakePlugin::new("Bar")), PluginSource::Builtin("two"));
        registry.register(Arc::new(FakePlugin::new("Foo").auto(true)), PluginSource::Runtime);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.plugins()[0].name, "Foo");
        assert_eq!(registry.plugins()[0].source, PluginSource::Runtime);
        assert!(registry.plugins()[0].auto_detectable);
        assert_eq!(registry.overrides().len(), 1);
        assert_eq!(registry.overrides()[0].replaced, PluginSource::Builtin("one"));
    }

    #[test]
    fn test_discover_override_dir_wins_duplicates() {
        let (a, b, c) = (TempDir::new().unwrap(), TempDir::new().unwrap(), TempDir::new().unwrap());
        for (dir, high) in [(&a, "A"), (&b, "B"), (&c, "C")] {
            let body = format!(r#"{{"factory":"digital-input","name":"Foo","params":{{"high":"{high}"}}}}"#);
            write(dir.path(), "foo.json", &body);
        }
        write(a.path(), "bar.json", r#"{"factory":"button","name":"Bar"}"#);

        let registry = Registry::discover(&PluginSources {
            builtins: false,
            dirs: vec![a.path().to_path_buf(), b.path().to_path_buf()],
            override_dir: Some(c.path().to_path_buf()),
        });

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.plugins().iter().filter(|d| d.name == "Foo").count(), 1);
        let from = |dir: &TempDir| PluginSource::Manifest(dir.path().join("foo.json"));
        assert_eq!(registry.get("Foo").unwrap().source, from(&c));

        let overrides = registry.overrides();
        assert_eq!(overrides.len(), 2);
        assert_eq!((overrides[0].replaced.clone(), overrides[0].by.clone()), (from(&a), from(&b)));
        assert_eq!((overrides[1].replaced.clone(), overrides[1].by.clone()), (from(&b), from(&c)));
    }

    #[test]
    fn test_catalog_sorted_with_roles_and_bus_entry() {
        let mut registry = Registry::new();
        registry.register(Arc::new(FakePlugin::new("Zed")), PluginSource::Runtime);
        registry.register(Arc::new(FakePlugin::new("Alpha").roles(&["CLK", "DIO"])), PluginSource::Runtime);
        let labels: Vec<String> = registry.catalog().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["Alpha:CLK", "Alpha:DIO", "Zed", "I2C Device"]);
        assert_eq!(registry.catalog().last().unwrap().target, AssignedSensor::BusDevice);
    }

    #[test]
    fn test_manifest_params_default_to_empty_object() {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct P {
            level: u8,
        }
        let m = PluginManifest::builtin("x");
        let p: P = m.params().unwrap();
        assert_eq!(p.level, 0);
    }
}
