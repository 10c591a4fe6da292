// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/device/loader.rs
// Version: 0.3.1
//
// This file implements device loaders, located in the device subdirectory.
// Configuration entries become a closed DeviceEntry tree: plain devices,
// loaders that expand into more entries, and hotplug scanners that report
// devices as they appear.
//
// Tree Location:
// - src/device/loader.rs (device tree entries, loaders, hotplug scanning)
// - Depends on: tokio, parking_lot, crate::core::config

use super::error::LoaderError;
use super::link::{DeviceConfig, DeviceSpec};
use super::port::LinkOpener;
use super::protocol::protocol_for;
use crate::core::config::{DeviceDescriptor, DeviceSettings};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

const LOG_TARGET: &str = "rigbridge::device::loader";

/// One node of the configured device tree
pub enum DeviceEntry {
    Device(DeviceSpec),
    Loader(Box<dyn DeviceLoader>),
    Hotplug(Arc<dyn HotplugLoader>),
}

/// Expands into further entries when the tree is resolved
pub trait DeviceLoader: Send + Sync {
    fn load_devices(&self) -> Result<Vec<DeviceEntry>, LoaderError>;
}

/// Reports devices asynchronously after start
pub trait HotplugLoader: Send + Sync {
    fn start_listening(&self, sink: DeviceSink);

    fn stop_listening(&self);
}

/// Where hotplug loaders deliver newly found devices
#[derive(Clone)]
pub struct DeviceSink {
    tx: UnboundedSender<DeviceEntry>,
}

impl DeviceSink {
    pub fn new(tx: UnboundedSender<DeviceEntry>) -> Self {
        Self { tx }
    }

    /// Hand `entry` to the coordinator. Returns false once nobody listens.
    pub fn found(&self, entry: DeviceEntry) -> bool {
        self.tx.send(entry).is_ok()
    }
}

/// Device spec for a port with the given settings
pub fn build_spec(port: &str, settings: &DeviceSettings, opener: &Arc<dyn LinkOpener>) -> DeviceSpec {
    let protocol = protocol_for(settings);
    let name = settings
        .name
        .clone()
        .unwrap_or_else(|| protocol.name().to_string());
    DeviceSpec {
        config: DeviceConfig {
            name,
            port: port.to_string(),
            cores: settings.cores,
            watchdog_timeout: settings.watchdog_timeout(),
            poll_interval: settings.poll_interval(),
        },
        protocol,
        opener: Arc::clone(opener),
    }
}

/// Turn a parsed configuration entry into a tree node
pub fn entry_from_descriptor(descriptor: &DeviceDescriptor, opener: &Arc<dyn LinkOpener>) -> DeviceEntry {
    match descriptor {
        DeviceDescriptor::Serial { port, settings } => {
            DeviceEntry::Device(build_spec(port, settings, opener))
        }
        DeviceDescriptor::SerialLoader { ports, settings } => DeviceEntry::Loader(Box::new(
            SerialLoader::new(ports.clone(), settings.clone(), Arc::clone(opener)),
        )),
        DeviceDescriptor::Group { devices } => DeviceEntry::Loader(Box::new(GroupLoader::new(
            devices.clone(),
            Arc::clone(opener),
        ))),
        DeviceDescriptor::SerialHotplug {
            prefix,
            scan_interval,
            exclude,
            settings,
        } => DeviceEntry::Hotplug(Arc::new(SerialHotplug::new(
            prefix.clone(),
            Duration::from_secs((*scan_interval).max(1)),
            exclude.clone(),
            settings.clone(),
            Arc::clone(opener),
        ))),
    }
}

/// One device per listed port
pub struct SerialLoader {
    ports: Vec<String>,
    settings: DeviceSettings,
    opener: Arc<dyn LinkOpener>,
}

impl SerialLoader {
    pub fn new(ports: Vec<String>, settings: DeviceSettings, opener: Arc<dyn LinkOpener>) -> Self {
        Self {
            ports,
            settings,
            opener,
        }
    }
}

impl DeviceLoader for SerialLoader {
    fn load_devices(&self) -> Result<Vec<DeviceEntry>, LoaderError> {
        Ok(self
            .ports
            .iter()
            .map(|port| DeviceEntry::Device(build_spec(port, &self.settings, &self.opener)))
            .collect())
    }
}

/// Nested descriptors; may contain further loaders
pub struct GroupLoader {
    devices: Vec<DeviceDescriptor>,
    opener: Arc<dyn LinkOpener>,
}

impl GroupLoader {
    pub fn new(devices: Vec<DeviceDescriptor>, opener: Arc<dyn LinkOpener>) -> Self {
        Self { devices, opener }
    }
}

impl DeviceLoader for GroupLoader {
    fn load_devices(&self) -> Result<Vec<DeviceEntry>, LoaderError> {
        Ok(self
            .devices
            .iter()
            .map(|d| entry_from_descriptor(d, &self.opener))
            .collect())
    }
}

/// Scans the port list and reports every new port whose name starts with
/// `prefix`. A port is reported once per scanner lifetime.
pub struct SerialHotplug {
    prefix: String,
    scan_interval: Duration,
    exclude: Vec<String>,
    settings: DeviceSettings,
    opener: Arc<dyn LinkOpener>,
    known: Arc<Mutex<HashSet<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SerialHotplug {
    pub fn new(
        prefix: String,
        scan_interval: Duration,
        exclude: Vec<String>,
        settings: DeviceSettings,
        opener: Arc<dyn LinkOpener>,
    ) -> Self {
        Self {
            prefix,
            scan_interval,
            exclude,
            settings,
            opener,
            known: Arc::new(Mutex::new(HashSet::new())),
            task: Mutex::new(None),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.task.lock().is_some()
    }
}

impl HotplugLoader for SerialHotplug {
    fn start_listening(&self, sink: DeviceSink) {
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let prefix = self.prefix.clone();
        let exclude = self.exclude.clone();
        let settings = self.settings.clone();
        let opener = Arc::clone(&self.opener);
        let known = Arc::clone(&self.known);
        let scan_interval = self.scan_interval;

        info!(target: LOG_TARGET, "Watching for serial ports matching {}*", prefix);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scan_interval);
            loop {
                ticker.tick().await;
                let scan = Arc::clone(&opener);
                let ports = match tokio::task::spawn_blocking(move || scan.available_ports()).await {
                    Ok(Ok(ports)) => ports,
                    Ok(Err(e)) => {
                        warn!(target: LOG_TARGET, "Hotplug scan failed: {}", e);
                        continue;
                    }
                    Err(e) => {
                        warn!(target: LOG_TARGET, "Hotplug scan task failed: {}", e);
                        continue;
                    }
                };
                for port in ports {
                    if !port.starts_with(&prefix) || exclude.contains(&port) {
                        continue;
                    }
                    if !known.lock().insert(port.clone()) {
                        continue;
                    }
                    info!(target: LOG_TARGET, "New device port {}", port);
                    if !sink.found(DeviceEntry::Device(build_spec(&port, &settings, &opener))) {
                        debug!(target: LOG_TARGET, "Device sink closed, hotplug scan ends");
                        return;
                    }
                }
            }
        }));
    }

    fn stop_listening(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!(target: LOG_TARGET, "Stopped watching {}*", self.prefix);
        }
    }
}

impl Drop for SerialHotplug {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}


// Changelog:
// - v0.3.1 (2026-10-18): Hotplug scans enumerate ports on the blocking pool.
// - v0.3.0 (2026-10-17): Group loader and serial hotplug scanner.
// - v0.2.0 (2026-10-10): DeviceEntry replaces runtime type checks on loaders.
// - v0.1.0 (2026-10-02): Serial port list loader.
