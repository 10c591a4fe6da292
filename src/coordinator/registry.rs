// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/coordinator/registry.rs
// Version: 0.3.0
//
// This file implements the device registry, located in the coordinator
// subdirectory. It flattens the configured device tree into Device instances
// with sequential ids and keeps the hotplug loaders it started so they can be
// stopped again.
//
// Tree Location:
// - src/coordinator/registry.rs (device registry)
// - Depends on: parking_lot, crate::device

use crate::device::{Device, DeviceEntry, DeviceEvent, DeviceSink, HotplugLoader};
use log::{error, info};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

const LOG_TARGET: &str = "rigbridge::coordinator::registry";

#[derive(Default)]
struct RegistryInner {
    devices: Vec<Arc<Device>>,
    hotplug: Vec<Arc<dyn HotplugLoader>>,
    next_id: usize,
    open: bool,
}

/// Loaded devices and running hotplug loaders.
///
/// Ids are handed out in admission order and never reused, even across
/// stop/start cycles of the coordinator.
#[derive(Default)]
pub struct DeviceRegistry {
    inner: Mutex<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept admissions until the next `close`
    pub fn open(&self) {
        self.inner.lock().open = true;
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Resolve `entry` recursively and admit every device it yields.
    /// Hotplug loaders are started with `sink`. Returns the admitted devices;
    /// nothing is admitted while the registry is closed.
    pub fn resolve(
        &self,
        entry: DeviceEntry,
        events: &UnboundedSender<DeviceEvent>,
        sink: &DeviceSink,
    ) -> Vec<Arc<Device>> {
        match entry {
            DeviceEntry::Device(spec) => {
                let mut inner = self.inner.lock();
                if !inner.open {
                    return Vec::new();
                }
                let id = inner.next_id;
                inner.next_id += 1;
                let device = Arc::new(Device::new(id, spec, events.clone()));
                info!(target: LOG_TARGET,
                    "Registered device {} ({}) on {}",
                    id,
                    device.name(),
                    device.port()
                );
                inner.devices.push(Arc::clone(&device));
                vec![device]
            }
            DeviceEntry::Loader(loader) => match loader.load_devices() {
                Ok(entries) => entries
                    .into_iter()
                    .flat_map(|e| self.resolve(e, events, sink))
                    .collect(),
                Err(e) => {
                    error!(target: LOG_TARGET, "{}", e);
                    Vec::new()
                }
            },
            DeviceEntry::Hotplug(hotplug) => {
                let mut inner = self.inner.lock();
                if inner.open {
                    hotplug.start_listening(sink.clone());
                    inner.hotplug.push(hotplug);
                }
                Vec::new()
            }
        }
    }

    /// Refuse further admissions, stop every hotplug loader and hand back the
    /// devices so the caller can unload them.
    pub fn close(&self) -> Vec<Arc<Device>> {
        let (devices, hotplug) = {
            let mut inner = self.inner.lock();
            inner.open = false;
            (
                std::mem::take(&mut inner.devices),
                std::mem::take(&mut inner.hotplug),
            )
        };
        for loader in hotplug {
            loader.stop_listening();
        }
        devices
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner.lock().devices.clone()
    }

    pub fn get(&self, id: usize) -> Option<Arc<Device>> {
        self.inner
            .lock()
            .devices
            .iter()
            .find(|d| d.id() == id)
            .cloned()
    }

    /// Whether this exact device instance is still registered
    pub fn contains(&self, device: &Arc<Device>) -> bool {
        self.inner
            .lock()
            .devices
            .iter()
            .any(|d| Arc::ptr_eq(d, device))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}


// Changelog:
// - v0.3.0 (2026-10-17): Id counter survives close so ids are never reused.
// - v0.2.0 (2026-10-10): Recursive resolution of loaders and hotplug loaders.
// - v0.1.0 (2026-10-02): Flat device list.
