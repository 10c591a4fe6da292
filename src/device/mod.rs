// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/device/mod.rs
// Version: 0.3.0
//
// This file is the module declaration for device links in rigbridge, located
// in the device subdirectory. It declares submodules and re-exports key types
// for use by the coordinator.
//
// Tree Location:
// - src/device/mod.rs (device module entry point)
// - Submodules: error, link, loader, port, protocol, stats

pub mod error;
pub mod link;
pub mod loader;
pub mod port;
pub mod protocol;
pub mod stats;

// Re-export key types for convenience
pub use error::{LinkError, LoaderError};
pub use link::{Device, DeviceConfig, DeviceEvent, DeviceSpec, LinkState, RESTART_DELAY, WRITE_TIMEOUT};
pub use loader::{
    DeviceEntry, DeviceLoader, DeviceSink, GroupLoader, HotplugLoader, SerialHotplug, SerialLoader,
    build_spec, entry_from_descriptor,
};
pub use port::{BoxedPort, LinkOpener, LinkPort, SerialOpener};
pub use protocol::{DeviceProtocol, JsonLineProtocol, LinkMessage, protocol_for};
pub use stats::{DeviceStats, StatsSnapshot};

// Changelog:
// - v0.3.0 (2026-10-17): Added loader module with hotplug scanning.
// - v0.2.0 (2026-10-10): Split link, port and protocol modules.
// - v0.1.0 (2026-10-02): Initial serial device module.
