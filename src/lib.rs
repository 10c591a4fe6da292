// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/lib.rs
// Version: 0.3.1
//
// This file serves as the main library entry point for rigbridge, located at
// the root of the source tree. It exports all public modules and types that
// the binary and the integration tests use.
//
// Tree Location:
// - src/lib.rs (root library file)
// - Exports modules: coordinator, core, device, pool, utils

pub mod coordinator;
pub mod core;
pub mod device;
pub mod pool;
pub mod utils;

// Re-export commonly used types at the crate root for convenience
pub use crate::coordinator::{Assignment, WorkCoordinator};
pub use crate::core::{Config, Job};
pub use crate::device::Device;
pub use crate::pool::{PoolClient, StratumPool};

// Changelog:
// - v0.3.1 (2026-10-18): Dropped the unused boxed-error Result alias.
// - v0.3.0 (2026-10-17): Added the coordinator registry and hotplug support.
// - v0.2.0 (2026-10-10): Device links split into the device module.
// - v0.1.0 (2026-10-02): Library root with core, pool and utils modules.
