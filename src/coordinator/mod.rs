// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/coordinator/mod.rs
// Version: 0.3.0
//
// This file is the module declaration for work coordination in rigbridge,
// located in the coordinator subdirectory.
//
// Tree Location:
// - src/coordinator/mod.rs (coordinator module entry point)
// - Submodules: manager, registry

pub mod manager;
pub mod registry;

pub use manager::{Assignment, DeviceSource, WorkCoordinator};
pub use registry::DeviceRegistry;

// Changelog:
// - v0.3.0 (2026-10-17): Registry split out of the manager.
// - v0.1.0 (2026-10-02): Initial coordinator module.
