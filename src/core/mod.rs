// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/mod.rs
// Version: 0.2.0
//
// This file is the module declaration for the core data model of rigbridge,
// located in the core subdirectory. It declares submodules and re-exports
// key types for use throughout the project.

pub mod config;
pub mod types;

// Re-export the most commonly used items
pub use config::{Config, ConfigError, DeviceDescriptor, DeviceSettings, PoolConfig, ProtocolKind};
pub use types::{Args, Job, Submission};

// Changelog:
// - v0.2.0 (2026-10-10): Added the config module.
// - v0.1.0 (2026-10-02): Initial core types.
