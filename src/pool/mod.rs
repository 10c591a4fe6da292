// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/pool/mod.rs
// Version: 0.2.0
//
// This file is the module declaration for pool communication in rigbridge,
// located in the pool subdirectory. It declares submodules and re-exports
// key types for use by the coordinator.
//
// Tree Location:
// - src/pool/mod.rs (pool module entry point)
// - Submodules: client, messages, protocol, stratum

pub mod client;
pub mod messages;
pub mod protocol;
pub mod stratum;

// Re-export key types for convenience
pub use client::{PoolClient, PoolError, PoolEvent};
pub use stratum::StratumPool;

// Changelog:
// - v0.2.0 (2026-10-10): PoolClient became a trait; Stratum V1 moved to stratum.rs.
// - v0.1.0 (2026-10-02): Pool module with client, messages and protocol.
