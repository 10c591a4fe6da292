// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/pool/client.rs
// Version: 0.2.0
//
// This file defines the pool facade the work coordinator talks to, located in
// the pool subdirectory. The coordinator never sees wire bytes: a pool hands
// it decoded jobs and disconnect notices through a bound event channel.
//
// Tree Location:
// - src/pool/client.rs (pool facade trait and events)
// - Depends on: tokio, thiserror

use crate::core::types::{Job, Submission};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Notifications a pool delivers to the coordinator inbox
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A new job arrived. `force_restart` is set when the pool wants
    /// outstanding work dropped (new block).
    NewJob {
        pool: usize,
        job: Arc<Job>,
        force_restart: bool,
    },

    /// The pool connection was lost or could not be established
    Disconnected { pool: usize },
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Pool {url} is not connected")]
    NotConnected { url: String },

    #[error("Failed to resolve pool address {url}")]
    Resolve { url: String },

    #[error("I/O error talking to pool")]
    Io(#[from] std::io::Error),

    #[error("Malformed pool message: {0}")]
    Malformed(String),

    #[error("Failed to serialize pool message")]
    Serialization(#[from] serde_json::Error),

    #[error("Pool rejected request: {0}")]
    Rejected(String),

    #[error("No response to submission {id} within {secs}s")]
    Timeout { id: u64, secs: u64 },

    #[error("Pool connection closed")]
    Closed,
}

/// Facade over one upstream pool connection.
///
/// `start` and `stop` must not block: connecting happens in the background
/// and its outcome is reported through the bound event sink.
pub trait PoolClient: Send + Sync + 'static {
    /// Address used for logging
    fn url(&self) -> &str;

    /// Begin connecting. No-op while already connected or connecting.
    fn start(&self);

    /// Drop the connection without reporting a disconnect
    fn stop(&self);

    fn is_connected(&self) -> bool;

    fn is_connecting(&self) -> bool;

    /// Submit a solved share. Resolves to `true` when the pool accepted it.
    fn submit_work(
        &self,
        submission: Submission,
    ) -> impl Future<Output = Result<bool, PoolError>> + Send;

    /// Route this pool's events, tagged with `index`, into `sink`
    fn bind(&self, index: usize, sink: UnboundedSender<PoolEvent>);

    /// Stop routing events anywhere
    fn unbind(&self);
}

// Changelog:
// - v0.2.0 (2026-10-10): Pool facade turned into a trait.
//   - Events are delivered over an mpsc sink instead of callbacks.
//   - Added PoolError variants for submission timeouts and rejections.
// - v0.1.0 (2026-10-02): Initial TCP pool client.
