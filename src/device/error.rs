// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/device/error.rs
// Version: 0.2.1
//
// Errors raised by device links and device loaders.

use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("{port} is not a valid serial port")]
    PortNotFound { port: String },

    #[error("Failed to enumerate serial ports: {0}")]
    Enumerate(String),

    #[error("Error connecting to {port}")]
    Open {
        port: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on device link")]
    Io(#[from] io::Error),

    #[error("Device link closed by the device")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Device did not take work within {0:?}")]
    WriteTimeout(Duration),

    #[error("Blocking link task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Device loader failed: {0}")]
    Link(#[from] LinkError),

    #[error("Device loader failed: {0}")]
    Other(String),
}

// Changelog:
// - v0.2.1 (2026-10-18): Write timeout and blocking task errors.
// - v0.2.0 (2026-10-10): Split loader errors from link errors.
// - v0.1.0 (2026-10-02): Initial serial connection errors.
