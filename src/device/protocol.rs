// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/device/protocol.rs
// Version: 0.2.0
//
// This file defines how work and results are framed on a device link, located
// in the device subdirectory. Chip-family encodings plug in behind the
// DeviceProtocol trait; the built-in JSON line protocol suits firmware that
// speaks newline-delimited JSON.
//
// Tree Location:
// - src/device/protocol.rs (device protocol trait and JSON line protocol)
// - Depends on: serde, serde_json

use super::error::LinkError;
use crate::core::config::{DeviceSettings, ProtocolKind};
use crate::core::types::Job;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest partial line kept while waiting for a newline
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Decoded message from a device
#[derive(Debug, Clone, PartialEq)]
pub enum LinkMessage {
    /// The device found a nonce for `job_id`
    Nonce { job_id: String, nonce: String },

    /// The device reported a result that failed its own check
    InvalidNonce { job_id: String },

    /// The device is idle and wants work
    WorkRequest,
}

/// Frames work for a device and decodes what it sends back
pub trait DeviceProtocol: Send + Sync {
    fn name(&self) -> &str;

    fn baud_rate(&self) -> u32;

    /// Expected hashes per second for a device with `cores` cores
    fn theoretical_hash_rate(&self, cores: u32) -> u64;

    /// Bytes that make the device start on `job`. `restart` asks the device
    /// to drop whatever it is hashing.
    fn encode_work(&self, job: &Job, restart: bool) -> Result<Vec<u8>, LinkError>;

    /// Consume complete messages from the front of `buffer`, leaving any
    /// partial message in place.
    fn decode(&self, buffer: &mut Vec<u8>) -> Result<Vec<LinkMessage>, LinkError>;
}

/// Build the protocol selected in the device settings
pub fn protocol_for(settings: &DeviceSettings) -> Arc<dyn DeviceProtocol> {
    match settings.protocol {
        ProtocolKind::JsonLine => Arc::new(JsonLineProtocol::new(
            settings.baud_rate(),
            settings.core_hash_rate,
        )),
    }
}

#[derive(Serialize)]
struct WorkLine<'a> {
    method: &'static str,
    restart: bool,
    job: &'a Job,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeviceLine {
    Nonce { job_id: String, nonce: String },
    Invalid { job_id: String },
    Request,
}

/// Newline-delimited JSON.
///
/// Host to device: `{"method":"work","restart":bool,"job":{...}}`.
/// Device to host: `{"type":"nonce","job_id":..,"nonce":..}`,
/// `{"type":"invalid","job_id":..}` or `{"type":"request"}`.
#[derive(Debug, Clone)]
pub struct JsonLineProtocol {
    baud_rate: u32,
    core_hash_rate: u64,
}

impl JsonLineProtocol {
    pub fn new(baud_rate: u32, core_hash_rate: u64) -> Self {
        Self {
            baud_rate,
            core_hash_rate,
        }
    }
}

impl DeviceProtocol for JsonLineProtocol {
    fn name(&self) -> &str {
        "json-line"
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn theoretical_hash_rate(&self, cores: u32) -> u64 {
        self.core_hash_rate.saturating_mul(cores as u64)
    }

    fn encode_work(&self, job: &Job, restart: bool) -> Result<Vec<u8>, LinkError> {
        let line = WorkLine {
            method: "work",
            restart,
            job,
        };
        let mut bytes = serde_json::to_vec(&line)
            .map_err(|e| LinkError::Protocol(format!("cannot encode job {}: {}", job.job_id, e)))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode(&self, buffer: &mut Vec<u8>) -> Result<Vec<LinkMessage>, LinkError> {
        let mut messages = Vec::new();
        while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=end).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let parsed: DeviceLine = serde_json::from_str(text)
                .map_err(|e| LinkError::Protocol(format!("bad device line '{}': {}", text, e)))?;
            messages.push(match parsed {
                DeviceLine::Nonce { job_id, nonce } => LinkMessage::Nonce { job_id, nonce },
                DeviceLine::Invalid { job_id } => LinkMessage::InvalidNonce { job_id },
                DeviceLine::Request => LinkMessage::WorkRequest,
            });
        }
        if buffer.len() > MAX_PENDING_BYTES {
            return Err(LinkError::Protocol(format!(
                "{} bytes without a line break",
                buffer.len()
            )));
        }
        Ok(messages)
    }
}


// Changelog:
// - v0.2.0 (2026-10-10): DeviceProtocol trait with the JSON line protocol.
// - v0.1.0 (2026-10-02): Initial work framing.
