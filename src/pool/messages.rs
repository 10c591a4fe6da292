// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/pool/messages.rs
// Version: 0.2.0
//
// This file parses incoming Stratum V1 messages, located in the pool
// subdirectory. Only the fields the coordinator consumes are extracted.
//
// Tree Location:
// - src/pool/messages.rs (Stratum message parsing)
// - Depends on: serde_json

use super::client::PoolError;
use super::protocol::{AUTHORIZE_ID, FIRST_SUBMIT_ID, SUBSCRIBE_ID};
use log::debug;
use serde_json::Value;

const LOG_TARGET: &str = "rigbridge::pool::messages";

/// Fields of a mining.notify the coordinator needs
#[derive(Debug, Clone, PartialEq)]
pub struct NotifyParams {
    pub job_id: String,
    pub prev_hash: String,
    pub coinbase1: String,
    pub coinbase2: String,
    pub merkle_branch: Vec<String>,
    pub version: String,
    pub nbits: String,
    pub ntime: String,
    pub clean_jobs: bool,
}

/// Stratum V1 messages relevant to the pool client
#[derive(Debug, Clone, PartialEq)]
pub enum PoolMessage {
    Subscribed {
        extranonce1: String,
        extranonce2_size: usize,
    },
    Authorized(bool),
    Notify(NotifyParams),
    SetDifficulty(f64),
    SubmitResult {
        id: u64,
        accepted: bool,
        reason: Option<String>,
    },
    Error(String),
}

/// Parse one line received from the pool. Unknown messages yield `Ok(None)`.
pub fn parse_pool_message(line: &str) -> Result<Option<PoolMessage>, PoolError> {
    let value: Value = serde_json::from_str(line)?;

    if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
        let params = value.get("params").unwrap_or(&Value::Null);
        return match method {
            "mining.notify" => parse_notify(params).map(|p| Some(PoolMessage::Notify(p))),
            "mining.set_difficulty" => {
                let difficulty = params
                    .get(0)
                    .and_then(|d| d.as_f64())
                    .ok_or_else(|| PoolError::Malformed("set_difficulty without value".to_string()))?;
                Ok(Some(PoolMessage::SetDifficulty(difficulty)))
            }
            other => {
                debug!(target: LOG_TARGET, "Ignoring pool method {}", other);
                Ok(None)
            }
        };
    }

    let Some(id) = value.get("id").and_then(|id| id.as_u64()) else {
        debug!(target: LOG_TARGET, "Unknown pool message: {}", line);
        return Ok(None);
    };
    let result = value.get("result").unwrap_or(&Value::Null);
    let error = value
        .get("error")
        .filter(|e| !e.is_null())
        .map(describe_error);

    match id {
        SUBSCRIBE_ID => {
            if let Some(reason) = error {
                return Ok(Some(PoolMessage::Error(reason)));
            }
            let extranonce1 = result
                .get(1)
                .and_then(|e| e.as_str())
                .ok_or_else(|| PoolError::Malformed("subscribe result without extranonce1".to_string()))?;
            let extranonce2_size = result
                .get(2)
                .and_then(|s| s.as_u64())
                .ok_or_else(|| PoolError::Malformed("subscribe result without extranonce2 size".to_string()))?;
            Ok(Some(PoolMessage::Subscribed {
                extranonce1: extranonce1.to_string(),
                extranonce2_size: extranonce2_size as usize,
            }))
        }
        AUTHORIZE_ID => Ok(Some(PoolMessage::Authorized(
            error.is_none() && result.as_bool().unwrap_or(false),
        ))),
        id if id >= FIRST_SUBMIT_ID => Ok(Some(PoolMessage::SubmitResult {
            id,
            accepted: error.is_none() && result.as_bool().unwrap_or(false),
            reason: error,
        })),
        _ => Ok(error.map(PoolMessage::Error)),
    }
}

fn parse_notify(params: &Value) -> Result<NotifyParams, PoolError> {
    let params = params
        .as_array()
        .filter(|p| p.len() >= 9)
        .ok_or_else(|| PoolError::Malformed("mining.notify needs 9 params".to_string()))?;

    let text = |index: usize, name: &str| -> Result<String, PoolError> {
        params[index]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PoolError::Malformed(format!("mining.notify {} is not a string", name)))
    };

    let merkle_branch = params[4]
        .as_array()
        .ok_or_else(|| PoolError::Malformed("mining.notify merkle branch is not a list".to_string()))?
        .iter()
        .filter_map(|h| h.as_str().map(str::to_string))
        .collect();

    Ok(NotifyParams {
        job_id: text(0, "job_id")?,
        prev_hash: text(1, "prevhash")?,
        coinbase1: text(2, "coinb1")?,
        coinbase2: text(3, "coinb2")?,
        merkle_branch,
        version: text(5, "version")?,
        nbits: text(6, "nbits")?,
        ntime: text(7, "ntime")?,
        clean_jobs: params[8].as_bool().unwrap_or(false),
    })
}

// Stratum errors are usually [code, "message", data]
fn describe_error(error: &Value) -> String {
    match error {
        Value::Array(parts) => parts
            .get(1)
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}


// Changelog:
// - v0.2.0 (2026-10-10): Switched to Stratum V1 message set.
//   - Parses subscribe, authorize, notify, set_difficulty and submit results.
// - v0.1.0 (2026-10-02): Initial pool message parsing.
