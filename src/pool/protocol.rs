// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/pool/protocol.rs
// Version: 0.2.0
//
// This file builds outgoing Stratum V1 requests, located in the pool
// subdirectory. It constructs subscribe, authorize and submit messages.
//
// Tree Location:
// - src/pool/protocol.rs (Stratum request builders)
// - Depends on: serde_json, crate::core::types

use crate::core::types::Submission;
use log::{debug, error};
use serde_json::{Value, json};

const LOG_TARGET: &str = "rigbridge::pool::protocol";

/// Request id used for mining.subscribe
pub const SUBSCRIBE_ID: u64 = 1;

/// Request id used for mining.authorize
pub const AUTHORIZE_ID: u64 = 2;

/// Submissions are numbered from here upwards
pub const FIRST_SUBMIT_ID: u64 = 100;

/// Constructs messages for the Stratum protocol
pub struct StratumProtocol;

impl StratumProtocol {
    /// Create a subscribe request message
    pub fn create_subscribe_request(agent: &str) -> Value {
        json!({
            "id": SUBSCRIBE_ID,
            "method": "mining.subscribe",
            "params": [agent]
        })
    }

    /// Create an authorization request
    pub fn create_authorize_request(user: &str, password: &str) -> Value {
        if user.is_empty() {
            error!(target: LOG_TARGET, "Invalid pool user: empty");
            return json!({});
        }
        json!({
            "id": AUTHORIZE_ID,
            "method": "mining.authorize",
            "params": [user, password]
        })
    }

    /// Create a share submission request message
    pub fn create_submit_request(user: &str, submission: &Submission, submit_id: u64) -> Value {
        if submission.job_id.is_empty() || submission.nonce.is_empty() {
            error!(target: LOG_TARGET,
                "Invalid share submission: job_id={}, nonce={}",
                submission.job_id, submission.nonce
            );
            return json!({});
        }
        json!({
            "id": submit_id,
            "method": "mining.submit",
            "params": [
                user,
                submission.job_id,
                submission.extranonce2,
                submission.ntime,
                submission.nonce
            ]
        })
    }

    /// Convert a JSON message to a string with newline
    pub fn to_message(json: Value) -> String {
        if json.is_null() || json.as_object().is_some_and(|o| o.is_empty()) {
            error!(target: LOG_TARGET, "Attempted to serialize empty JSON message");
            return String::new();
        }
        debug!(target: LOG_TARGET, "Serialized Stratum message: {}", json);
        format!("{}\n", json)
    }
}


// Changelog:
// - v0.2.0 (2026-10-10): Stratum V1 only.
//   - Submit requests take a Submission and use the authorized user.
//   - Empty objects are refused by to_message as well as null.
// - v0.1.0 (2026-10-02): Initial login and submit builders.
