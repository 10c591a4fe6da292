// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/core/types.rs
// Version: 0.3.0
//
// This file defines core data structures for rigbridge, located in the core
// subdirectory. It includes types for command-line arguments, pool jobs
// and share submissions.
//
// Tree Location:
// - src/core/types.rs (core data structures)
// - Depends on: clap, serde

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command-line arguments for rigbridge
#[derive(Parser, Debug)]
#[command(
    name = "rigbridge",
    version,
    about = "Distributes pool work across serial mining devices",
    long_about = "rigbridge connects to the first reachable pool of an ordered pool list and\n\
                  hands its jobs to every configured serial mining device. Devices are\n\
                  supervised by a watchdog and reconnected automatically when their link fails.\n\n\
                  Examples:\n\
                    rigbridge --config rig.json\n\
                    rigbridge --config rig.json --log-level debug\n\
                    rigbridge --config rig.json --log-config log4rs.yml"
)]
pub struct Args {
    /// Path to the JSON configuration file (pools and devices)
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "JSON configuration file with pools and devices"
    )]
    pub config: PathBuf,

    /// Optional log4rs YAML configuration; overrides --log-level
    #[arg(long = "log-config", value_name = "FILE")]
    pub log_config: Option<PathBuf>,

    /// Console log level when no log4rs file is given
    #[arg(
        long = "log-level",
        default_value = "info",
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace"
    )]
    pub log_level: String,

    /// Worker name appended to every pool user ("user.worker")
    #[arg(long, value_name = "NAME")]
    pub worker: Option<String>,
}

impl Args {
    /// Validate arguments and return helpful errors
    pub fn validate(&self) -> Result<(), String> {
        if self.log_config.is_none() && self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(format!("Unknown log level '{}'", self.log_level));
        }
        if let Some(worker) = &self.worker {
            if worker.is_empty() || worker.contains(char::is_whitespace) {
                return Err("Worker name must be non-empty and contain no spaces".to_string());
            }
        }
        Ok(())
    }
}

/// A unit of work issued by a pool.
///
/// Jobs are immutable once built and shared as `Arc<Job>`. The job id is
/// opaque: it is only ever compared for equality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Pool-assigned job identifier
    pub job_id: String,

    /// Previous block hash (hex, as sent by the pool)
    pub prev_hash: String,

    /// Coinbase part before the extranonces (hex)
    pub coinbase1: String,

    /// Coinbase part after the extranonces (hex)
    pub coinbase2: String,

    /// Merkle branch hashes (hex)
    #[serde(default)]
    pub merkle_branch: Vec<String>,

    /// Block version (hex)
    pub version: String,

    /// Encoded network target (hex)
    pub nbits: String,

    /// Job timestamp (hex)
    pub ntime: String,

    /// Extranonce1 bound to the pool connection that produced this job
    pub extranonce1: String,

    /// Extranonce2 length in bytes
    pub extranonce2_size: usize,

    /// Share difficulty in force when the job was received
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,

    /// Pool asked for outstanding work to be discarded
    #[serde(default)]
    pub clean_jobs: bool,
}

fn default_difficulty() -> f64 {
    1.0
}

impl Job {
    /// Number of difficulty-1 work units a share on this job is worth
    pub fn work_units(&self) -> u64 {
        if self.difficulty.is_finite() && self.difficulty >= 1.0 {
            self.difficulty as u64
        } else {
            1
        }
    }
}

/// A solved result on its way to the pool
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Job the nonce was found for
    pub job_id: String,

    /// Nonce reported by the device (hex)
    pub nonce: String,

    /// Extranonce2 the device hashed with (hex)
    pub extranonce2: String,

    /// Timestamp the device hashed with (hex)
    pub ntime: String,

    /// Device that found the nonce
    pub device_id: usize,
}

impl Submission {
    /// Build a submission for `job`, using an all-zero extranonce2 and the
    /// job's own ntime when the device did not roll them.
    pub fn for_job(job: &Job, device_id: usize, nonce: &str) -> Self {
        Self {
            job_id: job.job_id.clone(),
            nonce: nonce.to_string(),
            extranonce2: hex::encode(vec![0u8; job.extranonce2_size]),
            ntime: job.ntime.clone(),
            device_id,
        }
    }
}


// Changelog:
// - v0.3.0 (2026-10-17): Added worker override to Args.
// - v0.2.0 (2026-10-10): Added difficulty to Job for work-unit accounting.
// - v0.1.0 (2026-10-02): Initial job, submission and argument types.
