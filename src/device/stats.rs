// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/device/stats.rs
// Version: 0.2.0
//
// This file implements per-device statistics, located in the device
// subdirectory. Counters are atomics written from the read loop and the
// submission tasks; hash rates are derived on read.
//
// Tree Location:
// - src/device/stats.rs (per-device statistics logic)
// - Depends on: parking_lot

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Expected hashes behind one difficulty-1 work unit
pub const HASHES_PER_WORK_UNIT: f64 = 65535.0;

pub struct DeviceStats {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub hardware_errors: AtomicU64,
    pub accepted_work_units: AtomicU64,
    pub rejected_work_units: AtomicU64,
    pub discarded_work_units: AtomicU64,
    pub restarts: AtomicU64,
    theoretical_hash_rate: AtomicU64,
    start_time: Mutex<Instant>,
}

/// Point-in-time copy of a device's counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub hardware_errors: u64,
    pub discarded_work_units: u64,
    pub theoretical_hash_rate: u64,
    pub accepted_hash_rate: f64,
    pub rejected_hash_rate: f64,
    pub discarded_hash_rate: f64,
}

impl DeviceStats {
    pub fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            hardware_errors: AtomicU64::new(0),
            accepted_work_units: AtomicU64::new(0),
            rejected_work_units: AtomicU64::new(0),
            discarded_work_units: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            theoretical_hash_rate: AtomicU64::new(0),
            start_time: Mutex::new(Instant::now()),
        }
    }

    /// Zero the share counters and restart the measurement window.
    /// The restart count survives so link flapping stays visible.
    pub fn reset(&self, theoretical_hash_rate: u64) {
        self.accepted.store(0, Ordering::Relaxed);
        self.rejected.store(0, Ordering::Relaxed);
        self.hardware_errors.store(0, Ordering::Relaxed);
        self.accepted_work_units.store(0, Ordering::Relaxed);
        self.rejected_work_units.store(0, Ordering::Relaxed);
        self.discarded_work_units.store(0, Ordering::Relaxed);
        self.theoretical_hash_rate
            .store(theoretical_hash_rate, Ordering::Relaxed);
        *self.start_time.lock() = Instant::now();
    }

    /// Record the pool's verdict on a share worth `work_units`
    pub fn record_share(&self, work_units: u64, accepted: bool) {
        if accepted {
            self.accepted.fetch_add(1, Ordering::Relaxed);
            self.accepted_work_units
                .fetch_add(work_units, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            self.rejected_work_units
                .fetch_add(work_units, Ordering::Relaxed);
        }
    }

    pub fn record_discarded(&self, work_units: u64) {
        self.discarded_work_units
            .fetch_add(work_units, Ordering::Relaxed);
    }

    pub fn record_hardware_error(&self) {
        self.hardware_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the last reset
    pub fn elapsed(&self) -> Duration {
        self.start_time.lock().elapsed()
    }

    pub fn theoretical_hash_rate(&self) -> u64 {
        self.theoretical_hash_rate.load(Ordering::Relaxed)
    }

    /// Hashes per second represented by `work_units` over the time since the
    /// last reset
    pub fn compute_hash_rate(&self, work_units: u64) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            HASHES_PER_WORK_UNIT * work_units as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn accepted_hash_rate(&self) -> f64 {
        self.compute_hash_rate(self.accepted_work_units.load(Ordering::Relaxed))
    }

    pub fn rejected_hash_rate(&self) -> f64 {
        self.compute_hash_rate(self.rejected_work_units.load(Ordering::Relaxed))
    }

    pub fn discarded_hash_rate(&self) -> f64 {
        self.compute_hash_rate(self.discarded_work_units.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            hardware_errors: self.hardware_errors.load(Ordering::Relaxed),
            discarded_work_units: self.discarded_work_units.load(Ordering::Relaxed),
            theoretical_hash_rate: self.theoretical_hash_rate(),
            accepted_hash_rate: self.accepted_hash_rate(),
            rejected_hash_rate: self.rejected_hash_rate(),
            discarded_hash_rate: self.discarded_hash_rate(),
        }
    }
}

impl Default for DeviceStats {
    fn default() -> Self {
        Self::new()
    }
}


// Changelog:
// - v0.2.0 (2026-10-10): Hash rates derived on read from atomic counters.
//   - Added discarded work units for stale results.
// - v0.1.0 (2026-10-02): Per-device share counters.
