// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/utils/format.rs
// Version: 0.2.0
//
// This file provides formatting helpers for device statistics, located in
// the utils subdirectory. Hash rates, uptimes and counters are rendered the
// same way in every log line.
//
// Tree Location:
// - src/utils/format.rs (formatting utilities)
// - Depends on: crate::device::stats

use crate::device::stats::StatsSnapshot;
use std::time::Duration;

/// Utility functions for formatting device statistics
pub struct FormatUtils;

impl FormatUtils {
    /// Format hashrate in appropriate units (H/s up to TH/s)
    pub fn format_hashrate(hashrate: f64) -> String {
        if hashrate >= 1_000_000_000_000.0 {
            format!("{:.2} TH/s", hashrate / 1_000_000_000_000.0)
        } else if hashrate >= 1_000_000_000.0 {
            format!("{:.2} GH/s", hashrate / 1_000_000_000.0)
        } else if hashrate >= 1_000_000.0 {
            format!("{:.2} MH/s", hashrate / 1_000_000.0)
        } else if hashrate >= 1_000.0 {
            format!("{:.2} KH/s", hashrate / 1_000.0)
        } else {
            format!("{:.2} H/s", hashrate)
        }
    }

    /// Format an uptime as h/m/s
    pub fn format_uptime(duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m{:02}s", secs / 60, secs % 60)
        } else {
            format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
        }
    }

    /// Format large numbers with suffixes (K, M, B)
    pub fn format_number(num: u64) -> String {
        if num >= 1_000_000_000 {
            format!("{:.1}B", num as f64 / 1_000_000_000.0)
        } else if num >= 1_000_000 {
            format!("{:.1}M", num as f64 / 1_000_000.0)
        } else if num >= 1_000 {
            format!("{:.1}K", num as f64 / 1_000.0)
        } else {
            num.to_string()
        }
    }

    /// One log line summarising a device
    pub fn format_device_stats(id: usize, name: &str, stats: &StatsSnapshot, uptime: Duration) -> String {
        format!(
            "Device {} ({}) up {} | A:{} R:{} HW:{} | {} accepted, {} rejected, {} discarded (rated {})",
            id,
            name,
            Self::format_uptime(uptime),
            Self::format_number(stats.accepted),
            Self::format_number(stats.rejected),
            Self::format_number(stats.hardware_errors),
            Self::format_hashrate(stats.accepted_hash_rate),
            Self::format_hashrate(stats.rejected_hash_rate),
            Self::format_hashrate(stats.discarded_hash_rate),
            Self::format_hashrate(stats.theoretical_hash_rate as f64),
        )
    }
}


// Changelog:
// - v0.2.0 (2026-10-10): Device statistics line and TH/s unit.
//   - Uptime replaces the relative "ago" duration.
// - v0.1.0 (2026-10-02): Hashrate and number formatting.
