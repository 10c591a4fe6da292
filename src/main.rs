// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/main.rs
// Version: 0.3.0
//
// Binary entry point: parses arguments, sets up logging, loads the
// configuration file and runs the coordinator until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use rigbridge::coordinator::{DeviceSource, WorkCoordinator};
use rigbridge::core::{Args, Config};
use rigbridge::device::{LinkOpener, SerialOpener, entry_from_descriptor};
use rigbridge::pool::{PoolClient, StratumPool};
use std::sync::Arc;
use std::time::Duration;

const LOG_TARGET: &str = "rigbridge::main";

fn init_logging(args: &Args) -> Result<()> {
    if let Some(path) = &args.log_config {
        log4rs::init_file(path, Default::default())
            .with_context(|| format!("Failed to load log configuration {:?}", path))?;
        return Ok(());
    }

    let level: LevelFilter = args
        .log_level
        .parse()
        .with_context(|| format!("Unknown log level '{}'", args.log_level))?;
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l:5})} [{t}] {m}{n}",
        )))
        .build();
    let config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(err) = args.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    init_logging(&args)?;

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Cannot use configuration {:?}", args.config))?;
    if let Some(worker) = &args.worker {
        config.apply_worker(worker);
    }

    let pools: Vec<StratumPool> = config.pools.iter().map(StratumPool::new).collect();
    for (index, pool) in pools.iter().enumerate() {
        info!(target: LOG_TARGET, "Pool {}: {}", index, pool.url());
    }

    let opener: Arc<dyn LinkOpener> = Arc::new(SerialOpener);
    let descriptors = config.devices.clone();
    let source: DeviceSource = Box::new(move || {
        descriptors
            .iter()
            .map(|d| entry_from_descriptor(d, &opener))
            .collect()
    });

    let coordinator = WorkCoordinator::new(pools, source, Duration::from_secs(config.stats_interval));
    coordinator.start();
    info!(target: LOG_TARGET, "rigbridge running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!(target: LOG_TARGET, "Shutting down");
    coordinator.log_stats();
    coordinator.stop().await;
    Ok(())
}

// Changelog:
// - v0.3.0 (2026-10-17): Worker override and final statistics on shutdown.
// - v0.2.0 (2026-10-10): log4rs console logging or YAML configuration.
// - v0.1.0 (2026-10-02): Configuration file driven startup.
