// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/device/link.rs
// Version: 0.4.0
//
// This file implements the device link, located in the device subdirectory.
// A Device owns one connection to a mining device: it connects in the
// background, runs a read loop and a watchdog, issues work, and tears the
// link down and rebuilds it when I/O fails.
//
// Tree Location:
// - src/device/link.rs (device lifecycle, read loop, watchdog)
// - Depends on: tokio, parking_lot, crate::device

use super::error::LinkError;
use super::port::{BoxedPort, LinkOpener};
use super::protocol::{DeviceProtocol, LinkMessage};
use super::stats::DeviceStats;
use crate::core::types::Job;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

const LOG_TARGET: &str = "rigbridge::device::link";

/// Pause between a link failure and the rebuild it triggers
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

// Jobs remembered so late nonces can still be matched to their job
const RECENT_JOBS: usize = 8;

const READ_CHUNK: usize = 1024;

/// Longest a single work write may take before the link is rebuilt
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Static description of one device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub name: String,
    pub port: String,
    pub cores: u32,
    pub watchdog_timeout: Duration,
    pub poll_interval: Duration,
}

/// Everything needed to build a device except its identity
#[derive(Clone)]
pub struct DeviceSpec {
    pub config: DeviceConfig,
    pub protocol: Arc<dyn DeviceProtocol>,
    pub opener: Arc<dyn LinkOpener>,
}

/// Notifications a device delivers to the coordinator inbox
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    ValidNonce {
        device: usize,
        job: Arc<Job>,
        nonce: String,
    },
    WorkRequested {
        device: usize,
    },
    InvalidNonce {
        device: usize,
        job: Arc<Job>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unloaded,
    Connecting,
    Listening,
    Restarting,
}

#[derive(Default)]
struct WorkSlot {
    current: Option<Arc<Job>>,
    pending: Option<(Arc<Job>, bool)>,
    recent: VecDeque<Arc<Job>>,
    // Feeds the writer task while the link is listening
    outbox: Option<UnboundedSender<(Arc<Job>, bool)>>,
}

#[derive(Default)]
struct LinkSlot {
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

pub struct Device {
    id: usize,
    config: DeviceConfig,
    protocol: Arc<dyn DeviceProtocol>,
    opener: Arc<dyn LinkOpener>,
    events: UnboundedSender<DeviceEvent>,
    stats: DeviceStats,
    // Bumped on every load and unload; background work tagged with an older
    // value is stale and must not touch the link.
    generation: AtomicU64,
    state: Mutex<LinkState>,
    work: Mutex<WorkSlot>,
    watchdog_kick: Arc<Notify>,
    link: tokio::sync::Mutex<LinkSlot>,
}

impl Device {
    pub fn new(id: usize, spec: DeviceSpec, events: UnboundedSender<DeviceEvent>) -> Self {
        Self {
            id,
            config: spec.config,
            protocol: spec.protocol,
            opener: spec.opener,
            events,
            stats: DeviceStats::new(),
            generation: AtomicU64::new(0),
            state: Mutex::new(LinkState::Unloaded),
            work: Mutex::new(WorkSlot::default()),
            watchdog_kick: Arc::new(Notify::new()),
            link: tokio::sync::Mutex::new(LinkSlot::default()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn port(&self) -> &str {
        &self.config.port
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    /// Job most recently handed to this device
    pub fn current_job(&self) -> Option<Arc<Job>> {
        self.work.lock().current.clone()
    }

    pub fn current_job_id(&self) -> Option<String> {
        self.work.lock().current.as_ref().map(|j| j.job_id.clone())
    }

    fn set_state(&self, state: LinkState) {
        *self.state.lock() = state;
    }

    fn is_generation(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Reset counters and connect in the background. No-op unless unloaded.
    pub async fn load(self: &Arc<Self>) {
        let _link = self.link.lock().await;
        if self.state() != LinkState::Unloaded {
            debug!(target: LOG_TARGET, "Device {} already loaded", self.id);
            return;
        }
        self.begin_load(true);
    }

    // Caller holds the link lock
    fn begin_load(self: &Arc<Self>, reset_stats: bool) {
        if reset_stats {
            self.stats
                .reset(self.protocol.theoretical_hash_rate(self.config.cores));
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(LinkState::Connecting);
        tokio::spawn(Arc::clone(self).connect(generation));
    }

    async fn connect(self: Arc<Self>, generation: u64) {
        if let Err(e) = self.open_link(generation).await {
            error!(target: LOG_TARGET,
                "Device {} ({}) connection error: {}",
                self.id, self.config.port, e
            );
            self.schedule_restart(generation);
        }
    }

    async fn open_link(self: &Arc<Self>, generation: u64) -> Result<(), LinkError> {
        {
            let mut link = self.link.lock().await;
            if !self.is_generation(generation) {
                debug!(target: LOG_TARGET, "Device {} connect superseded", self.id);
                return Ok(());
            }
            self.start_watchdog(&mut link);
        }

        // Enumeration and open may block, so neither runs under the link lock
        let port = self.open_port().await?;

        let mut link = self.link.lock().await;
        if !self.is_generation(generation) {
            debug!(target: LOG_TARGET,
                "Device {} unloaded while opening {}, closing it",
                self.id, self.config.port
            );
            return Ok(());
        }
        info!(target: LOG_TARGET,
            "Successfully connected device {} to {}",
            self.id, self.config.port
        );

        let (reader, writer) = tokio::io::split(port);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbox, jobs) = unbounded_channel();
        link.reader = Some(tokio::spawn(Arc::clone(self).read_loop(
            reader,
            shutdown_rx.clone(),
            generation,
        )));
        link.writer = Some(tokio::spawn(Arc::clone(self).write_loop(
            writer,
            jobs,
            shutdown_rx,
            generation,
        )));
        link.shutdown = Some(shutdown_tx);

        let mut work = self.work.lock();
        if let Some(pending) = work.pending.take() {
            let _ = outbox.send(pending);
        }
        work.outbox = Some(outbox);
        self.set_state(LinkState::Listening);
        Ok(())
    }

    async fn open_port(&self) -> Result<BoxedPort, LinkError> {
        let opener = Arc::clone(&self.opener);
        let port = self.config.port.clone();
        let baud_rate = self.protocol.baud_rate();
        tokio::task::spawn_blocking(move || {
            let ports = opener.available_ports()?;
            if !ports.iter().any(|p| *p == port) {
                return Err(LinkError::PortNotFound { port });
            }
            opener.open(&port, baud_rate)
        })
        .await
        .map_err(|e| LinkError::Task(e.to_string()))?
    }

    fn start_watchdog(self: &Arc<Self>, link: &mut LinkSlot) {
        if let Some(previous) = link.watchdog.take() {
            previous.abort();
        }
        let device = Arc::downgrade(self);
        let kick = Arc::clone(&self.watchdog_kick);
        let timeout = self.config.watchdog_timeout;
        link.watchdog = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = kick.notified() => continue,
                    _ = tokio::time::sleep(timeout) => {
                        let Some(device) = device.upgrade() else { break };
                        warn!(target: LOG_TARGET,
                            "Device {} ({}) hasn't responded for {} sec. Requesting work.",
                            device.id, device.config.name, timeout.as_secs()
                        );
                        device.request_work();
                    }
                }
            }
        }));
    }

    async fn read_loop(
        self: Arc<Self>,
        mut reader: ReadHalf<BoxedPort>,
        mut shutdown: watch::Receiver<bool>,
        generation: u64,
    ) {
        let mut buffer = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];

        let failure = loop {
            let read = tokio::select! {
                _ = shutdown.changed() => break None,
                read = reader.read(&mut chunk) => read,
            };
            match read {
                Ok(0) => break Some(LinkError::Closed),
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    match self.protocol.decode(&mut buffer) {
                        Ok(messages) => {
                            for message in messages {
                                self.handle_message(message);
                            }
                        }
                        Err(e) => break Some(e),
                    }
                }
                Err(e) => break Some(LinkError::Io(e)),
            }
            tokio::select! {
                _ = shutdown.changed() => break None,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        };

        if let Some(e) = failure {
            error!(target: LOG_TARGET,
                "Device {} ({}) read loop failed: {}",
                self.id, self.config.port, e
            );
            self.schedule_restart(generation);
        }
        debug!(target: LOG_TARGET, "Device {} read loop exited", self.id);
    }

    // Sole owner of the write half. A device that stops taking work only
    // stalls this task, and a write that outlives WRITE_TIMEOUT rebuilds
    // the link.
    async fn write_loop(
        self: Arc<Self>,
        mut writer: WriteHalf<BoxedPort>,
        mut jobs: UnboundedReceiver<(Arc<Job>, bool)>,
        mut shutdown: watch::Receiver<bool>,
        generation: u64,
    ) {
        let failure = loop {
            let (job, restart) = tokio::select! {
                _ = shutdown.changed() => break None,
                next = jobs.recv() => match next {
                    Some(work) => work,
                    None => break None,
                },
            };
            let write = tokio::time::timeout(WRITE_TIMEOUT, self.write_job(&mut writer, &job, restart));
            tokio::select! {
                _ = shutdown.changed() => break None,
                written = write => match written {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break Some(e),
                    Err(_) => break Some(LinkError::WriteTimeout(WRITE_TIMEOUT)),
                },
            }
        };

        match tokio::time::timeout(WRITE_TIMEOUT, writer.shutdown()).await {
            Ok(Err(e)) => debug!(target: LOG_TARGET, "Device {} close error: {}", self.id, e),
            Err(_) => debug!(target: LOG_TARGET, "Device {} close timed out", self.id),
            Ok(Ok(())) => {}
        }

        if let Some(e) = failure {
            error!(target: LOG_TARGET,
                "Device {} ({}) failed to take work: {}",
                self.id, self.config.port, e
            );
            self.schedule_restart(generation);
        }
        debug!(target: LOG_TARGET, "Device {} writer exited", self.id);
    }

    fn handle_message(&self, message: LinkMessage) {
        match message {
            LinkMessage::Nonce { job_id, nonce } => {
                self.watchdog_kick.notify_one();
                match self.find_job(&job_id) {
                    Some(job) => {
                        let _ = self.events.send(DeviceEvent::ValidNonce {
                            device: self.id,
                            job,
                            nonce,
                        });
                    }
                    // Worth nothing without the job's difficulty, so not counted
                    None => {
                        warn!(target: LOG_TARGET,
                            "Device {} reported nonce for unknown job {}",
                            self.id, job_id
                        );
                    }
                }
            }
            LinkMessage::InvalidNonce { job_id } => {
                self.stats.record_hardware_error();
                if let Some(job) = self.find_job(&job_id) {
                    let _ = self.events.send(DeviceEvent::InvalidNonce {
                        device: self.id,
                        job,
                    });
                }
            }
            LinkMessage::WorkRequest => self.request_work(),
        }
    }

    fn find_job(&self, job_id: &str) -> Option<Arc<Job>> {
        self.work
            .lock()
            .recent
            .iter()
            .rev()
            .find(|j| j.job_id == job_id)
            .cloned()
    }

    /// Ask the coordinator for new work
    pub fn request_work(&self) {
        debug!(target: LOG_TARGET, "Device {} requested work", self.id);
        let _ = self.events.send(DeviceEvent::WorkRequested { device: self.id });
    }

    /// Hand `job` to the device. Never waits on the link: the job goes to
    /// the writer task, or is held as pending work while the link is down.
    pub fn start_work(&self, job: Arc<Job>, restart: bool) {
        let mut work = self.work.lock();
        work.current = Some(Arc::clone(&job));
        // A reused id names the newest job sent under it
        work.recent.retain(|j| j.job_id != job.job_id);
        work.recent.push_back(Arc::clone(&job));
        if work.recent.len() > RECENT_JOBS {
            work.recent.pop_front();
        }

        if let Some(outbox) = &work.outbox {
            if outbox.send((Arc::clone(&job), restart)).is_ok() {
                return;
            }
        }
        let restart = restart || work.pending.as_ref().is_some_and(|(_, r)| *r);
        work.pending = Some((job, restart));
        debug!(target: LOG_TARGET, "Device {} not listening, work queued", self.id);
    }

    async fn write_job(
        &self,
        writer: &mut WriteHalf<BoxedPort>,
        job: &Job,
        restart: bool,
    ) -> Result<(), LinkError> {
        let bytes = self.protocol.encode_work(job, restart)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        debug!(target: LOG_TARGET,
            "Device {} started job {} (restart={})",
            self.id, job.job_id, restart
        );
        Ok(())
    }

    fn schedule_restart(self: &Arc<Self>, generation: u64) {
        let device = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(RESTART_DELAY).await;
            device.restart(generation).await;
        });
    }

    /// Tear the link down completely and connect again. Identity, counters
    /// and the held job survive; the job is re-issued once reconnected.
    async fn restart(self: &Arc<Self>, generation: u64) {
        let mut link = self.link.lock().await;
        if !self.is_generation(generation) {
            debug!(target: LOG_TARGET, "Device {} restart superseded", self.id);
            return;
        }
        warn!(target: LOG_TARGET, "Restarting device {} ({})", self.id, self.config.port);
        self.set_state(LinkState::Restarting);
        self.stats.restarts.fetch_add(1, Ordering::Relaxed);
        {
            let mut work = self.work.lock();
            work.outbox = None;
            if work.pending.is_none() {
                work.pending = work.current.clone().map(|job| (job, true));
            }
        }
        self.unload_locked(&mut link).await;
        self.begin_load(false);
    }

    /// Stop the watchdog, close the link and wait for the read and write
    /// tasks to exit. No events fire once this returns. Idempotent.
    pub async fn unload(&self) {
        let mut link = self.link.lock().await;
        if self.unload_locked(&mut link).await {
            let mut work = self.work.lock();
            work.pending = None;
            work.current = None;
            info!(target: LOG_TARGET, "Unloaded device {} ({})", self.id, self.config.port);
        }
    }

    async fn unload_locked(&self, link: &mut LinkSlot) -> bool {
        if self.state() == LinkState::Unloaded {
            return false;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.work.lock().outbox = None;

        if let Some(watchdog) = link.watchdog.take() {
            watchdog.abort();
        }
        if let Some(shutdown) = link.shutdown.take() {
            let _ = shutdown.send(true);
        }
        for (task, name) in [(link.writer.take(), "writer"), (link.reader.take(), "read loop")] {
            if let Some(task) = task {
                if let Err(e) = task.await {
                    error!(target: LOG_TARGET, "Device {} {} panicked: {}", self.id, name, e);
                }
            }
        }
        self.set_state(LinkState::Unloaded);
        true
    }
}

// Changelog:
// - v0.4.0 (2026-10-18): Work is written by a per-link writer task with a
//   write timeout; start_work no longer waits on the link.
//   - Port enumeration and open run on the blocking pool.
//   - A reused job id replaces the older job in the recent-job cache.
// - v0.3.1 (2026-10-17): Restarts keep counters and re-issue the held job.
// - v0.3.0 (2026-10-14): Generation counter guards late connects and restarts.
//   - Unload joins the read loop under the link lock.
// - v0.2.0 (2026-10-10): Watchdog requests work instead of restarting the link.
// - v0.1.0 (2026-10-02): Serial device with polling read loop.
