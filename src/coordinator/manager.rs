// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/coordinator/manager.rs
// Version: 0.3.2
//
// This file implements the work coordinator, located in the coordinator
// subdirectory. It owns the active pool and the current/next job, decides
// which job each device works on, forwards results to the pool and fails
// over to the next pool when the active one drops.
//
// Tree Location:
// - src/coordinator/manager.rs (work assignment and pool failover)
// - Depends on: tokio, parking_lot, crate::device, crate::pool

use super::registry::DeviceRegistry;
use crate::core::types::{Job, Submission};
use crate::device::{Device, DeviceEntry, DeviceEvent, DeviceSink};
use crate::pool::{PoolClient, PoolEvent};
use crate::utils::format::FormatUtils;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

const LOG_TARGET: &str = "rigbridge::coordinator::manager";

/// Produces the top-level device tree for each start
pub type DeviceSource = Box<dyn Fn() -> Vec<DeviceEntry> + Send + Sync>;

/// Outcome of asking the coordinator for work on behalf of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The device was handed the next job
    Started,
    /// The device already holds the next job
    NoNewWork,
}

#[derive(Default)]
struct WorkState {
    active_pool: Option<usize>,
    current_job: Option<Arc<Job>>,
    next_job: Option<Arc<Job>>,
    working: bool,
    // Devices handed a job they have not finished yet
    busy: HashSet<usize>,
}

struct Inbox {
    pool: UnboundedReceiver<PoolEvent>,
    device: UnboundedReceiver<DeviceEvent>,
    found: UnboundedReceiver<DeviceEntry>,
}

pub struct WorkCoordinator<P: PoolClient> {
    pools: Vec<Arc<P>>,
    source: DeviceSource,
    registry: DeviceRegistry,
    state: tokio::sync::Mutex<WorkState>,
    // Set between start() and stop()
    running: AtomicBool,
    // Set once the load task has activated the first pool
    started: AtomicBool,
    bound: AtomicBool,
    session: AtomicU64,
    pool_tx: UnboundedSender<PoolEvent>,
    device_tx: UnboundedSender<DeviceEvent>,
    sink: DeviceSink,
    inbox: Mutex<Option<Inbox>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    reporter: Mutex<Option<JoinHandle<()>>>,
    stats_interval: Duration,
    self_ref: Weak<Self>,
}

impl<P: PoolClient> WorkCoordinator<P> {
    /// `pools` are tried in order; `source` is called on every start to
    /// build the device tree. A zero `stats_interval` disables the periodic
    /// statistics log.
    pub fn new(pools: Vec<P>, source: DeviceSource, stats_interval: Duration) -> Arc<Self> {
        let (pool_tx, pool_rx) = unbounded_channel();
        let (device_tx, device_rx) = unbounded_channel();
        let (found_tx, found_rx) = unbounded_channel();
        Arc::new_cyclic(|self_ref| Self {
            pools: pools.into_iter().map(Arc::new).collect(),
            source,
            registry: DeviceRegistry::new(),
            state: tokio::sync::Mutex::new(WorkState::default()),
            running: AtomicBool::new(false),
            started: AtomicBool::new(false),
            bound: AtomicBool::new(false),
            session: AtomicU64::new(0),
            pool_tx,
            device_tx,
            sink: DeviceSink::new(found_tx),
            inbox: Mutex::new(Some(Inbox {
                pool: pool_rx,
                device: device_rx,
                found: found_rx,
            })),
            dispatcher: Mutex::new(None),
            reporter: Mutex::new(None),
            stats_interval,
            self_ref: self_ref.clone(),
        })
    }

    pub fn pools(&self) -> &[Arc<P>] {
        &self.pools
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.registry.devices()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn active_pool(&self) -> Option<usize> {
        self.state.lock().await.active_pool
    }

    pub async fn current_job(&self) -> Option<Arc<Job>> {
        self.state.lock().await.current_job.clone()
    }

    pub async fn next_job(&self) -> Option<Arc<Job>> {
        self.state.lock().await.next_job.clone()
    }

    pub async fn is_working(&self) -> bool {
        self.state.lock().await.working
    }

    /// Bind the pools, then load devices and connect to the first pool in
    /// the background. Returns the load task; awaiting it waits until the
    /// coordinator is started. Calling start while running does nothing.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!(target: LOG_TARGET, "Coordinator already running");
            return None;
        }
        let coordinator = self.self_ref.upgrade()?;

        if !self.bound.swap(true, Ordering::SeqCst) {
            for (index, pool) in self.pools.iter().enumerate() {
                pool.bind(index, self.pool_tx.clone());
            }
        }
        self.spawn_dispatcher();
        self.spawn_reporter();

        self.registry.open();
        let session = self.session.fetch_add(1, Ordering::SeqCst) + 1;
        Some(tokio::spawn(coordinator.load(session)))
    }

    async fn load(self: Arc<Self>, session: u64) {
        let entries = (self.source)();
        let mut devices = Vec::new();
        for entry in entries {
            devices.extend(self.registry.resolve(entry, &self.device_tx, &self.sink));
        }
        for device in &devices {
            self.load_device(device).await;
        }

        let mut state = self.state.lock().await;
        if self.session.load(Ordering::SeqCst) != session || !self.running.load(Ordering::SeqCst) {
            debug!(target: LOG_TARGET, "Coordinator stopped while loading");
            return;
        }
        if let Some(pool) = self.pools.first() {
            state.active_pool = Some(0);
            pool.start();
        } else {
            warn!(target: LOG_TARGET, "No pools configured, devices will stay idle");
        }
        self.started.store(true, Ordering::SeqCst);
        info!(target: LOG_TARGET,
            "Coordinator started with {} device(s) and {} pool(s)",
            devices.len(),
            self.pools.len()
        );
    }

    // A device admitted before stop() but loaded after it must not stay up
    async fn load_device(&self, device: &Arc<Device>) -> bool {
        device.load().await;
        if !self.registry.contains(device) {
            debug!(target: LOG_TARGET, "Device {} dropped by stop, unloading", device.id());
            device.unload().await;
            return false;
        }
        true
    }

    /// Unbind the pools, stop hotplug loaders, unload every device and stop
    /// the active pool. Safe to call repeatedly or before start.
    pub async fn stop(&self) {
        if self.bound.swap(false, Ordering::SeqCst) {
            for pool in &self.pools {
                pool.unbind();
            }
        }
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.started.store(false, Ordering::SeqCst);
        if let Some(reporter) = self.reporter.lock().take() {
            reporter.abort();
        }

        for device in self.registry.close() {
            device.unload().await;
        }

        let mut state = self.state.lock().await;
        if let Some(index) = state.active_pool.take() {
            self.pools[index].stop();
        }
        state.current_job = None;
        state.next_job = None;
        state.working = false;
        state.busy.clear();
        info!(target: LOG_TARGET, "Coordinator stopped");
    }

    fn spawn_dispatcher(&self) {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_some() {
            return;
        }
        if let Some(inbox) = self.inbox.lock().take() {
            *dispatcher = Some(tokio::spawn(Self::dispatch(self.self_ref.clone(), inbox)));
        }
    }

    async fn dispatch(coordinator: Weak<Self>, mut inbox: Inbox) {
        loop {
            tokio::select! {
                Some(event) = inbox.pool.recv() => {
                    let Some(coordinator) = coordinator.upgrade() else { break };
                    coordinator.handle_pool_event(event).await;
                }
                Some(event) = inbox.device.recv() => {
                    let Some(coordinator) = coordinator.upgrade() else { break };
                    coordinator.handle_device_event(event).await;
                }
                Some(entry) = inbox.found.recv() => {
                    let Some(coordinator) = coordinator.upgrade() else { break };
                    tokio::spawn(async move { coordinator.on_device_found(entry).await });
                }
                else => break,
            }
        }
        debug!(target: LOG_TARGET, "Dispatcher exited");
    }

    async fn handle_pool_event(&self, event: PoolEvent) {
        match event {
            PoolEvent::NewJob {
                pool,
                job,
                force_restart,
            } => self.on_new_job(pool, job, force_restart).await,
            PoolEvent::Disconnected { pool } => self.on_pool_disconnected(pool).await,
        }
    }

    async fn handle_device_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::ValidNonce { device, job, nonce } => {
                self.on_device_result_found(device, job, &nonce).await
            }
            DeviceEvent::WorkRequested { device } => {
                self.on_device_requested_work(device).await;
            }
            DeviceEvent::InvalidNonce { device, job } => self.on_invalid_nonce(device, &job),
        }
    }

    /// A pool produced a job. Ignored unless started and `pool` is active.
    pub async fn on_new_job(&self, pool: usize, job: Arc<Job>, force_restart: bool) {
        let mut state = self.state.lock().await;
        if !self.is_started() || state.active_pool != Some(pool) {
            debug!(target: LOG_TARGET, "Ignoring job {} from inactive pool {}", job.job_id, pool);
            return;
        }
        info!(target: LOG_TARGET,
            "New job {} from {} (clean={})",
            job.job_id,
            self.pools[pool].url(),
            force_restart
        );

        if force_restart || state.current_job.is_none() {
            self.broadcast(&mut state, job, true);
        } else if !state.working {
            self.broadcast(&mut state, job, false);
        } else {
            state.next_job = Some(job);
        }
    }

    // Caller holds the state lock. start_work only queues the job on the
    // device's writer, so no link I/O happens under the lock.
    fn broadcast(&self, state: &mut WorkState, job: Arc<Job>, restart: bool) {
        state.current_job = Some(Arc::clone(&job));
        state.next_job = Some(Arc::clone(&job));
        state.working = true;
        state.busy.clear();
        for device in self.registry.devices() {
            device.start_work(Arc::clone(&job), restart);
            state.busy.insert(device.id());
        }
    }

    /// A device found a nonce for `job`
    pub async fn on_device_result_found(&self, device_id: usize, job: Arc<Job>, nonce: &str) {
        let Some(device) = self.registry.get(device_id) else {
            debug!(target: LOG_TARGET, "Result from unknown device {}", device_id);
            return;
        };

        let failover = {
            let state = self.state.lock().await;
            let Some(active) = state.active_pool.filter(|_| self.is_started()) else {
                return;
            };
            let pool = &self.pools[active];
            // Ids repeat across pools and reconnects, so compare the job itself
            let is_current = state
                .current_job
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &job));

            if !is_current {
                debug!(target: LOG_TARGET,
                    "Device {} result for stale job {} discarded",
                    device_id, job.job_id
                );
                device.stats().record_discarded(job.work_units());
                false
            } else if pool.is_connected() {
                self.submit(Arc::clone(pool), &device, &job, nonce);
                false
            } else if pool.is_connecting() {
                warn!(target: LOG_TARGET,
                    "Pool {} still connecting, result from device {} dropped",
                    pool.url(),
                    device_id
                );
                false
            } else {
                true
            }
        };

        if failover {
            warn!(target: LOG_TARGET, "Active pool unavailable, result from device {} dropped", device_id);
            self.attempt_pool_failover().await;
        }
        self.assign_next_job(device_id).await;
    }

    fn submit(&self, pool: Arc<P>, device: &Arc<Device>, job: &Job, nonce: &str) {
        let submission = Submission::for_job(job, device.id(), nonce);
        let work_units = job.work_units();
        let device = Arc::clone(device);
        tokio::spawn(async move {
            let job_id = submission.job_id.clone();
            match pool.submit_work(submission).await {
                Ok(accepted) => {
                    device.stats().record_share(work_units, accepted);
                    if accepted {
                        info!(target: LOG_TARGET, "Share accepted for device {} on job {}", device.id(), job_id);
                    } else {
                        warn!(target: LOG_TARGET, "Share rejected for device {} on job {}", device.id(), job_id);
                    }
                }
                Err(e) => {
                    error!(target: LOG_TARGET,
                        "Failed to submit share from device {} to {}: {}",
                        device.id(),
                        pool.url(),
                        e
                    );
                }
            }
        });
    }

    /// Give the device the next job if it does not hold it yet
    pub async fn assign_next_job(&self, device_id: usize) -> Assignment {
        let Some(device) = self.registry.get(device_id) else {
            return Assignment::NoNewWork;
        };
        let mut state = self.state.lock().await;
        let held = device.current_job();
        match state.next_job.clone() {
            Some(next) if !held.is_some_and(|held| Arc::ptr_eq(&held, &next)) => {
                debug!(target: LOG_TARGET, "Device {} starts job {}", device_id, next.job_id);
                device.start_work(Arc::clone(&next), false);
                state.current_job = Some(next);
                state.busy.insert(device_id);
                Assignment::Started
            }
            _ => {
                debug!(target: LOG_TARGET, "No new work for device {}", device_id);
                state.busy.remove(&device_id);
                if state.busy.is_empty() {
                    state.working = false;
                }
                Assignment::NoNewWork
            }
        }
    }

    pub async fn on_device_requested_work(&self, device_id: usize) -> Assignment {
        info!(target: LOG_TARGET, "Device {} requested new work", device_id);
        self.assign_next_job(device_id).await
    }

    pub fn on_invalid_nonce(&self, device_id: usize, job: &Job) {
        warn!(target: LOG_TARGET,
            "Device {} reported an invalid nonce on job {}",
            device_id, job.job_id
        );
    }

    async fn on_pool_disconnected(&self, pool: usize) {
        if let Some(client) = self.pools.get(pool) {
            error!(target: LOG_TARGET, "Disconnected from pool {}", client.url());
        }
        if self.active_pool().await == Some(pool) {
            self.attempt_pool_failover().await;
        }
    }

    /// Switch to the next pool in the list, wrapping after the last one.
    /// Does nothing unless started with an active pool that is not
    /// mid-connect.
    pub async fn attempt_pool_failover(&self) -> Option<usize> {
        let mut state = self.state.lock().await;
        if !self.is_started() {
            return None;
        }
        let active = state.active_pool?;
        if self.pools[active].is_connecting() {
            debug!(target: LOG_TARGET, "Pool {} still connecting, no failover", active);
            return None;
        }

        self.pools[active].stop();
        let next = (active + 1) % self.pools.len();
        state.active_pool = Some(next);
        // Jobs carry the old connection's extranonce
        state.current_job = None;
        state.next_job = None;
        info!(target: LOG_TARGET, "Attempting to connect to pool {}", self.pools[next].url());
        self.pools[next].start();
        Some(next)
    }

    /// Admit a device reported by a hotplug loader and put it to work
    pub async fn on_device_found(&self, entry: DeviceEntry) {
        let devices = self.registry.resolve(entry, &self.device_tx, &self.sink);
        for device in devices {
            if self.load_device(&device).await {
                info!(target: LOG_TARGET, "Hotplugged device {} on {}", device.id(), device.port());
                self.assign_next_job(device.id()).await;
            }
        }
    }

    fn spawn_reporter(&self) {
        if self.stats_interval.is_zero() {
            return;
        }
        let coordinator = self.self_ref.clone();
        let interval = self.stats_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(coordinator) = coordinator.upgrade() else { break };
                coordinator.log_stats();
            }
        });
        if let Some(previous) = self.reporter.lock().replace(task) {
            previous.abort();
        }
    }

    /// Log one statistics line per device
    pub fn log_stats(&self) {
        for device in self.registry.devices() {
            info!(target: LOG_TARGET,
                "{}",
                FormatUtils::format_device_stats(
                    device.id(),
                    device.name(),
                    &device.stats().snapshot(),
                    device.stats().elapsed()
                )
            );
        }
    }
}

impl<P: PoolClient> Drop for WorkCoordinator<P> {
    fn drop(&mut self) {
        if let Some(task) = self.dispatcher.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.reporter.get_mut().take() {
            task.abort();
        }
    }
}

// Changelog:
// - v0.3.2 (2026-10-18): Jobs are matched by identity, not by id.
//   - Results dropped while the pool connects are logged.
//   - Work is queued on device writers, never written under the state lock.
// - v0.3.1 (2026-10-17): Stale results are counted as discarded work.
//   - Failover clears the current and next job.
// - v0.3.0 (2026-10-14): Hotplug arrivals are loaded and handed the next job.
//   - Stop unloads devices admitted while the load task was running.
// - v0.2.0 (2026-10-10): Single dispatcher task over pool and device inboxes.
// - v0.1.0 (2026-10-02): Initial job assignment and failover.
