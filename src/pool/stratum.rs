// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: src/pool/stratum.rs
// Version: 0.2.1
//
// This file implements the Stratum V1 pool client, located in the pool
// subdirectory. It connects over TCP, subscribes and authorizes, turns
// mining.notify into jobs and matches submit responses to pending shares.
//
// Tree Location:
// - src/pool/stratum.rs (Stratum V1 PoolClient implementation)
// - Depends on: tokio, serde_json, crate::pool

use super::client::{PoolClient, PoolError, PoolEvent};
use super::messages::{NotifyParams, PoolMessage, parse_pool_message};
use super::protocol::{FIRST_SUBMIT_ID, StratumProtocol};
use crate::core::config::PoolConfig;
use crate::core::types::{Job, Submission};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, lookup_host};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const LOG_TARGET: &str = "rigbridge::pool::stratum";

const AGENT: &str = concat!("rigbridge/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

type PendingShare = oneshot::Sender<Result<bool, PoolError>>;

/// Stratum V1 pool connection
pub struct StratumPool {
    inner: Arc<StratumInner>,
}

struct StratumInner {
    url: String,
    user: String,
    password: String,
    connected: AtomicBool,
    connecting: AtomicBool,
    // Bumped by stop(); a session that sees a different value stays silent
    session: AtomicU64,
    sink: Mutex<Option<(usize, UnboundedSender<PoolEvent>)>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    task: Mutex<Option<JoinHandle<()>>>,
    pending: Mutex<HashMap<u64, PendingShare>>,
    next_submit_id: AtomicU64,
    extranonce: Mutex<(String, usize)>,
    difficulty: Mutex<f64>,
}

impl StratumPool {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            inner: Arc::new(StratumInner {
                url: config.url.clone(),
                user: config.user.clone(),
                password: config.password.clone(),
                connected: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                session: AtomicU64::new(0),
                sink: Mutex::new(None),
                writer: tokio::sync::Mutex::new(None),
                task: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_submit_id: AtomicU64::new(FIRST_SUBMIT_ID),
                extranonce: Mutex::new((String::new(), 0)),
                difficulty: Mutex::new(1.0),
            }),
        }
    }

    /// Current share difficulty announced by the pool
    pub fn difficulty(&self) -> f64 {
        *self.inner.difficulty.lock()
    }
}

impl StratumInner {
    /// Resolve pool address from either IP:port or domain:port format
    async fn resolve_pool_address(&self) -> Result<SocketAddr, PoolError> {
        let address = self
            .url
            .strip_prefix("stratum+tcp://")
            .unwrap_or(&self.url);

        if let Ok(addr) = address.parse::<SocketAddr>() {
            return Ok(addr);
        }

        let mut addrs = lookup_host(address).await?;
        addrs.next().ok_or_else(|| PoolError::Resolve {
            url: self.url.clone(),
        })
    }

    async fn connect(&self) -> Result<TcpStream, PoolError> {
        let addr = self.resolve_pool_address().await?;
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| PoolError::Io(std::io::ErrorKind::TimedOut.into()))??;
        stream.set_nodelay(true)?; // Disable Nagle's algorithm for low latency
        Ok(stream)
    }

    async fn send(&self, message: String) -> Result<(), PoolError> {
        if message.is_empty() {
            return Err(PoolError::Malformed("refusing to send empty message".to_string()));
        }
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or_else(|| PoolError::NotConnected {
            url: self.url.clone(),
        })?;
        writer.write_all(message.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    fn emit(&self, session: u64, event: PoolEvent) {
        if self.session.load(Ordering::SeqCst) != session {
            return;
        }
        if let Some((_, sink)) = self.sink.lock().as_ref() {
            let _ = sink.send(event);
        }
    }

    fn index(&self) -> usize {
        self.sink.lock().as_ref().map(|(index, _)| *index).unwrap_or(0)
    }

    fn fail_pending(&self) {
        for (_, waiter) in self.pending.lock().drain() {
            let _ = waiter.send(Err(PoolError::Closed));
        }
    }

    fn build_job(&self, params: NotifyParams) -> Job {
        let (extranonce1, extranonce2_size) = self.extranonce.lock().clone();
        Job {
            job_id: params.job_id,
            prev_hash: params.prev_hash,
            coinbase1: params.coinbase1,
            coinbase2: params.coinbase2,
            merkle_branch: params.merkle_branch,
            version: params.version,
            nbits: params.nbits,
            ntime: params.ntime,
            extranonce1,
            extranonce2_size,
            difficulty: *self.difficulty.lock(),
            clean_jobs: params.clean_jobs,
        }
    }

    fn handle_message(&self, session: u64, message: PoolMessage) {
        match message {
            PoolMessage::Subscribed {
                extranonce1,
                extranonce2_size,
            } => {
                info!(target: LOG_TARGET,
                    "Subscribed to {} (extranonce1={}, extranonce2_size={})",
                    self.url, extranonce1, extranonce2_size
                );
                *self.extranonce.lock() = (extranonce1, extranonce2_size);
            }
            PoolMessage::Authorized(true) => {
                info!(target: LOG_TARGET, "Authorized as {} on {}", self.user, self.url);
            }
            PoolMessage::Authorized(false) => {
                error!(target: LOG_TARGET, "Pool {} refused worker {}", self.url, self.user);
            }
            PoolMessage::SetDifficulty(difficulty) => {
                info!(target: LOG_TARGET, "Pool difficulty set to {}", difficulty);
                *self.difficulty.lock() = difficulty;
            }
            PoolMessage::Notify(params) => {
                let force_restart = params.clean_jobs;
                let job = self.build_job(params);
                debug!(target: LOG_TARGET,
                    "New job {} from {} (clean={})",
                    job.job_id, self.url, force_restart
                );
                self.emit(
                    session,
                    PoolEvent::NewJob {
                        pool: self.index(),
                        job: Arc::new(job),
                        force_restart,
                    },
                );
            }
            PoolMessage::SubmitResult {
                id,
                accepted,
                reason,
            } => {
                let waiter = self.pending.lock().remove(&id);
                match waiter {
                    Some(waiter) => {
                        let outcome = match (accepted, reason) {
                            (false, Some(reason)) => Err(PoolError::Rejected(reason)),
                            (accepted, _) => Ok(accepted),
                        };
                        let _ = waiter.send(outcome);
                    }
                    None => debug!(target: LOG_TARGET, "Response for unknown submission {}", id),
                }
            }
            PoolMessage::Error(reason) => {
                warn!(target: LOG_TARGET, "Pool {} error: {}", self.url, reason);
            }
        }
    }

    async fn run(self: Arc<Self>, session: u64) {
        let stream = match self.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to connect to {}: {}", self.url, e);
                self.connecting.store(false, Ordering::SeqCst);
                self.emit(session, PoolEvent::Disconnected { pool: self.index() });
                return;
            }
        };

        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);

        let handshake = async {
            self.send(StratumProtocol::to_message(StratumProtocol::create_subscribe_request(AGENT)))
                .await?;
            self.send(StratumProtocol::to_message(StratumProtocol::create_authorize_request(
                &self.user,
                &self.password,
            )))
            .await
        };
        if let Err(e) = handshake.await {
            error!(target: LOG_TARGET, "Handshake with {} failed: {}", self.url, e);
            self.teardown().await;
            self.emit(session, PoolEvent::Disconnected { pool: self.index() });
            return;
        }

        self.connected.store(true, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
        info!(target: LOG_TARGET, "Connected to pool {}", self.url);

        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_pool_message(&line) {
                        Ok(Some(message)) => self.handle_message(session, message),
                        Ok(None) => {}
                        Err(e) => warn!(target: LOG_TARGET, "Bad message from {}: {}", self.url, e),
                    }
                }
                Ok(None) => {
                    warn!(target: LOG_TARGET, "Pool {} closed the connection", self.url);
                    break;
                }
                Err(e) => {
                    error!(target: LOG_TARGET, "Error reading from {}: {}", self.url, e);
                    break;
                }
            }
        }

        self.teardown().await;
        self.emit(session, PoolEvent::Disconnected { pool: self.index() });
    }

    async fn teardown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
        *self.writer.lock().await = None;
        self.fail_pending();
    }
}

impl PoolClient for StratumPool {
    fn url(&self) -> &str {
        &self.inner.url
    }

    fn start(&self) {
        let inner = &self.inner;
        if inner.connected.load(Ordering::SeqCst) || inner.connecting.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(target: LOG_TARGET, "Attempting to connect to pool {}", inner.url);
        let session = inner.session.load(Ordering::SeqCst);
        let task = tokio::spawn(Arc::clone(inner).run(session));
        if let Some(previous) = inner.task.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop(&self) {
        let inner = &self.inner;
        inner.session.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = inner.task.lock().take() {
            task.abort();
        }
        inner.connected.store(false, Ordering::SeqCst);
        inner.connecting.store(false, Ordering::SeqCst);
        if let Ok(mut writer) = inner.writer.try_lock() {
            *writer = None;
        }
        inner.fail_pending();
        debug!(target: LOG_TARGET, "Stopped pool {}", inner.url);
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn is_connecting(&self) -> bool {
        self.inner.connecting.load(Ordering::SeqCst)
    }

    async fn submit_work(&self, submission: Submission) -> Result<bool, PoolError> {
        let inner = Arc::clone(&self.inner);
        if !inner.connected.load(Ordering::SeqCst) {
            return Err(PoolError::NotConnected {
                url: inner.url.clone(),
            });
        }

        let id = inner.next_submit_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        inner.pending.lock().insert(id, tx);

        let message = StratumProtocol::to_message(StratumProtocol::create_submit_request(
            &inner.user,
            &submission,
            id,
        ));
        info!(target: LOG_TARGET,
            "Submitting share from device {}: job_id={}, nonce={}",
            submission.device_id, submission.job_id, submission.nonce
        );
        if let Err(e) = inner.send(message).await {
            inner.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(SUBMIT_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => {
                inner.pending.lock().remove(&id);
                Err(PoolError::Timeout {
                    id,
                    secs: SUBMIT_TIMEOUT.as_secs(),
                })
            }
        }
    }

    fn bind(&self, index: usize, sink: UnboundedSender<PoolEvent>) {
        *self.inner.sink.lock() = Some((index, sink));
    }

    fn unbind(&self) {
        *self.inner.sink.lock() = None;
    }
}

impl Drop for StratumPool {
    fn drop(&mut self) {
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
    }
}

// Changelog:
// - v0.2.1 (2026-10-17): Stop no longer reports a disconnect.
//   - Sessions are numbered so a stopped connection cannot trigger failover.
// - v0.2.0 (2026-10-10): Implements the PoolClient trait.
//   - Jobs carry the subscription extranonce and current difficulty.
//   - Submissions wait for the matching response with a 30s timeout.
// - v0.1.0 (2026-10-02): DNS resolution and TCP connect from the original client.
