// rigbridge - Free and Open Source Software Statement
//
// This project, rigbridge, is Free and Open Source Software (FOSS) licensed
// under the MIT License. You are free to use, modify, and distribute this
// software in accordance with the license terms. Contributions are welcome
// via pull requests to the project repository.
//
// File: tests/common/mod.rs
// Version: 0.2.0
//
// Shared test doubles: a scripted pool and an in-memory link opener whose
// device ends can be driven from the tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use rigbridge::core::config::DeviceSettings;
use rigbridge::core::types::{Job, Submission};
use rigbridge::device::{BoxedPort, DeviceSpec, LinkError, LinkOpener, build_spec};
use rigbridge::pool::{PoolClient, PoolError, PoolEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc::UnboundedSender;

/// Pool that connects instantly and records what the coordinator does
pub struct MockPool {
    url: String,
    pub connected: AtomicBool,
    pub connecting: AtomicBool,
    pub accept: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub submissions: Mutex<Vec<Submission>>,
    sink: Mutex<Option<(usize, UnboundedSender<PoolEvent>)>>,
}

impl MockPool {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            accept: AtomicBool::new(true),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Push a job through the bound sink as the real client would
    pub fn send_job(&self, job: Arc<Job>, force_restart: bool) -> bool {
        match self.sink.lock().as_ref() {
            Some((pool, sink)) => sink
                .send(PoolEvent::NewJob {
                    pool: *pool,
                    job,
                    force_restart,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Drop the connection and report it
    pub fn disconnect(&self) -> bool {
        self.connected.store(false, Ordering::SeqCst);
        match self.sink.lock().as_ref() {
            Some((pool, sink)) => sink.send(PoolEvent::Disconnected { pool: *pool }).is_ok(),
            None => false,
        }
    }
}

impl PoolClient for MockPool {
    fn url(&self) -> &str {
        &self.url
    }

    fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    async fn submit_work(&self, submission: Submission) -> Result<bool, PoolError> {
        self.submissions.lock().push(submission);
        Ok(self.accept.load(Ordering::SeqCst))
    }

    fn bind(&self, index: usize, sink: UnboundedSender<PoolEvent>) {
        *self.sink.lock() = Some((index, sink));
    }

    fn unbind(&self) {
        *self.sink.lock() = None;
    }
}

/// Opens in-memory links; the device end of the most recent link on each
/// port is kept until a test takes it.
pub struct MockOpener {
    ports: Mutex<Vec<String>>,
    opens: AtomicUsize,
    remotes: Mutex<HashMap<String, DuplexStream>>,
}

impl MockOpener {
    pub fn new(ports: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            ports: Mutex::new(ports.iter().map(|p| p.to_string()).collect()),
            opens: AtomicUsize::new(0),
            remotes: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_ports(&self, ports: &[&str]) {
        *self.ports.lock() = ports.iter().map(|p| p.to_string()).collect();
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn take_remote(&self, port: &str) -> Option<DuplexStream> {
        self.remotes.lock().remove(port)
    }
}

impl LinkOpener for MockOpener {
    fn available_ports(&self) -> Result<Vec<String>, LinkError> {
        Ok(self.ports.lock().clone())
    }

    fn open(&self, port: &str, _baud_rate: u32) -> Result<BoxedPort, LinkError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (local, remote) = tokio::io::duplex(64 * 1024);
        self.remotes.lock().insert(port.to_string(), remote);
        Ok(Box::new(local))
    }
}

/// Device spec on `port` with a 1 ms poll and the given watchdog timeout
pub fn spec(port: &str, opener: &Arc<MockOpener>, timeout_secs: u64) -> DeviceSpec {
    let opener: Arc<dyn LinkOpener> = opener.clone();
    let settings = DeviceSettings {
        cores: 4,
        timeout: Some(timeout_secs),
        poll: Some(1),
        core_hash_rate: 1_000_000,
        ..Default::default()
    };
    build_spec(port, &settings, &opener)
}

pub fn job(id: &str) -> Arc<Job> {
    Arc::new(Job {
        job_id: id.to_string(),
        ntime: "6553f100".to_string(),
        extranonce1: "08000002".to_string(),
        extranonce2_size: 4,
        difficulty: 1.0,
        ..Default::default()
    })
}

/// Job whose id may repeat while its connection-bound fields differ
pub fn job_on(id: &str, extranonce1: &str, ntime: &str) -> Arc<Job> {
    Arc::new(Job {
        job_id: id.to_string(),
        ntime: ntime.to_string(),
        extranonce1: extranonce1.to_string(),
        extranonce2_size: 4,
        difficulty: 1.0,
        ..Default::default()
    })
}

/// Poll `condition` every 10 ms until it holds or `limit` passes
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Device end of a link, reading work lines and writing results
pub struct RemoteDevice {
    reader: BufReader<DuplexStream>,
}

impl RemoteDevice {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    /// Next work line as JSON, or None on EOF
    pub async fn next_work(&mut self) -> Option<serde_json::Value> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await.ok()?;
        if read == 0 {
            return None;
        }
        serde_json::from_str(&line).ok()
    }

    pub async fn send(&mut self, line: &str) {
        let stream = self.reader.get_mut();
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();
        stream.flush().await.unwrap();
    }
}
