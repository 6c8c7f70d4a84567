//! Test support: a connector driven by a script instead of the network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use synapse_client::ws::{Connector, Transport, WsError};
use synapse_client::ServerEvent;
use tokio::time::Instant;

/// What the next `connect` call does. An exhausted script fails.
#[derive(Debug, Clone)]
pub enum Step {
    Fail,
    /// Handshake never completes.
    Hang,
    /// Open, yield `frames`, then stay open (`hold`) or close.
    Open { frames: Vec<String>, hold: bool },
}

impl Step {
    pub fn open_and_hold(frames: Vec<String>) -> Self {
        Step::Open { frames, hold: true }
    }

    pub fn open_then_close() -> Self {
        Step::Open {
            frames: Vec::new(),
            hold: false,
        }
    }
}

#[derive(Default)]
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Step>>,
    attempts: Mutex<Vec<Instant>>,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
    close_delay: Mutex<Duration>,
}

impl ScriptedConnector {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Self::new([])
    }

    /// Make every transport opened from now on take `delay` to close.
    pub fn set_close_delay(&self, delay: Duration) {
        *self.close_delay.lock().unwrap() = delay;
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// Milliseconds between consecutive connect calls.
    pub fn gaps_ms(&self) -> Vec<u128> {
        self.attempts()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, WsError> {
        self.attempts.lock().unwrap().push(Instant::now());
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Fail);

        match step {
            Step::Fail => Err(WsError::Handshake("connection refused".to_string())),
            Step::Hang => std::future::pending().await,
            Step::Open { frames, hold } => {
                let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_live.fetch_max(live, Ordering::SeqCst);
                Ok(Box::new(ScriptedTransport {
                    frames: frames.into(),
                    hold,
                    live: Arc::clone(&self.live),
                    close_delay: *self.close_delay.lock().unwrap(),
                }))
            }
        }
    }
}

struct ScriptedTransport {
    frames: VecDeque<String>,
    hold: bool,
    live: Arc<AtomicUsize>,
    close_delay: Duration,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn recv(&mut self) -> Option<Result<String, WsError>> {
        if let Some(frame) = self.frames.pop_front() {
            return Some(Ok(frame));
        }
        if self.hold {
            std::future::pending::<()>().await;
        }
        None
    }

    async fn close(&mut self) {
        self.hold = false;
        self.frames.clear();
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn frame(event: ServerEvent) -> String {
    event.to_frame()
}

pub fn raw_frame(kind: &str, data: Value) -> String {
    serde_json::json!({ "type": kind, "data": data }).to_string()
}

/// Poll `cond` every few milliseconds until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
