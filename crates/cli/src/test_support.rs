// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, fakes, and assertion helpers.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::action::ActionKind;
use crate::broker::{BrokerChannel, BrokerConnector, BrokerError, FlowSignal, OutboundMessage};
use crate::survey::SurveyGroup;

/// A `log_survey` group compiled from `pattern`.
pub fn survey_group(name: &str, pattern: &str) -> anyhow::Result<SurveyGroup> {
    Ok(SurveyGroup {
        name: name.to_owned(),
        display_name: None,
        pattern: regex::Regex::new(pattern)?,
        action: ActionKind::LogSurvey,
        data: serde_json::Map::new(),
    })
}

/// A scripted failure for the next publish on a [`FakeBroker`] channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    Closed,
    Unroutable,
    Nack,
}

#[derive(Default)]
struct FakeBrokerState {
    delivered: Vec<OutboundMessage>,
    publish_calls: usize,
    connects: usize,
    closes: usize,
    failures: VecDeque<FakeFailure>,
    refuse_connect: bool,
    flow: Option<FlowSignal>,
}

/// In-memory broker: records confirmed messages and replays scripted faults.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<FakeBrokerState>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn BrokerConnector> {
        Arc::new(self.clone())
    }

    /// Fail the next publish (one entry per call, in order).
    pub fn fail_next(&self, failure: FakeFailure) {
        self.state.lock().failures.push_back(failure);
    }

    /// Make every subsequent connect fail.
    pub fn refuse_connections(&self) {
        self.state.lock().refuse_connect = true;
    }

    /// Raise flow control through the most recent connection's callback.
    pub fn block(&self) {
        if let Some(ref flow) = self.state.lock().flow {
            flow.block();
        }
    }

    pub fn unblock(&self) {
        if let Some(ref flow) = self.state.lock().flow {
            flow.unblock();
        }
    }

    /// Confirmed payloads, parsed, in delivery order.
    pub fn delivered(&self) -> Vec<serde_json::Value> {
        self.state
            .lock()
            .delivered
            .iter()
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    /// The `line` field of every confirmed payload, in delivery order.
    pub fn delivered_lines(&self) -> Vec<String> {
        self.delivered()
            .iter()
            .filter_map(|v| v.get("line").and_then(|l| l.as_str()).map(str::to_owned))
            .collect()
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.state.lock().delivered.iter().map(|m| m.id.clone()).collect()
    }

    pub fn publish_calls(&self) -> usize {
        self.state.lock().publish_calls
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().closes
    }
}

impl BrokerConnector for FakeBroker {
    fn connect(
        &self,
        flow: FlowSignal,
    ) -> BoxFuture<'_, Result<Box<dyn BrokerChannel>, BrokerError>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if state.refuse_connect {
                return Err(BrokerError::connect("fake://broker", "connection refused"));
            }
            state.connects += 1;
            state.flow = Some(flow);
            Ok(Box::new(FakeChannel { state: Arc::clone(&self.state), open: true })
                as Box<dyn BrokerChannel>)
        })
    }

    fn describe(&self) -> String {
        "fake://broker".to_owned()
    }
}

struct FakeChannel {
    state: Arc<Mutex<FakeBrokerState>>,
    open: bool,
}

impl BrokerChannel for FakeChannel {
    fn publish<'a>(
        &'a mut self,
        message: &'a OutboundMessage,
    ) -> BoxFuture<'a, Result<(), BrokerError>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.publish_calls += 1;
            match state.failures.pop_front() {
                Some(FakeFailure::Closed) => {
                    self.open = false;
                    Err(BrokerError::ConnectionClosed("fake connection reset".to_owned()))
                }
                Some(FakeFailure::Unroutable) => {
                    Err(BrokerError::Unroutable { subject: "reconn.survey".to_owned() })
                }
                Some(FakeFailure::Nack) => Err(BrokerError::Rejected("fake nack".to_owned())),
                None => {
                    state.delivered.push(message.clone());
                    Ok(())
                }
            }
        })
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.open {
                self.open = false;
                self.state.lock().closes += 1;
            }
        })
    }
}

/// A `nats-server -js` child process on a free local port.
pub struct NatsServer {
    child: Child,
    port: u16,
    store: PathBuf,
}

impl NatsServer {
    /// Start a JetStream-enabled server, or `None` if `nats-server` is
    /// unavailable or does not come up.
    pub fn start() -> Option<Self> {
        let port = std::net::TcpListener::bind("127.0.0.1:0").ok()?.local_addr().ok()?.port();
        let store = std::env::temp_dir().join(format!("reconn-nats-{}-{port}", std::process::id()));
        let child = Command::new("nats-server")
            .args(["-js", "-a", "127.0.0.1", "-p", &port.to_string(), "-sd"])
            .arg(&store)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .ok()?;
        let server = Self { child, port, store };

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
                return Some(server);
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        None
    }

    pub fn url(&self) -> String {
        format!("nats://127.0.0.1:{}", self.port)
    }
}

impl Drop for NatsServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.store);
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
