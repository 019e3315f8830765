// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reliable publishing of survey matches to a message broker.
//!
//! [`BrokerSurvey`] owns the connection state: a flow-control flag raised
//! by the broker client, an unbounded FIFO of messages deferred while the
//! flag is up, and the current channel. Delivery is at-least-once:
//!
//! - while blocked, every match is queued and nothing is published;
//! - the first publish after unblocking drains the queue oldest-first;
//! - a closed connection triggers one reconnect and one more attempt;
//! - unroutable or negatively acknowledged messages are logged and dropped.

pub mod error;
pub mod message;
pub mod nats;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

pub use self::error::BrokerError;
pub use self::message::{MessageBuilder, OutboundMessage};

use crate::config::BrokerSurveyConfig;
use crate::retry::{retry, RetryPolicy};
use crate::survey::SurveyMatch;

/// Attempts per message: the first publish plus one after reconnecting.
const PUBLISH_ATTEMPTS: u32 = 2;

/// Broker-driven flow-control flag.
///
/// Set and cleared from the broker client's own callbacks; read by the
/// publishing side. Only a boolean crosses threads.
#[derive(Debug, Clone, Default)]
pub struct FlowSignal(Arc<AtomicBool>);

impl FlowSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// The broker is low on resources (or unreachable): defer publishing.
    pub fn block(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Publishing may resume. Deferred messages flush on the next publish.
    pub fn unblock(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_blocked(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Establishes broker channels with the survey topology declared.
pub trait BrokerConnector: Send + Sync + 'static {
    /// Connect, idempotently declare exchange, queue and binding, and enable
    /// delivery confirmation. Flow-control callbacks report through `flow`.
    fn connect(
        &self,
        flow: FlowSignal,
    ) -> BoxFuture<'_, Result<Box<dyn BrokerChannel>, BrokerError>>;

    /// Broker address for logs. Never includes credentials.
    fn describe(&self) -> String;
}

/// An open, confirm-enabled publishing channel.
pub trait BrokerChannel: Send {
    /// Publish as mandatory and wait for the broker's confirmation.
    fn publish<'a>(
        &'a mut self,
        message: &'a OutboundMessage,
    ) -> BoxFuture<'a, Result<(), BrokerError>>;

    fn is_open(&self) -> bool;

    /// Close the channel, then its connection.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    Disconnected,
    Ready,
    Blocked,
}

/// Outcome of a publish that did not fail fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Confirmed,
    /// Queued until the broker lifts flow control.
    Deferred,
    /// Rejected by the broker's routing layer; logged and discarded.
    Dropped,
}

/// The `broker_survey` action.
pub struct BrokerSurvey {
    connector: Arc<dyn BrokerConnector>,
    channel: Option<Box<dyn BrokerChannel>>,
    flow: FlowSignal,
    pending: VecDeque<OutboundMessage>,
    builder: MessageBuilder,
    reconnects: u64,
}

impl BrokerSurvey {
    /// Connect and declare the topology. Failure here is fatal to startup.
    pub async fn connect(
        connector: Arc<dyn BrokerConnector>,
        config: &BrokerSurveyConfig,
    ) -> Result<Self, BrokerError> {
        let flow = FlowSignal::new();
        info!(
            broker = %connector.describe(),
            exchange = %config.exchange,
            queue = %config.queue,
            routing_key = %config.routing_key,
            "connecting broker survey action"
        );
        let channel = connector.connect(flow.clone()).await?;
        Ok(Self {
            connector,
            channel: Some(channel),
            flow,
            pending: VecDeque::new(),
            builder: MessageBuilder::new(config),
            reconnects: 0,
        })
    }

    /// Publish a JSON message for `hit`, or defer it while blocked.
    ///
    /// Deferred messages are flushed, oldest first, before the new one. If
    /// the flush fails the new message joins the back of the queue and the
    /// call reports `Deferred`. An error means the new message was lost.
    pub async fn execute(&mut self, hit: &SurveyMatch<'_>) -> Result<Delivery, BrokerError> {
        let message = self.builder.build(hit)?;

        if self.flow.is_blocked() {
            self.defer(message);
            return Ok(Delivery::Deferred);
        }

        if let Err(e) = self.flush_pending().await {
            warn!(pending = self.pending.len(), "flushing deferred broker messages failed: {e}");
            self.defer(message);
            return Ok(Delivery::Deferred);
        }

        // The broker may have raised flow control while the queue drained.
        if self.flow.is_blocked() {
            self.defer(message);
            return Ok(Delivery::Deferred);
        }

        self.publish(&message).await
    }

    /// Publish with delivery confirmation, reconnecting once on a closed
    /// connection. Routing rejections are logged and dropped.
    pub async fn publish(&mut self, message: &OutboundMessage) -> Result<Delivery, BrokerError> {
        let policy = RetryPolicy::new(PUBLISH_ATTEMPTS, BrokerError::is_connection_closed);
        let result = retry(self, &policy, |this, attempt| {
            let message = message.clone();
            Box::pin(async move { this.publish_attempt(&message, attempt).await })
        })
        .await;

        match result {
            Ok(()) => Ok(Delivery::Confirmed),
            Err(e) if e.is_routing_rejection() => {
                warn!(id = %message.id, "dropping message: {e}");
                Ok(Delivery::Dropped)
            }
            Err(e) => Err(e),
        }
    }

    async fn publish_attempt(
        &mut self,
        message: &OutboundMessage,
        attempt: u32,
    ) -> Result<(), BrokerError> {
        if attempt > 1 || !self.channel.as_ref().is_some_and(|c| c.is_open()) {
            self.reconnect().await?;
        }
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| BrokerError::ConnectionClosed("no open channel".to_owned()))?;
        channel.publish(message).await
    }

    async fn flush_pending(&mut self) -> Result<(), BrokerError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        info!(count = self.pending.len(), "flushing deferred broker messages");
        while let Some(message) = self.pending.pop_front() {
            if self.flow.is_blocked() {
                self.pending.push_front(message);
                break;
            }
            if let Err(e) = self.publish(&message).await {
                self.pending.push_front(message);
                return Err(e);
            }
        }
        Ok(())
    }

    fn defer(&mut self, message: OutboundMessage) {
        self.pending.push_back(message);
        debug!(pending = self.pending.len(), "broker blocked, deferred message");
    }

    /// Drop the current connection and establish a fresh one, re-declaring
    /// the topology.
    async fn reconnect(&mut self) -> Result<(), BrokerError> {
        self.teardown().await;
        info!(broker = %self.connector.describe(), "reconnecting to broker");
        let channel = self.connector.connect(self.flow.clone()).await?;
        self.channel = Some(channel);
        self.flow.unblock();
        self.reconnects += 1;
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if channel.is_open() {
                channel.close().await;
            }
        }
    }

    /// Flush what can be flushed, then close channel and connection.
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        if self.channel.is_some() && !self.flow.is_blocked() {
            if let Err(e) = self.flush_pending().await {
                warn!("broker flush on close failed: {e}");
            }
        }
        if !self.pending.is_empty() {
            warn!(count = self.pending.len(), "closing broker with undelivered messages");
        }
        self.teardown().await;
    }

    pub fn state(&self) -> BrokerState {
        match self.channel {
            None => BrokerState::Disconnected,
            Some(_) if self.flow.is_blocked() => BrokerState::Blocked,
            Some(_) => BrokerState::Ready,
        }
    }

    /// Handle for flow-control callbacks.
    pub fn flow(&self) -> &FlowSignal {
        &self.flow
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
