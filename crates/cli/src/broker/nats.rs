// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NATS JetStream binding for the broker survey action.
//!
//! The exchange is a JetStream stream bound to the routing key as its
//! subject, the queue is a durable pull consumer filtered on that subject,
//! and delivery confirmation is the JetStream publish acknowledgement. A
//! publish on a subject no stream captures fails with "no responders",
//! which surfaces as [`BrokerError::Unroutable`].

use async_nats::connection::State;
use async_nats::jetstream;
use async_nats::jetstream::context::{PublishError, PublishErrorKind};
use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use super::{BrokerChannel, BrokerConnector, BrokerError, FlowSignal, OutboundMessage};
use crate::config::BrokerSurveyConfig;

/// Opens [`NatsChannel`]s for a `broker_survey` configuration.
pub struct NatsConnector {
    config: BrokerSurveyConfig,
}

impl NatsConnector {
    pub fn new(config: BrokerSurveyConfig) -> Self {
        Self { config }
    }
}

impl BrokerConnector for NatsConnector {
    fn connect(
        &self,
        flow: FlowSignal,
    ) -> BoxFuture<'_, Result<Box<dyn BrokerChannel>, BrokerError>> {
        Box::pin(async move {
            let channel = NatsChannel::open(&self.config, flow).await?;
            Ok(Box::new(channel) as Box<dyn BrokerChannel>)
        })
    }

    fn describe(&self) -> String {
        self.config.url.clone()
    }
}

/// A connected client plus its JetStream context.
pub struct NatsChannel {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    subject: String,
    closed: bool,
}

impl NatsChannel {
    /// Connect, wire flow control to connection events, and declare the
    /// stream and durable consumer.
    pub async fn open(config: &BrokerSurveyConfig, flow: FlowSignal) -> Result<Self, BrokerError> {
        let mut opts = async_nats::ConnectOptions::new();
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            opts = opts.user_and_password(user.clone(), password.clone());
        }
        if let Some(ref token) = config.token {
            opts = opts.token(token.clone());
        }
        opts = opts.event_callback(move |event| {
            let flow = flow.clone();
            async move {
                match event {
                    async_nats::Event::Disconnected => {
                        flow.block();
                        warn!("broker disconnected, deferring publishes");
                    }
                    async_nats::Event::Connected => {
                        flow.unblock();
                        info!("broker connected");
                    }
                    other => debug!("broker event: {other}"),
                }
            }
        });

        info!(url = %config.url, "connecting to NATS");
        let client =
            opts.connect(&config.url).await.map_err(|e| BrokerError::connect(&config.url, e))?;

        let jetstream = jetstream::new(client.clone());
        let stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.exchange.clone(),
                subjects: vec![config.routing_key.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::topology(format!("stream {}", config.exchange), e))?;

        stream
            .get_or_create_consumer(
                &config.queue,
                jetstream::consumer::pull::Config {
                    durable_name: Some(config.queue.clone()),
                    filter_subject: config.routing_key.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::topology(format!("consumer {}", config.queue), e))?;

        info!(
            stream = %config.exchange,
            consumer = %config.queue,
            subject = %config.routing_key,
            "NATS topology declared"
        );

        Ok(Self { client, jetstream, subject: config.routing_key.clone(), closed: false })
    }

    fn classify(&self, e: PublishError) -> BrokerError {
        classify_publish(e.kind(), &self.client.connection_state(), &self.subject, e.to_string())
    }
}

/// Map a JetStream publish failure onto the broker error taxonomy.
///
/// Missing acks and ack-pending limits are transient and go through the
/// reconnect path. Only a missing stream or an explicit refusal by a
/// connected server is permanent for the message.
pub fn classify_publish(
    kind: PublishErrorKind,
    state: &State,
    subject: &str,
    detail: String,
) -> BrokerError {
    match kind {
        PublishErrorKind::StreamNotFound => BrokerError::Unroutable { subject: subject.to_owned() },
        PublishErrorKind::BrokenPipe
        | PublishErrorKind::TimedOut
        | PublishErrorKind::MaxAckPending => BrokerError::ConnectionClosed(detail),
        _ if *state != State::Connected => BrokerError::ConnectionClosed(detail),
        PublishErrorKind::WrongLastMessageId
        | PublishErrorKind::WrongLastSequence
        | PublishErrorKind::Other => BrokerError::Rejected(detail),
    }
}

impl BrokerChannel for NatsChannel {
    fn publish<'a>(
        &'a mut self,
        message: &'a OutboundMessage,
    ) -> BoxFuture<'a, Result<(), BrokerError>> {
        Box::pin(async move {
            if self.closed {
                return Err(BrokerError::ConnectionClosed("channel closed".to_owned()));
            }
            let mut headers = async_nats::HeaderMap::new();
            headers.insert(async_nats::header::NATS_MESSAGE_ID, message.id.as_str());

            let ack = self
                .jetstream
                .publish_with_headers(self.subject.clone(), headers, message.payload.clone())
                .await
                .map_err(|e| self.classify(e))?
                .await
                .map_err(|e| self.classify(e))?;

            debug!(
                stream = %ack.stream,
                seq = ack.sequence,
                duplicate = ack.duplicate,
                "broker confirmed message"
            );
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.closed {
                return;
            }
            self.closed = true;
            if let Err(e) = self.client.flush().await {
                debug!("NATS flush on close failed: {e}");
            }
        })
    }
}

#[cfg(test)]
#[path = "nats_tests.rs"]
mod tests;
