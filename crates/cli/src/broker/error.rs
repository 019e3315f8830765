// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Failures of the broker publish path.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker unreachable or credentials refused.
    #[error("failed to connect to broker at {url}: {message}")]
    Connect { url: String, message: String },

    /// Stream or consumer declaration failed (including config conflicts).
    #[error("failed to declare {what}: {message}")]
    Topology { what: String, message: String },

    /// No stream is bound to the subject the message was published on.
    #[error("message on {subject} is unroutable")]
    Unroutable { subject: String },

    /// The broker negatively acknowledged the message.
    #[error("broker rejected message: {0}")]
    Rejected(String),

    /// The connection or channel went away mid-publish, or the broker never
    /// confirmed the message.
    #[error("broker connection closed: {0}")]
    ConnectionClosed(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl BrokerError {
    /// Recoverable by tearing down the connection and publishing again.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_))
    }

    /// Permanent for this message: log it and drop the message.
    pub fn is_routing_rejection(&self) -> bool {
        matches!(self, Self::Unroutable { .. } | Self::Rejected(_))
    }

    pub fn connect(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Connect { url: url.into(), message: message.to_string() }
    }

    pub fn topology(what: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Topology { what: what.into(), message: message.to_string() }
    }
}
