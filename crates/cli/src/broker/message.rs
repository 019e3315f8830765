// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON message construction for survey matches.

use bytes::Bytes;
use serde_json::{Map, Value};

use super::BrokerError;
use crate::config::BrokerSurveyConfig;
use crate::survey::SurveyMatch;
use crate::template::{self, MatchFields, TimestampPrecision};

/// A message ready to publish. `id` is stable across retries so the broker
/// can de-duplicate a publish repeated after reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub id: String,
    pub payload: Bytes,
}

/// Renders survey matches into single-line JSON objects.
///
/// Field precedence, lowest first: rendered template, global `user_data`,
/// group `data`, then the computed `line`, `matched_pattern` and `timestamp`.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    template: Map<String, Value>,
    user_data: Map<String, Value>,
    precision: TimestampPrecision,
}

impl MessageBuilder {
    pub fn new(config: &BrokerSurveyConfig) -> Self {
        Self {
            template: config.message_template.clone(),
            user_data: config.user_data.clone(),
            precision: config.timestamp_precision,
        }
    }

    pub fn build(&self, hit: &SurveyMatch<'_>) -> Result<OutboundMessage, BrokerError> {
        let timestamp = self.precision.now();
        let fields = MatchFields {
            name: hit.group.label(),
            timestamp: &timestamp,
            line: hit.line,
            matched_pattern: hit.group.pattern_str(),
        };

        let mut body = Map::new();
        for (key, value) in &self.template {
            body.insert(key.clone(), render_value(value, &fields));
        }
        for (key, value) in self.user_data.iter().chain(hit.group.data.iter()) {
            body.insert(key.clone(), value.clone());
        }
        body.insert("line".to_owned(), Value::String(hit.line.to_owned()));
        body.insert("matched_pattern".to_owned(), Value::String(fields.matched_pattern.to_owned()));
        body.insert("timestamp".to_owned(), Value::String(timestamp.clone()));

        let payload = serde_json::to_vec(&Value::Object(body))?;
        Ok(OutboundMessage { id: uuid::Uuid::new_v4().to_string(), payload: Bytes::from(payload) })
    }
}

fn render_value(value: &Value, fields: &MatchFields<'_>) -> Value {
    match value {
        Value::String(s) => Value::String(template::render(s, fields)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| render_value(v, fields)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter().map(|(k, v)| (k.clone(), render_value(v, fields))).collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
