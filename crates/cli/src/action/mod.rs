// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Survey actions and the dispatcher that routes matches to them.
//!
//! Action instances are created once at startup for the kinds the survey
//! groups actually reference, shared by every group of that kind, and
//! released together at shutdown.

pub mod log;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::broker::nats::NatsConnector;
use crate::broker::{BrokerConnector, BrokerSurvey, Delivery};
use crate::config::{BrokerSurveyConfig, Settings};
use crate::survey::SurveyMatch;

pub use self::log::LogSurvey;

/// The closed set of survey action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    LogSurvey,
    BrokerSurvey,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LogSurvey => "log_survey",
            Self::BrokerSurvey => "broker_survey",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "log_survey" => Ok(Self::LogSurvey),
            "broker_survey" => Ok(Self::BrokerSurvey),
            other => anyhow::bail!(
                "unknown action kind: {other} (supported: log_survey, broker_survey)"
            ),
        }
    }
}

/// Builds the broker transport for a `broker_survey` section.
pub type ConnectorFactory = dyn Fn(&BrokerSurveyConfig) -> Arc<dyn BrokerConnector> + Send + Sync;

/// Default factory: NATS JetStream.
pub fn nats_connector(config: &BrokerSurveyConfig) -> Arc<dyn BrokerConnector> {
    Arc::new(NatsConnector::new(config.clone()))
}

/// A live action instance.
pub enum SurveyAction {
    Log(LogSurvey),
    Broker(Box<BrokerSurvey>),
}

impl SurveyAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Log(_) => ActionKind::LogSurvey,
            Self::Broker(_) => ActionKind::BrokerSurvey,
        }
    }

    pub async fn execute(&mut self, hit: &SurveyMatch<'_>) -> anyhow::Result<()> {
        match self {
            Self::Log(action) => action.execute(hit),
            Self::Broker(action) => match action.execute(hit).await? {
                Delivery::Confirmed => Ok(()),
                Delivery::Deferred => {
                    debug!(pending = action.pending_len(), "broker message deferred");
                    Ok(())
                }
                Delivery::Dropped => {
                    warn!(group = %hit.group.name, "broker dropped survey message");
                    Ok(())
                }
            },
        }
    }

    /// Release the instance. Idempotent.
    pub async fn close(&mut self) {
        match self {
            Self::Log(action) => action.close(),
            Self::Broker(action) => action.close().await,
        }
    }
}

/// Routes survey matches to the action instance for their group's kind.
pub struct Dispatcher {
    actions: HashMap<ActionKind, SurveyAction>,
}

impl Dispatcher {
    pub fn new(actions: impl IntoIterator<Item = SurveyAction>) -> Self {
        Self { actions: actions.into_iter().map(|a| (a.kind(), a)).collect() }
    }

    /// Create one instance per action kind referenced by `settings`.
    pub async fn from_settings(
        settings: &Settings,
        connectors: &ConnectorFactory,
    ) -> anyhow::Result<Self> {
        let mut actions = Vec::new();
        for kind in settings.action_kinds()? {
            let action = match kind {
                ActionKind::LogSurvey => {
                    let config = settings.log_survey.clone().unwrap_or_default();
                    SurveyAction::Log(LogSurvey::open(&config)?)
                }
                ActionKind::BrokerSurvey => {
                    let config = settings
                        .broker_survey
                        .as_ref()
                        .context("broker_survey action requires a broker_survey section")?;
                    let broker = BrokerSurvey::connect(connectors(config), config)
                        .await
                        .context("starting broker_survey action")?;
                    SurveyAction::Broker(Box::new(broker))
                }
            };
            info!(action = %kind, "registered survey action");
            actions.push(action);
        }
        Ok(Self::new(actions))
    }

    /// Run the action configured for `hit.group`.
    pub async fn dispatch(&mut self, hit: &SurveyMatch<'_>) -> anyhow::Result<()> {
        let kind = hit.group.action;
        let action = self
            .actions
            .get_mut(&kind)
            .with_context(|| format!("no {kind} action registered for group {}", hit.group.name))?;
        action.execute(hit).await.with_context(|| {
            format!(
                "{kind} failed for group {} (pattern {:?}) on line {:?}",
                hit.group.name,
                hit.group.pattern_str(),
                hit.line
            )
        })
    }

    /// Release every action instance.
    pub async fn close(&mut self) {
        for (kind, action) in self.actions.iter_mut() {
            debug!(action = %kind, "closing survey action");
            action.close().await;
        }
    }

    pub fn get(&self, kind: ActionKind) -> Option<&SurveyAction> {
        self.actions.get(&kind)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
