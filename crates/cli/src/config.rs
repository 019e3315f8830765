// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::template::TimestampPrecision;

/// Default deadline when neither the CLI nor the config file sets one.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 20;

/// Tail a VM console log and act on survey pattern matches.
#[derive(Debug, Parser)]
#[command(name = "reconn", version, about)]
pub struct Config {
    /// Path to the JSON survey configuration file.
    #[arg(long, env = "RECONN_CONFIG_FILE", default_value = "/etc/reconn/reconn.json")]
    pub config_file: PathBuf,

    /// Console log file to tail (overrides `target_file`).
    #[arg(long, env = "RECONN_TARGET_FILE")]
    pub target_file: Option<PathBuf>,

    /// Stop after this many minutes (overrides `timeout`).
    #[arg(long, env = "RECONN_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Survey group whose match ends the session (overrides `end_reconn`).
    #[arg(long, env = "RECONN_END_RECONN")]
    pub end_reconn: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "RECONN_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "RECONN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // -- Duration overrides (skip from CLI; set in tests) ------------------
    #[clap(skip)]
    pub poll_interval_ms: Option<u64>,
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl Config {
    duration_field!(poll_interval, poll_interval_ms, "RECONN_POLL_INTERVAL_MS", 1_000);

    /// Read the config file and apply command-line overrides.
    pub fn load(&self) -> anyhow::Result<Settings> {
        let file = load_survey_file(&self.config_file)?;
        let settings = self.resolve(file);
        settings.validate()?;
        Ok(settings)
    }

    /// Merge a parsed config file with command-line overrides.
    pub fn resolve(&self, file: SurveyFile) -> Settings {
        Settings {
            target_file: self.target_file.clone().or(file.target_file).unwrap_or_default(),
            timeout: Duration::from_secs(
                self.timeout
                    .or(file.timeout)
                    .unwrap_or(DEFAULT_TIMEOUT_MINUTES)
                    .saturating_mul(60),
            ),
            end_reconn: self.end_reconn.clone().or(file.end_reconn).filter(|s| !s.is_empty()),
            survey_groups: file.survey_groups,
            log_survey: file.log_survey,
            broker_survey: file.broker_survey,
            poll_interval: self.poll_interval(),
        }
    }
}

/// Contents of the `--config-file` JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurveyFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file: Option<PathBuf>,
    /// Deadline in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reconn: Option<String>,
    /// Ordered survey groups; earlier groups win when several match a line.
    #[serde(default)]
    pub survey_groups: Vec<SurveyGroupConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_survey: Option<LogSurveyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_survey: Option<BrokerSurveyConfig>,
}

/// One named survey pattern and the action taken when it matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurveyGroupConfig {
    pub name: String,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Action kind (`log_survey` or `broker_survey`).
    #[serde(default = "default_success")]
    pub success: String,
    /// Static fields merged into broker messages for this group.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

fn default_success() -> String {
    ActionKind::LogSurvey.as_str().to_owned()
}

/// Settings for the `log_survey` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSurveyConfig {
    pub log_file: PathBuf,
    pub log_format: String,
    pub timestamp_precision: TimestampPrecision,
}

impl Default for LogSurveyConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("/var/log/reconn/reconn_survey.log"),
            log_format: "{timestamp} {{ {line} : {matched_pattern} }}".to_owned(),
            timestamp_precision: TimestampPrecision::Seconds,
        }
    }
}

/// Settings for the `broker_survey` action.
///
/// `exchange` names the JetStream stream, `queue` its durable consumer and
/// `routing_key` the subject both are bound to.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerSurveyConfig {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    /// JSON object whose string values may contain `{field}` placeholders.
    pub message_template: serde_json::Map<String, serde_json::Value>,
    /// Static fields merged into every message.
    pub user_data: serde_json::Map<String, serde_json::Value>,
    pub timestamp_precision: TimestampPrecision,
}

impl Default for BrokerSurveyConfig {
    fn default() -> Self {
        let mut message_template = serde_json::Map::new();
        message_template.insert("name".to_owned(), "{name}".into());
        Self {
            url: "nats://127.0.0.1:4222".to_owned(),
            user: None,
            password: None,
            token: None,
            exchange: "RECONN".to_owned(),
            queue: "reconn_survey".to_owned(),
            routing_key: "reconn.survey".to_owned(),
            message_template,
            user_data: serde_json::Map::new(),
            timestamp_precision: TimestampPrecision::Seconds,
        }
    }
}

impl std::fmt::Debug for BrokerSurveyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSurveyConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("exchange", &self.exchange)
            .field("queue", &self.queue)
            .field("routing_key", &self.routing_key)
            .finish_non_exhaustive()
    }
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target_file: PathBuf,
    pub timeout: Duration,
    pub end_reconn: Option<String>,
    pub survey_groups: Vec<SurveyGroupConfig>,
    pub log_survey: Option<LogSurveyConfig>,
    pub broker_survey: Option<BrokerSurveyConfig>,
    pub poll_interval: Duration,
}

impl Settings {
    /// Reject configurations the session cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target_file.as_os_str().is_empty() {
            anyhow::bail!("no target file configured (set target_file or --target-file)");
        }
        if self.survey_groups.is_empty() {
            anyhow::bail!("no survey groups configured");
        }

        let mut names = HashSet::new();
        for group in &self.survey_groups {
            if group.name.is_empty() {
                anyhow::bail!("survey group with empty name");
            }
            if !names.insert(group.name.as_str()) {
                anyhow::bail!("duplicate survey group: {}", group.name);
            }
            if group.pattern.is_empty() {
                anyhow::bail!("survey group {} has an empty pattern", group.name);
            }
            regex::Regex::new(&group.pattern)
                .with_context(|| format!("invalid pattern for survey group {}", group.name))?;
            let kind: ActionKind = group
                .success
                .parse()
                .with_context(|| format!("survey group {}", group.name))?;
            if kind == ActionKind::BrokerSurvey && self.broker_survey.is_none() {
                anyhow::bail!(
                    "survey group {} uses broker_survey but no broker_survey section is configured",
                    group.name
                );
            }
        }

        if let Some(ref end) = self.end_reconn {
            if !names.contains(end.as_str()) {
                anyhow::bail!("end_reconn names unknown survey group: {end}");
            }
        }

        Ok(())
    }

    /// Distinct action kinds referenced by the survey groups, in first-use order.
    pub fn action_kinds(&self) -> anyhow::Result<Vec<ActionKind>> {
        let mut kinds = Vec::new();
        for group in &self.survey_groups {
            let kind: ActionKind = group.success.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    /// Minimal settings for tests: one `log_survey` group per `(name, pattern)`.
    #[doc(hidden)]
    pub fn test(target_file: &Path, log_file: &Path, groups: &[(&str, &str)]) -> Self {
        Self {
            target_file: target_file.to_owned(),
            timeout: Duration::from_secs(60),
            end_reconn: None,
            survey_groups: groups
                .iter()
                .map(|(name, pattern)| SurveyGroupConfig {
                    name: (*name).to_owned(),
                    pattern: (*pattern).to_owned(),
                    display_name: None,
                    success: default_success(),
                    data: serde_json::Map::new(),
                })
                .collect(),
            log_survey: Some(LogSurveyConfig {
                log_file: log_file.to_owned(),
                log_format: "{name} {line}".to_owned(),
                timestamp_precision: TimestampPrecision::Seconds,
            }),
            broker_survey: None,
            poll_interval: Duration::from_millis(20),
        }
    }
}

/// Load and parse the survey config file at `path`.
pub fn load_survey_file(path: &Path) -> anyhow::Result<SurveyFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let file: SurveyFile = serde_json::from_str(&contents)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(file)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
