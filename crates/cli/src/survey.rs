// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered survey patterns and end-of-session detection.

use anyhow::Context;
use regex::Regex;

use crate::action::ActionKind;
use crate::config::Settings;

/// A compiled survey pattern and the action routed to on match.
#[derive(Debug, Clone)]
pub struct SurveyGroup {
    pub name: String,
    pub display_name: Option<String>,
    pub pattern: Regex,
    pub action: ActionKind,
    /// Static fields merged into broker messages for this group.
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl SurveyGroup {
    /// Name used for the `{name}` field in records.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Source text of the compiled pattern.
    pub fn pattern_str(&self) -> &str {
        self.pattern.as_str()
    }
}

/// A line matched against one survey group.
#[derive(Debug, Clone, Copy)]
pub struct SurveyMatch<'a> {
    pub group: &'a SurveyGroup,
    /// Matched line without its trailing line terminator.
    pub line: &'a str,
}

/// Survey groups in registration order plus the optional end marker.
#[derive(Debug, Clone, Default)]
pub struct SurveyRegistry {
    groups: Vec<SurveyGroup>,
    end_group: Option<String>,
}

impl SurveyRegistry {
    /// Compile every configured survey group.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let mut groups = Vec::with_capacity(settings.survey_groups.len());
        for group in &settings.survey_groups {
            let pattern = Regex::new(&group.pattern)
                .with_context(|| format!("compiling pattern for survey group {}", group.name))?;
            groups.push(SurveyGroup {
                name: group.name.clone(),
                display_name: group.display_name.clone(),
                pattern,
                action: group.success.parse()?,
                data: group.data.clone(),
            });
            tracing::debug!(
                group = %group.name,
                pattern = %group.pattern,
                "registered survey group"
            );
        }
        Self::new(groups, settings.end_reconn.clone())
    }

    /// Build a registry from already compiled groups.
    pub fn new(groups: Vec<SurveyGroup>, end_group: Option<String>) -> anyhow::Result<Self> {
        for (i, group) in groups.iter().enumerate() {
            if groups[..i].iter().any(|g| g.name == group.name) {
                anyhow::bail!("duplicate survey group: {}", group.name);
            }
        }
        if let Some(ref end) = end_group {
            if !groups.iter().any(|g| &g.name == end) {
                anyhow::bail!("end_reconn names unknown survey group: {end}");
            }
        }
        Ok(Self { groups, end_group })
    }

    /// First group, in registration order, whose pattern occurs anywhere in `line`.
    pub fn evaluate(&self, line: &str) -> Option<&SurveyGroup> {
        let hit = self.groups.iter().find(|g| g.pattern.is_match(line));
        if let Some(group) = hit {
            tracing::debug!(group = %group.name, pattern = %group.pattern, "matched line: {line}");
        }
        hit
    }

    /// Whether `group_name` is the configured end-of-session group.
    pub fn is_end_of_session(&self, group_name: &str) -> bool {
        self.end_group.as_deref() == Some(group_name)
    }

    pub fn groups(&self) -> &[SurveyGroup] {
        &self.groups
    }

    pub fn end_group(&self) -> Option<&str> {
        self.end_group.as_deref()
    }
}

#[cfg(test)]
#[path = "survey_tests.rs"]
mod tests;
