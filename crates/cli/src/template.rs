// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Placeholder rendering for survey records and broker messages.
//!
//! Templates use `{field}` placeholders with `{{` and `}}` as literal brace
//! escapes. Unknown placeholders are emitted verbatim so a typo in a user
//! template degrades the record instead of failing the action.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Resolution of the `{timestamp}` field.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPrecision {
    #[default]
    Seconds,
    Microseconds,
}

impl TimestampPrecision {
    /// Current wall-clock time as an RFC 3339 UTC string.
    pub fn now(self) -> String {
        let format = match self {
            Self::Seconds => SecondsFormat::Secs,
            Self::Microseconds => SecondsFormat::Micros,
        };
        Utc::now().to_rfc3339_opts(format, true)
    }
}

/// Fields available to a template when a survey pattern matches.
#[derive(Debug, Clone, Copy)]
pub struct MatchFields<'a> {
    pub name: &'a str,
    pub timestamp: &'a str,
    pub line: &'a str,
    pub matched_pattern: &'a str,
}

impl MatchFields<'_> {
    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            "name" => Some(self.name),
            "timestamp" => Some(self.timestamp),
            "line" => Some(self.line),
            "matched_pattern" => Some(self.matched_pattern),
            _ => None,
        }
    }
}

/// Render `template`, substituting every known `{field}`.
pub fn render(template: &str, fields: &MatchFields<'_>) -> String {
    let mut out = String::with_capacity(template.len() + fields.line.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            match tail[1..].find('}') {
                Some(end) => {
                    let key = &tail[1..=end];
                    match fields.lookup(key) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&tail[..end + 2]),
                    }
                    rest = &tail[end + 2..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        } else {
            // Lone closing brace.
            out.push('}');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
