// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `log_survey` action: an append-only audit trail of matches.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;

use crate::config::LogSurveyConfig;
use crate::survey::SurveyMatch;
use crate::template::{self, MatchFields, TimestampPrecision};

/// Appends one rendered record per match and flushes immediately.
#[derive(Debug)]
pub struct LogSurvey {
    path: PathBuf,
    format: String,
    precision: TimestampPrecision,
    file: Option<File>,
}

impl LogSurvey {
    /// Open `config.log_file` for append. Fails if the path cannot be opened.
    pub fn open(config: &LogSurveyConfig) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .with_context(|| format!("opening survey log {}", config.log_file.display()))?;
        tracing::info!(path = %config.log_file.display(), "log survey action ready");
        Ok(Self {
            path: config.log_file.clone(),
            format: config.log_format.clone(),
            precision: config.timestamp_precision,
            file: Some(file),
        })
    }

    pub fn execute(&mut self, hit: &SurveyMatch<'_>) -> anyhow::Result<()> {
        let Some(ref mut file) = self.file else {
            anyhow::bail!("survey log {} is closed", self.path.display());
        };
        let timestamp = self.precision.now();
        let mut record = template::render(
            &self.format,
            &MatchFields {
                name: hit.group.label(),
                timestamp: &timestamp,
                line: hit.line,
                matched_pattern: hit.group.pattern_str(),
            },
        );
        record.push('\n');
        file.write_all(record.as_bytes())
            .and_then(|()| file.flush())
            .with_context(|| format!("writing survey log {}", self.path.display()))?;
        Ok(())
    }

    /// Close the file. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.sync_data();
        }
    }
}

impl Drop for LogSurvey {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
