// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental line assembly over the target file.
//!
//! [`Tailer`] owns the read handle, the survey registry, the dispatcher and
//! the session state. It is driven by a single consumer loop, so a line
//! pass never runs concurrently with another.

pub mod reader;
pub mod watch;

use std::borrow::Cow;
use std::fs::File;
use std::io::Read;

use anyhow::Context;
use tracing::{debug, error, info};

use crate::action::Dispatcher;
use crate::deadline::DeadlineHandle;
use crate::survey::{SurveyMatch, SurveyRegistry};

pub use self::reader::LineReader;
pub use self::watch::{FileEvent, TargetWatcher};

/// Mutable session state carried between line passes.
#[derive(Debug, Default)]
pub struct TailState {
    /// Bytes read past the last newline. Kept raw so a multi-byte
    /// character split across reads decodes intact once completed.
    pub partial_line: Vec<u8>,
    /// One-way latch: the end-of-session group matched.
    pub end_of_session: bool,
    /// The target file was reported deleted.
    pub target_missing: bool,
}

/// Per-session counters, logged at shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TailStats {
    pub lines: u64,
    pub matches: u64,
}

pub struct Tailer<R = File> {
    reader: LineReader<R>,
    registry: SurveyRegistry,
    dispatcher: Dispatcher,
    state: TailState,
    stats: TailStats,
}

impl<R: Read> Tailer<R> {
    pub fn new(reader: LineReader<R>, registry: SurveyRegistry, dispatcher: Dispatcher) -> Self {
        Self {
            reader,
            registry,
            dispatcher,
            state: TailState::default(),
            stats: TailStats::default(),
        }
    }

    /// Read and act on everything currently available.
    ///
    /// Stops at end of stream, when the deadline has expired, or as soon as
    /// the end-of-session group matches (remaining buffered lines are left
    /// unread). A trailing fragment without a newline is carried into the
    /// next pass; if a pass finds nothing new, the fragment is evaluated
    /// once as if complete and dropped when it matches.
    ///
    /// Read errors are fatal. Action failures are logged and the pass
    /// continues.
    pub async fn process_available_lines(
        &mut self,
        deadline: &DeadlineHandle,
    ) -> anyhow::Result<()> {
        while !self.state.end_of_session && !deadline.is_timed_out() {
            let chunk = self.reader.read_chunk().context("reading target file")?;

            if chunk.is_empty() {
                if !self.state.partial_line.is_empty() {
                    let leftover = std::mem::take(&mut self.state.partial_line);
                    if !self.handle_line(&decode(&leftover)).await {
                        self.state.partial_line = leftover;
                    }
                }
                return Ok(());
            }

            let mut line = std::mem::take(&mut self.state.partial_line);
            line.extend_from_slice(&chunk);
            if !line.ends_with(b"\n") {
                self.state.partial_line = line;
                return Ok(());
            }

            self.stats.lines += 1;
            self.handle_line(&decode(trim_terminator(&line))).await;
        }
        Ok(())
    }

    /// Evaluate one complete line. Returns whether any group matched.
    async fn handle_line(&mut self, line: &str) -> bool {
        let Some(group) = self.registry.evaluate(line) else {
            return false;
        };
        self.stats.matches += 1;

        if let Err(e) = self.dispatcher.dispatch(&SurveyMatch { group, line }).await {
            error!("{e:#}");
        }
        if self.registry.is_end_of_session(&group.name) {
            info!(group = %group.name, "end of session marker matched");
            self.state.end_of_session = true;
        }
        true
    }

    /// Record that the target file is gone.
    pub fn mark_target_missing(&mut self) {
        if !self.state.target_missing {
            debug!("target file marked missing");
        }
        self.state.target_missing = true;
    }

    pub fn state(&self) -> &TailState {
        &self.state
    }

    pub fn stats(&self) -> TailStats {
        self.stats
    }

    /// The carried-over fragment, decoded.
    pub fn partial_line(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.state.partial_line)
    }

    pub fn bytes_read(&self) -> u64 {
        self.reader.consumed()
    }

    /// Release the read handle and every action instance.
    pub async fn close(self) -> TailStats {
        let Self { reader, mut dispatcher, stats, .. } = self;
        drop(reader);
        dispatcher.close().await;
        stats
    }
}

fn trim_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
