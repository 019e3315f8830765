// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level session runner, shared by `main` and integration tests.

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::action::{self, ConnectorFactory, Dispatcher};
use crate::config::{Config, Settings};
use crate::deadline::{Deadline, DeadlineHandle};
use crate::survey::SurveyRegistry;
use crate::tail::{FileEvent, LineReader, TailStats, TargetWatcher, Tailer};

/// Why a session ended. Every variant is a graceful exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfSession,
    TimedOut,
    TargetDeleted,
    Interrupted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::EndOfSession => "end of session",
            Self::TimedOut => "timed out",
            Self::TargetDeleted => "target file deleted",
            Self::Interrupted => "interrupted",
        })
    }
}

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
pub fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
                shutdown.cancel();
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
                shutdown.cancel();
            }
        }
    });
}

/// Run a survey session to completion, publishing over NATS.
pub async fn run(settings: Settings, shutdown: CancellationToken) -> anyhow::Result<StopReason> {
    run_with(settings, &action::nats_connector, shutdown).await
}

/// Run a survey session with a caller-supplied broker transport.
///
/// Startup failures (target file, patterns, action construction) return
/// `Err` before anything is read. Once tailing starts, every exit path
/// unsubscribes from notifications, closes the target and releases the
/// actions before returning.
pub async fn run_with(
    settings: Settings,
    connectors: &ConnectorFactory,
    shutdown: CancellationToken,
) -> anyhow::Result<StopReason> {
    let reader = LineReader::open(&settings.target_file)?;
    let registry = SurveyRegistry::from_settings(&settings)?;
    let dispatcher = Dispatcher::from_settings(&settings, connectors).await?;
    let mut tailer = Tailer::new(reader, registry, dispatcher);
    info!(
        path = %settings.target_file.display(),
        groups = settings.survey_groups.len(),
        end = settings.end_reconn.as_deref().unwrap_or("-"),
        timeout_secs = settings.timeout.as_secs(),
        "tailing target file"
    );

    let mut deadline = Deadline::new();
    deadline.set_timeout(settings.timeout);

    let (event_tx, mut event_rx) = mpsc::channel(1);
    let watcher = match TargetWatcher::start(&settings.target_file, event_tx) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("file notifications unavailable, polling only: {e:#}");
            None
        }
    };

    let result =
        supervise(&mut tailer, &settings, &deadline.handle(), &mut event_rx, &shutdown).await;

    drop(watcher);
    let TailStats { lines, matches } = tailer.close().await;
    match result {
        Ok(reason) => info!(%reason, lines, matches, "session finished"),
        Err(ref e) => warn!(lines, matches, "session aborted: {e:#}"),
    }
    result
}

/// Drain pre-existing content, then alternate between file events and
/// poll ticks until a stop condition holds.
async fn supervise(
    tailer: &mut Tailer,
    settings: &Settings,
    deadline: &DeadlineHandle,
    events: &mut mpsc::Receiver<FileEvent>,
    shutdown: &CancellationToken,
) -> anyhow::Result<StopReason> {
    tailer.process_available_lines(deadline).await?;

    let mut poll = tokio::time::interval(settings.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if let Some(reason) = stop_reason(tailer, deadline) {
            return Ok(reason);
        }

        let deleted = tokio::select! {
            _ = shutdown.cancelled() => return Ok(StopReason::Interrupted),
            Some(event) = events.recv() => event == FileEvent::Deleted,
            _ = poll.tick() => false,
        };

        // Lines still readable through the open handle are drained even
        // when the path is gone.
        tailer.process_available_lines(deadline).await?;
        if deleted || !settings.target_file.exists() {
            info!(path = %settings.target_file.display(), "target file deleted");
            tailer.mark_target_missing();
        }
    }
}

fn stop_reason(tailer: &Tailer, deadline: &DeadlineHandle) -> Option<StopReason> {
    let state = tailer.state();
    if state.end_of_session {
        Some(StopReason::EndOfSession)
    } else if deadline.is_timed_out() {
        Some(StopReason::TimedOut)
    } else if state.target_missing {
        Some(StopReason::TargetDeleted)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
