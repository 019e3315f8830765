// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-clock session deadline.
//!
//! A one-shot timer task latches an atomic flag on expiry. Nothing is
//! interrupted: the tailer and the supervisory loop poll [`Deadline::is_timed_out`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

/// One-way `timed_out` latch shared between the timer and its observers.
#[derive(Debug, Default)]
pub struct Deadline {
    timed_out: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

impl Deadline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer. A zero timeout latches immediately.
    ///
    /// Re-arming replaces a pending timer; an already latched flag stays set.
    pub fn set_timeout(&mut self, timeout: Duration) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if timeout.is_zero() {
            self.expire();
            return;
        }
        let flag = Arc::clone(&self.timed_out);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            flag.store(true, Ordering::Release);
            info!("reconn timed out after {}s", timeout.as_secs());
        }));
    }

    /// Non-blocking read of the latch; callable from any thread.
    pub fn is_timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    /// A cloneable read-only view of the latch.
    pub fn handle(&self) -> DeadlineHandle {
        DeadlineHandle(Arc::clone(&self.timed_out))
    }

    fn expire(&self) {
        self.timed_out.store(true, Ordering::Release);
        info!("reconn timed out");
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Read-only view of a [`Deadline`] latch.
#[derive(Debug, Clone)]
pub struct DeadlineHandle(Arc<AtomicBool>);

impl DeadlineHandle {
    pub fn is_timed_out(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "deadline_tests.rs"]
mod tests;
