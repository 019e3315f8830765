// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry of a fallible async operation over mutable state.

use futures_util::future::BoxFuture;
use tracing::{debug, info};

/// How many times to attempt an operation and which errors are worth retrying.
pub struct RetryPolicy<E> {
    pub max_attempts: u32,
    pub recoverable: fn(&E) -> bool,
}

impl<E> RetryPolicy<E> {
    pub fn new(max_attempts: u32, recoverable: fn(&E) -> bool) -> Self {
        Self { max_attempts: max_attempts.max(1), recoverable }
    }
}

/// Run `op(state, attempt)` until it succeeds, fails with an error the
/// policy does not consider recoverable, or `max_attempts` is reached.
///
/// `attempt` starts at 1. The last error is returned unchanged.
pub async fn retry<S, T, E, F>(state: &mut S, policy: &RetryPolicy<E>, mut op: F) -> Result<T, E>
where
    S: ?Sized,
    E: std::fmt::Display,
    F: for<'a> FnMut(&'a mut S, u32) -> BoxFuture<'a, Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op(&mut *state, attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && (policy.recoverable)(&e) => {
                info!("retrying after recoverable error ({attempt}/{}): {e}", policy.max_attempts);
                attempt += 1;
            }
            Err(e) => {
                debug!("giving up after attempt {attempt}: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
