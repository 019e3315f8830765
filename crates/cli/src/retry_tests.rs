// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{retry, RetryPolicy};

#[derive(Debug, PartialEq)]
enum Fault {
    Transient,
    Fatal,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

fn transient(e: &Fault) -> bool {
    *e == Fault::Transient
}

/// Calls recorded by the operation, plus a script of results to hand out.
struct Script {
    calls: Vec<u32>,
    results: Vec<Result<u32, Fault>>,
}

impl Script {
    fn new(results: Vec<Result<u32, Fault>>) -> Self {
        Self { calls: vec![], results }
    }

    fn next(&mut self, attempt: u32) -> Result<u32, Fault> {
        self.calls.push(attempt);
        if self.results.is_empty() {
            Ok(attempt)
        } else {
            self.results.remove(0)
        }
    }
}

#[tokio::test]
async fn success_on_first_attempt() {
    let mut script = Script::new(vec![Ok(7)]);
    let policy = RetryPolicy::new(3, transient);
    let result = retry(&mut script, &policy, |s, n| Box::pin(async move { s.next(n) })).await;
    assert_eq!(result, Ok(7));
    assert_eq!(script.calls, vec![1]);
}

#[tokio::test]
async fn recoverable_error_is_retried() {
    let mut script = Script::new(vec![Err(Fault::Transient), Ok(9)]);
    let policy = RetryPolicy::new(2, transient);
    let result = retry(&mut script, &policy, |s, n| Box::pin(async move { s.next(n) })).await;
    assert_eq!(result, Ok(9));
    assert_eq!(script.calls, vec![1, 2]);
}

#[tokio::test]
async fn fatal_error_is_not_retried() {
    let mut script = Script::new(vec![Err(Fault::Fatal), Ok(1)]);
    let policy = RetryPolicy::new(5, transient);
    let result = retry(&mut script, &policy, |s, n| Box::pin(async move { s.next(n) })).await;
    assert_eq!(result, Err(Fault::Fatal));
    assert_eq!(script.calls, vec![1]);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let mut script = Script::new(vec![
        Err(Fault::Transient),
        Err(Fault::Transient),
        Err(Fault::Transient),
    ]);
    let policy = RetryPolicy::new(2, transient);
    let result = retry(&mut script, &policy, |s, n| Box::pin(async move { s.next(n) })).await;
    assert_eq!(result, Err(Fault::Transient));
    assert_eq!(script.calls, vec![1, 2]);
}

#[tokio::test]
async fn zero_attempts_still_runs_once() {
    let mut script = Script::new(vec![Err(Fault::Transient)]);
    let policy = RetryPolicy::new(0, transient);
    let result = retry(&mut script, &policy, |s, n| Box::pin(async move { s.next(n) })).await;
    assert_eq!(result, Err(Fault::Transient));
    assert_eq!(script.calls, vec![1]);
}
