// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod action;
pub mod broker;
pub mod config;
pub mod deadline;
pub mod retry;
pub mod run;
pub mod survey;
pub mod tail;
pub mod template;
pub mod test_support;
