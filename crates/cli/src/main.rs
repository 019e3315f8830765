// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use reconn::config::Config;
use reconn::run::{init_tracing, run, spawn_signal_handler};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let settings = match config.load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    };

    init_tracing(&config);
    info!(config_file = %config.config_file.display(), "loaded survey configuration");

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    match run(settings, shutdown).await {
        Ok(reason) => info!("reconn stopped: {reason}"),
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    }
}
