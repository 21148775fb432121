//! logd - collects process output and syslog messages into named logs
//!
//! ## Usage
//!
//! ```bash
//! # JSON-lines diagnostics, data under ./logd-data, syslog on 127.0.0.1:4500
//! logd
//!
//! # Custom home and port, human-readable diagnostics
//! logd --home /var/lib/logd --syslog-port 5514 --pretty
//! ```
//!
//! Runs until Ctrl-C, then stops every worker and closes the store.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use logd_collector::{Collector, SyslogListener};
use logd_logging::LogdSubscriberBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use config::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the guard alive so buffered file output is flushed on exit
    let _guard = LogdSubscriberBuilder::new()
        .with_config(cli.log_config())
        .init()
        .context("initializing logging")?;

    let collector = Collector::new(cli.collector_config());
    collector.start().await.context("starting collector")?;

    let listener = match SyslogListener::bind(cli.syslog_config(), collector.clone()).await {
        Ok(listener) => listener,
        Err(e) => {
            collector.stop().await.context("stopping collector")?;
            return Err(e).context("binding syslog listener");
        }
    };
    info!(home = %cli.home.display(), "logd running");

    let cancel = CancellationToken::new();
    tokio::spawn(wait_for_interrupt(cancel.clone()));

    let served = listener.run(cancel).await;
    if let Err(e) = &served {
        error!(error = %e, "Syslog listener failed");
    }

    collector.stop().await.context("stopping collector")?;
    info!("logd stopped");
    served.context("running syslog listener")
}

async fn wait_for_interrupt(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => error!(error = %e, "Cannot listen for Ctrl-C, shutting down"),
    }
    cancel.cancel();
}
