//! Command-line arguments

use std::path::PathBuf;

use clap::Parser;
use logd_collector::{CollectorConfig, DEFAULT_SYSLOG_PORT, SyslogConfig};
use logd_logging::LogConfig;
use logd_storage::{DEFAULT_MAX_EVENTS_PER_LOG, RetentionPolicy};

#[derive(Debug, Parser)]
#[command(name = "logd", about = "Collects process output and syslog messages into named logs")]
pub struct Cli {
    /// Directory holding logd.json and the event store
    #[arg(long, default_value = "./logd-data")]
    pub home: PathBuf,

    /// UDP port for RFC 5424 syslog on localhost
    #[arg(long, default_value_t = DEFAULT_SYSLOG_PORT)]
    pub syslog_port: u16,

    /// Events kept per log by eviction
    #[arg(long, default_value_t = DEFAULT_MAX_EVENTS_PER_LOG)]
    pub retention: usize,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Human-readable console output instead of JSON lines
    #[arg(long)]
    pub pretty: bool,

    /// Also write JSON lines to daily files in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig::with_home_dir(&self.home)
            .with_retention(RetentionPolicy::new(self.retention))
    }

    pub fn syslog_config(&self) -> SyslogConfig {
        SyslogConfig::default().with_port(self.syslog_port)
    }

    pub fn log_config(&self) -> LogConfig {
        let mut config = match &self.log_dir {
            Some(dir) => LogConfig::production(dir.clone()),
            None => LogConfig::default(),
        };
        if self.pretty {
            config.console = LogConfig::development().console;
        }
        config.default_level = self.log_level.clone();
        config
    }
}
