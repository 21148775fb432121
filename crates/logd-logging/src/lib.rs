//! Structured logging setup for logd
//!
//! This crate installs the global `tracing` subscriber used by the logd
//! daemon and its tests.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines on the console (default)
//! - **Pretty Output**: Human-readable console output for development
//! - **File Output**: Daily/hourly/never rotation via tracing-appender
//! - **Filtering**: `RUST_LOG` overrides the configured default level
//!
//! # Quick Start
//!
//! ```ignore
//! use logd_logging::{LogConfig, LogdSubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = LogdSubscriberBuilder::new().init()?;
//!
//! // Development mode with pretty human-readable output
//! let _guard = LogdSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```

pub mod config;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors that can occur while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A level or target directive could not be parsed
    #[error("Invalid filter directive: {0}")]
    InvalidDirective(String),

    /// The log file or directory could not be created
    #[error("Failed to open log file: {0}")]
    File(String),

    /// A global subscriber is already installed
    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// Builder for configuring and initializing the logd logging subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
pub struct LogdSubscriberBuilder {
    config: LogConfig,
}

impl LogdSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    ///
    /// Default: JSONL output to console
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Use pretty console output instead of JSONL
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.config.console.pretty = pretty;
        self.config.console.ansi = pretty;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Initialize the subscriber globally
    ///
    /// Returns the file writer guard when file output is enabled; keep it
    /// alive for the duration of the program so buffered lines are flushed.
    /// Fails with [`LoggingError::AlreadyInitialized`] when a global
    /// subscriber has already been set.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = self.env_filter()?;
        let jsonl = &self.config.jsonl;

        let (file_writer, guard) = match &self.config.file {
            Some(file_config) => {
                let (writer, guard) = create_file_writer(file_config)?;
                (Some(writer), Some(guard))
            }
            None => (None, None),
        };

        let console = &self.config.console;
        let pretty_layer = (console.enabled && console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
                .with_thread_ids(jsonl.include_thread_info)
        });

        let console_json_layer = (console.enabled && !console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(jsonl.include_current_span)
                .with_span_list(jsonl.include_spans)
                .flatten_event(jsonl.flatten_events)
                .with_thread_ids(jsonl.include_thread_info)
                .with_file(jsonl.include_location)
                .with_line_number(jsonl.include_location)
        });

        // Files always get JSONL regardless of console format
        let file_layer = file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(jsonl.include_current_span)
                .with_span_list(jsonl.include_spans)
                .flatten_event(jsonl.flatten_events)
                .with_thread_ids(jsonl.include_thread_info)
                .with_file(jsonl.include_location)
                .with_line_number(jsonl.include_location)
                .with_writer(writer)
        });

        Registry::default()
            .with(env_filter)
            .with(pretty_layer)
            .with(console_json_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        let mut filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.default_level)
                .map_err(|e| LoggingError::InvalidDirective(e.to_string()))?,
        };
        for directive in self.config.target_directives() {
            let parsed = directive
                .parse()
                .map_err(|e| LoggingError::InvalidDirective(format!("{}: {}", directive, e)))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

impl Default for LogdSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the non-blocking file writer; truncates for `Never`, appends otherwise
fn create_file_writer(file_config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&file_config.directory).map_err(|e| LoggingError::File(e.to_string()))?;

    let rotation = match file_config.rotation {
        RotationStrategy::Never => {
            let file = File::create(file_config.single_file_path())
                .map_err(|e| LoggingError::File(e.to_string()))?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&file_config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = file_config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder
        .build(&file_config.directory)
        .map_err(|e| LoggingError::File(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging for testing (minimal output)
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_testing() {
    let _ = LogdSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
