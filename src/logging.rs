//! Logging setup for the authentication manager and its embedders.
//!
//! Output is pretty-printed when stderr is a terminal and JSON otherwise
//! (or when forced), on the assumption that non-terminal stderr means a CI
//! runner or log collector. The level filter is driven by the `logs.level`
//! configuration key.

use anyhow::{anyhow, Context, Result};
use atty::{self, Stream};
use slog::{o, Drain, FnValue, LevelFilter, Logger};
use slog_json::Json;
use slog_scope::GlobalLoggerGuard;
use slog_term::{FullFormat, PlainSyncDecorator, TermDecorator, TestStdoutWriter};
use std::{
    io::{stderr, Stderr},
    str::FromStr,
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// Options for configuring logging in this crate and the tool embedding it.
pub struct LoggingConfiguration<'a> {
    /// If true, output is forced to JSON format regardless of whether
    /// stderr is a terminal.
    pub force_json_output: bool,
    /// A version string attached to all log messages.
    pub version_string: &'a str,
    /// Messages above this level are discarded. This is the `logs.level`
    /// configuration value.
    pub log_level: &'a str,
}

/// A supertrait that lets us work generically with the `slog::Drain`
/// implementations we choose between.
trait IoErrorDrain: Drain<Ok = (), Err = std::io::Error> + Send {}

impl IoErrorDrain for Json<Stderr> {}
impl IoErrorDrain for FullFormat<TermDecorator> {}

/// Initialize logging resources. On success, returns a root
/// [`slog::Logger`] from which components create child loggers, and a
/// [`GlobalLoggerGuard`] the caller must keep live. The global registration
/// also bridges the `log` crate (used by the keyring backend) and `tracing`
/// events from dependencies into the same drain.
pub fn setup_logging(config: &LoggingConfiguration) -> Result<(Logger, GlobalLoggerGuard)> {
    let json_output = atty::isnt(Stream::Stderr) || config.force_json_output;

    // Box the drain so both branches are the same type.
    let drain: Box<dyn IoErrorDrain> = if json_output {
        let json_drain = Json::new(stderr())
            .set_newlines(true)
            .add_default_keys()
            .build();
        Box::new(json_drain)
    } else {
        let decorator = TermDecorator::new().stderr().build();
        Box::new(FullFormat::new(decorator).build())
    };

    let log_level = slog::Level::from_str(config.log_level)
        .map_err(|_| anyhow!("{} is not a valid log level", config.log_level))?;
    let level_filter = LevelFilter::new(drain, log_level);

    // slog_async makes it safe to clone loggers across threads, which the
    // store's blocking keyring workers rely on.
    let drain = slog_async::Async::new(level_filter.fuse()).build().fuse();
    let root_logger = Logger::root(
        drain,
        o!(
            "version" => config.version_string.to_owned(),
            "module_path" => FnValue(|record| {
                record.module()
            }),
        ),
    );

    let scope_guard = slog_scope::set_global_logger(root_logger.clone());
    slog_stdlog::init().context("failed to initialize slog as log backend")?;

    // Route tracing events from dependencies like tokio into a subscriber
    // configured alongside.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(true);

    let fmt_layer: Box<dyn tracing_subscriber::layer::Layer<_> + Send + Sync> = if json_output {
        Box::new(fmt_layer.json())
    } else {
        Box::new(fmt_layer.pretty())
    };

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    Ok((root_logger, scope_guard))
}

/// Logging for unit and integration tests: synchronous, to stdout, so
/// output interleaves correctly with test harness captures.
pub fn setup_test_logging() -> Logger {
    let decorator = PlainSyncDecorator::new(TestStdoutWriter);
    let drain = FullFormat::new(decorator).build().fuse();
    Logger::root(drain, o!())
}
