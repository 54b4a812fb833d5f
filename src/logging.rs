//! Logging initialization.
//!
//! Follows the teacher's `logging.rs`: a thin wrapper around `env_logger`
//! plus small helpers so call sites don't have to import `log` macros
//! directly everywhere.

use log::{debug, error, info, log_enabled, warn, Level};

/// Initializes the logger with the `env_logger` crate.
///
/// Respects `RUST_LOG`; `--debug` on the CLI additionally forces the
/// default filter to `debug` when the environment variable is unset.
pub fn init_logger(debug: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if debug && std::env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp_millis().init();
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}
