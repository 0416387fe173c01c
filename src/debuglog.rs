//! Debug trace setup.
//!
//! `SecDebugLogLevel` runs from 0 (silent) to 9 (everything). The engine
//! itself only emits `tracing` events; this module turns the configured
//! level and `SecDebugLog` path into a global subscriber.

use crate::engine::config::EngineConfig;
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;

/// Map a debug level (0-9) to a tracing level filter.
pub fn level_filter(level: u8) -> LevelFilter {
    match level {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        4 | 5 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Open the debug log for appending.
pub fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::RuleFileLoad {
            path: path.to_path_buf(),
            source,
        })
}

/// Install the debug log subscriber described by `config`.
///
/// Returns `Ok(false)` when no debug log is configured, the level is 0, or
/// another global subscriber was already installed.
pub fn install(config: &EngineConfig) -> Result<bool> {
    let Some(path) = config.debug_log.as_deref() else {
        return Ok(false);
    };
    let filter = level_filter(config.debug_log_level);
    if filter == LevelFilter::OFF {
        return Ok(false);
    }
    let file = open_log(path)?;

    let installed = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .try_init()
        .is_ok();
    if !installed {
        tracing::debug!(path = %path.display(), "subscriber already set, debug log not installed");
    }
    Ok(installed)
}
