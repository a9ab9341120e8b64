use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Overrides the configured level with a full filter directive.
pub const FILTER_ENV: &str = "FEDI_TUI_LOG";

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

/// Installs the global subscriber. The terminal belongs to the UI, so
/// nothing is installed unless a log file is configured. Keep the returned
/// guard alive until exit or buffered lines are lost.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, InitError> {
    let Some(path) = config.file.clone() else {
        return Ok(None);
    };

    let filter = build_filter(&config.level)?;
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| InitError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| InitError::Io { path, source })?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_level(true)
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| InitError::Configure(err.to_string()))?;
    Ok(Some(guard))
}

fn build_filter(level: &str) -> Result<EnvFilter, InitError> {
    let directive = std::env::var(FILTER_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_directive(level));
    EnvFilter::try_new(&directive).map_err(|err| InitError::Filter {
        filter: directive,
        reason: err.to_string(),
    })
}

/// Our own crate logs at `level`; chatty HTTP internals stay at warn.
fn default_directive(level: &str) -> String {
    let level = match level.trim().to_ascii_lowercase().as_str() {
        "" => "info".to_string(),
        other => other.to_string(),
    };
    format!("warn,fedi_tui={level}")
}
