//! Log setup: stderr plus one timestamped file per run.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// `logs/pose_osc_20250101_120000.log`
pub fn log_file_path(directory: &Path, prefix: &str) -> PathBuf {
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    directory.join(format!("{}_{}.log", prefix, ts))
}

fn open_log_file(directory: &str, prefix: &str) -> Result<(File, PathBuf)> {
    let dir = Path::new(directory);
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let path = log_file_path(dir, prefix);
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    Ok((file, path))
}

/// Installs the global subscriber. Returns the log file path when file
/// output is enabled. `RUST_LOG` overrides the configured level.
pub fn init(config: &LogConfig, prefix: &str) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log level")?;

    let (file_layer, path) = if config.directory.is_empty() {
        (None, None)
    } else {
        let (file, path) = open_log_file(&config.directory, prefix)?;
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file));
        (Some(layer), Some(path))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(path)
}
