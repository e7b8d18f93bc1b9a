//! Logging setup: stderr plus a per-run log file.
//!
//! Log files older than a week are removed at startup. The tail of the
//! current file can be read back for bug reports.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wsync_core::{Result, WsyncError};

const MAX_LOG_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const TAIL_LINES: usize = 1000;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG` when set; otherwise wsync crates log at
/// `debug` in debug builds and `info` in release builds.
///
/// # Returns
///
/// The guard flushing the file writer; keep it alive for the whole run.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;
    cleanup(log_dir, MAX_LOG_AGE);

    let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let log_path = log_dir.join(format!("wsync_{timestamp}.log"));
    LOG_PATH
        .set(log_path.clone())
        .map_err(|_| WsyncError::internal("logging already initialized"))?;

    let file = File::create(&log_path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("wsync_core=debug,wsync_application=debug,wsync_infrastructure=debug")
        } else {
            EnvFilter::new("wsync_core=info,wsync_application=info,wsync_infrastructure=info")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .map_err(|e| WsyncError::internal(format!("Failed to install subscriber: {}", e)))?;

    tracing::info!("[Logging] Writing to {}", log_path.display());
    Ok(guard)
}

/// The last lines of the current log file, or an empty string before `init`.
pub fn tail() -> String {
    LOG_PATH
        .get()
        .map(|path| tail_file(path, TAIL_LINES))
        .unwrap_or_default()
}

fn tail_file(path: &Path, count: usize) -> String {
    let Ok(file) = File::open(path) else {
        return String::new();
    };
    let lines: Vec<String> = BufReader::new(file).lines().map_while(std::io::Result::ok).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// Removes files in `log_dir` last modified more than `max_age` ago.
fn cleanup(log_dir: &Path, max_age: Duration) {
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    for entry in entries.flatten() {
        if let Ok(meta) = entry.metadata()
            && meta.is_file()
            && let Ok(modified) = meta.modified()
            && modified < cutoff
        {
            let _ = fs::remove_file(entry.path());
        }
    }
}
