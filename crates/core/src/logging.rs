//! Logging setup: daily-rolling file appender plus a stderr layer, with a
//! `log`-crate bridge for dependencies that still emit through `log` rather
//! than `tracing`, and an `EnvFilter` driven by `BOUT_LOG_LEVEL`.
//!
//! Out of scope as a feature to design (per the pipeline's scope), but still
//! built on the same `tracing`/`tracing-subscriber`/`tracing-appender`
//! stack as the rest of the ambient machinery, not `eprintln!`.

use std::path::Path;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;

/// Parses a `BOUT_LOG_LEVEL` value into a `tracing::Level`.
pub fn parse_log_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Deletes log files under `log_dir` older than `retention_days`.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u64) {
    let cutoff = match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs().saturating_sub(retention_days * 24 * 60 * 60),
        Err(_) => return,
    };

    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else { continue };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else { continue };
        let Ok(age) = modified.duration_since(std::time::UNIX_EPOCH) else { continue };
        if age.as_secs() < cutoff {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(file = ?entry.path(), error = %e, "failed to remove old log file");
            }
        }
    }
}

/// Initializes logging for the CLI: a daily-rolling file layer under
/// `log_dir` plus a stderr layer, an `EnvFilter` seeded from `level`
/// (falling back to `RUST_LOG`), and a bridge for `log`-crate output from
/// dependencies. Prunes logs older than a week on startup.
pub fn init_cli_logging(log_dir: &Path, level: Level) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    cleanup_old_logs(log_dir, DEFAULT_LOG_RETENTION_DAYS);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("bout={level}")));

    let file_appender = tracing_appender::rolling::daily(log_dir, "bout.log");
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .boxed();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_line_number(false)
        .with_file(false)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    let _ = tracing_log::LogTracer::init();

    Ok(())
}

/// Initializes logging for tests: stderr-only, captured by the test
/// harness, defaulting to `debug` when `RUST_LOG` is unset.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bout=debug")))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_log_level("trace"), Some(Level::TRACE));
        assert_eq!(parse_log_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_log_level("info"), Some(Level::INFO));
        assert_eq!(parse_log_level("warn"), Some(Level::WARN));
        assert_eq!(parse_log_level("warning"), Some(Level::WARN));
        assert_eq!(parse_log_level("error"), Some(Level::ERROR));
    }

    #[test]
    fn rejects_unknown_level() {
        assert_eq!(parse_log_level("verbose"), None);
    }

    #[test]
    fn cleanup_does_not_panic_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        cleanup_old_logs(dir.path(), 7);
    }
}
