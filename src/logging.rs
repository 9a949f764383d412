//! Tracing setup: human-readable stderr plus a daily rolling log file.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log file name prefix inside the logs directory.
pub const LOG_FILE_PREFIX: &str = "scopist.log";

/// Default stderr filter for a verbosity level. `RUST_LOG` overrides it.
#[must_use]
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "scopist=debug,scopist_search=debug,info"
    } else {
        "scopist=info,scopist_search=info,warn"
    }
}

/// Install the global subscriber.
///
/// The file layer always records at `debug`. Keep the returned guard alive
/// for the life of the process, or buffered lines are lost on exit. When
/// the log directory cannot be created, only the stderr layer is installed.
pub fn init(log_dir: &Path, verbose: bool) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose))),
        );

    let (file_layer, guard) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new("scopist=debug,scopist_search=debug,info"));
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("warning: cannot create log directory {}: {e}", log_dir.display());
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}
