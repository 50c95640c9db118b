use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
///
/// Noisy third-party crates:
///   reqwest, hyper  HTTP client internals
///   mio             async I/O polling
///   tungstenite     per-frame WebSocket chatter
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,mio=warn,tungstenite=warn,tokio_tungstenite=warn";

/// Initialize structured logging.
///
/// Sets up:
/// - File output: `{log_dir}/dialog.log`, rotated daily, keeping the latest 5 files.
/// - Console output (stderr): compact, human-readable. The conversation
///   itself is logged under the `dialog` target.
/// - Environment filter: `RUST_LOG`, defaulting to [`DEFAULT_FILTER`].
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the life of the process. Fails if a global subscriber is already set.
pub fn try_init(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("dialog")
        .filename_suffix("log")
        .max_log_files(5)
        .build(log_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .compact();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(log_dir = %log_dir.display(), "Logger initialized");
    Ok(guard)
}

/// Console-only logging, for when the log directory is unusable.
pub fn init_console() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
