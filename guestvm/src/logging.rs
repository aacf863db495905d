//! Tracing subscriber setup for the `guestvm` binary.
//!
//! stderr always gets events filtered by `RUST_LOG` (default `warn`). When a
//! log directory is configured, a non-blocking file layer additionally
//! writes `guestvm.log` there, filtered by `RUST_LOG` or the configured
//! file filter. The library itself never installs a subscriber.

use crate::options::LoggingOptions;
use guestvm_shared::errors::{GuestVmError, GuestVmResult};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_NAME: &str = "guestvm.log";

/// Keeps the file writer flushing. Hold it until the process exits.
pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns [`GuestVmError::Config`] if the log directory cannot be created,
/// the file filter does not parse, or a subscriber is already installed.
pub fn init_logging(options: &LoggingOptions) -> GuestVmResult<LogGuard> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter_or("warn")?);

    let (file_layer, file_guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                GuestVmError::Config(format!(
                    "cannot create log directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter_or(&options.file_filter)?);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| GuestVmError::Config(format!("tracing subscriber: {}", e)))?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

fn env_filter_or(default: &str) -> GuestVmResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default).map_err(|e| {
            GuestVmError::Config(format!("invalid log filter {:?}: {}", default, e))
        }),
    }
}
