//! Structured logging setup, mirroring the teacher's
//! env-filter + fmt (+ optional json) layering.

use tracing_subscriber::{EnvFilter, fmt};

/// Output format for the process-wide log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` (or `MEDIACAT_LOG`) takes precedence over `default_level` when
/// set. Safe to call once per process; a second call is a no-op failure that
/// is deliberately swallowed so tests can call it repeatedly.
pub fn init_logging(format: LogFormat, default_level: &str) {
    let filter = std::env::var("MEDIACAT_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = fmt().with_env_filter(filter);

    let result = match format {
        LogFormat::Plain => subscriber.try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    };

    if let Err(e) = result {
        tracing::trace!("tracing subscriber already initialized: {e}");
    }
}
