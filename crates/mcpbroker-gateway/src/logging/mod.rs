//! Logging setup
//!
//! - `EnvFilter` from `RUST_LOG`, falling back to `info` plus crate directives
//! - Console output
//! - Optional daily-rolling file output (non-blocking)
//! - Trace IDs for request correlation

mod trace_context;

pub use trace_context::{generate_trace_id, RequestSpan, TraceContext};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "mcpbroker.log";

fn default_filter() -> EnvFilter {
    EnvFilter::new("info,mcpbroker_gateway=debug,mcpbroker_storage=info,tower_http=info,hyper=warn")
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must live as long
/// as the process.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let console_layer = fmt::layer()
        .with_target(true)
        .with_ansi(true)
        .compact();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(dir) = log_dir {
        tracing::info!("[Gateway] Writing logs to {}", dir.display());
    }
    guard
}
