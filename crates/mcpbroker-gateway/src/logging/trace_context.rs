//! Trace Context - Request correlation
//!
//! Each request gets a short trace id; entry and exit are logged as one
//! line each inside a `request` span.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{info, info_span, Span};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Short unique trace id: 6 hex characters
pub fn generate_trace_id() -> String {
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);

    format!("{:06x}", counter.wrapping_add(timestamp) & 0xFFFFFF)
}

#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub method: String,
    /// Path with any sensitive query already stripped
    pub path: String,
    pub user_id: Option<String>,
    pub started_at: Instant,
}

impl TraceContext {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            trace_id: generate_trace_id(),
            method: method.to_string(),
            path: path.to_string(),
            user_id: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// First 12 chars of the user id, or "anon"
    pub fn short_user(&self) -> &str {
        self.user_id
            .as_deref()
            .map(|u| &u[..u.len().min(12)])
            .unwrap_or("anon")
    }
}

pub struct RequestSpan;

impl RequestSpan {
    pub fn enter(ctx: &TraceContext) -> Span {
        info_span!(
            "request",
            trace_id = %ctx.trace_id,
            method = %ctx.method,
        )
    }

    pub fn log_entry(ctx: &TraceContext) {
        info!(
            trace_id = %ctx.trace_id,
            "→ {} {} user={}",
            ctx.method,
            ctx.path,
            ctx.short_user()
        );
    }

    pub fn log_exit(ctx: &TraceContext, status: u16) {
        info!(
            trace_id = %ctx.trace_id,
            "← {} ({}ms)",
            status,
            ctx.elapsed_ms()
        );
    }
}
