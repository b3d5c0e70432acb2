//! Cleanup Loop
//!
//! One background task per process that reaps pending authorizations and
//! outer auth requests older than the TTL.

use std::sync::Arc;
use std::time::Duration;

use mcpbroker_core::{AuthRequestRepository, PendingStateRepository};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Rows older than this are deleted
    pub ttl: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TTL,
            ttl: DEFAULT_TTL,
        }
    }
}

impl CleanupConfig {
    /// Interval fixed at the TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { interval: ttl, ttl }
    }
}

/// Counts from one cleanup pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub pending_states: usize,
    pub auth_requests: usize,
}

/// Run a single cleanup pass. Failures are logged, never returned.
pub async fn cleanup_once(
    pending: &dyn PendingStateRepository,
    requests: &dyn AuthRequestRepository,
    ttl: Duration,
) -> CleanupStats {
    let mut stats = CleanupStats::default();
    let ttl = match chrono::Duration::from_std(ttl) {
        Ok(ttl) => ttl,
        Err(e) => {
            warn!("[Cleanup] Invalid TTL {:?}: {}", ttl, e);
            return stats;
        }
    };

    match pending.cleanup(ttl).await {
        Ok(count) => stats.pending_states = count,
        Err(e) => warn!("[Cleanup] Failed to clean pending states: {:#}", e),
    }
    match requests.cleanup(ttl).await {
        Ok(count) => stats.auth_requests = count,
        Err(e) => warn!("[Cleanup] Failed to clean auth requests: {:#}", e),
    }

    if stats.pending_states > 0 || stats.auth_requests > 0 {
        info!(
            "[Cleanup] Removed {} pending state(s), {} auth request(s)",
            stats.pending_states, stats.auth_requests
        );
    } else {
        debug!("[Cleanup] Nothing to remove");
    }
    stats
}

/// Start the loop. It exits when `cancel` fires.
pub fn spawn_cleanup(
    pending: Arc<dyn PendingStateRepository>,
    requests: Arc<dyn AuthRequestRepository>,
    config: CleanupConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "[Cleanup] Started (interval {:?}, ttl {:?})",
            config.interval, config.ttl
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Cleanup] Stopped");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    cleanup_once(pending.as_ref(), requests.as_ref(), config.ttl).await;
                }
            }
        }
    })
}
