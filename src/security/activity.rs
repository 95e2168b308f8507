//! Backend activity bookkeeping.
//!
//! Every proxied request, streamed chunk and relayed WebSocket frame counts
//! as activity. An idle-shutdown collaborator reads it back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::observability::metrics;

/// Receives "the backend was just used" notifications.
pub trait ActivitySink: Send + Sync {
    fn record_activity(&self);
}

/// Keeps the time of the most recent activity.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    last_millis: AtomicU64,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Milliseconds since the Unix epoch of the last activity, if any.
    pub fn last_activity(&self) -> Option<u64> {
        match self.last_millis.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(millis),
        }
    }
}

impl ActivitySink for ActivityTracker {
    fn record_activity(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1);
        self.last_millis.fetch_max(now, Ordering::Relaxed);
        metrics::record_backend_activity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_timestamp() {
        let tracker = ActivityTracker::new();
        assert_eq!(tracker.last_activity(), None);
        tracker.record_activity();
        assert!(tracker.last_activity().is_some());
    }
}
