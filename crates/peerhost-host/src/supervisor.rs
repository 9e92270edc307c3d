//! Idle and duration supervision: stops a host that has outlived its
//! welcome.
//!
//! A periodic poll (not event-driven) compares elapsed time since the last
//! heartbeat against the configured idle timeout, and elapsed time since
//! start against the configured duration. Either breach triggers shutdown
//! through a watch channel.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::info;

/// Default poll interval in seconds.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Why the supervisor decided to stop the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No heartbeat within the idle timeout.
    Idle,
    /// Total runtime exceeded the configured duration.
    Expired,
}

/// Supervision thresholds. `None` disables the corresponding check.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisionConfig {
    /// Stop after this many seconds without a heartbeat.
    pub timeout_secs: Option<u64>,
    /// Stop after this many seconds of total runtime.
    pub duration_secs: Option<u64>,
}

/// Evaluate the thresholds at a point in time.
///
/// Pure; the host runs this from its background poll.
pub fn check(
    config: &SupervisionConfig,
    started: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<StopReason> {
    if let Some(timeout) = config.timeout_secs {
        if (now - last_heartbeat).num_seconds() >= timeout as i64 {
            return Some(StopReason::Idle);
        }
    }
    if let Some(duration) = config.duration_secs {
        if (now - started).num_seconds() >= duration as i64 {
            return Some(StopReason::Expired);
        }
    }
    None
}

/// Shutdown signal shared between the host, the transport, and the CLI.
pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    /// Create a supervisor with the shutdown flag unset.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Trigger shutdown. Serving stops non-gracefully: in-flight
    /// connections are dropped, not drained.
    pub fn shutdown(&self) {
        info!("Supervisor: initiating shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_no_thresholds_never_stops() {
        let now = Utc::now();
        let long_ago = now - Duration::hours(48);
        assert_eq!(check(&SupervisionConfig::default(), long_ago, long_ago, now), None);
    }

    #[test]
    fn test_idle_timeout() {
        let config = SupervisionConfig {
            timeout_secs: Some(60),
            duration_secs: None,
        };
        let now = Utc::now();
        let started = now - Duration::seconds(300);

        assert_eq!(check(&config, started, now - Duration::seconds(10), now), None);
        assert_eq!(
            check(&config, started, now - Duration::seconds(61), now),
            Some(StopReason::Idle)
        );
    }

    #[test]
    fn test_duration_limit() {
        let config = SupervisionConfig {
            timeout_secs: None,
            duration_secs: Some(120),
        };
        let now = Utc::now();

        assert_eq!(check(&config, now - Duration::seconds(100), now, now), None);
        assert_eq!(
            check(&config, now - Duration::seconds(121), now, now),
            Some(StopReason::Expired)
        );
    }

    #[test]
    fn test_idle_reported_before_duration() {
        let config = SupervisionConfig {
            timeout_secs: Some(60),
            duration_secs: Some(60),
        };
        let now = Utc::now();
        let past = now - Duration::seconds(120);
        assert_eq!(check(&config, past, past, now), Some(StopReason::Idle));
    }

    #[test]
    fn test_supervisor_flag() {
        let supervisor = Supervisor::new();
        assert!(!supervisor.is_shutting_down());
        supervisor.shutdown();
        assert!(supervisor.is_shutting_down());
        assert!(*supervisor.subscribe().borrow());
    }
}
