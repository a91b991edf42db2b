//! Daemon shutdown: signal handling and listener drain.
//!
//! One root [`CancellationToken`] sits above every connection token, and
//! each connection token sits above its request tokens. Triggering the root
//! stops the accept loop and cancels in-flight requests; each connection
//! flushes its `CANCELLED` replies before the listener task returns.

use std::time::{Duration, Instant};

use metrics::histogram;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long [`ShutdownCoordinator::drain`] waits for connections by default.
pub const DRAIN_GRACE: Duration = Duration::from_secs(30);

/// Signal that ended the daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT (Ctrl-C).
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl Signal {
    /// Conventional signal name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }
}

/// How the listener task ended during [`ShutdownCoordinator::drain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every connection finished within the grace period.
    Drained,
    /// The grace period ran out and the listener was aborted.
    TimedOut,
    /// The listener task panicked.
    Failed,
}

/// Owns the daemon's root cancellation token.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with an untriggered root token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token the accept loop watches and derives connection tokens from.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Cancel the root token. Repeated calls are no-ops.
    pub fn trigger(&self) {
        self.root.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Trigger shutdown and wait up to `grace` for the listener task to
    /// drain its connections. A listener still running after `grace` is
    /// aborted.
    pub async fn drain(&self, mut listener: JoinHandle<()>, grace: Duration) -> DrainOutcome {
        let started = Instant::now();
        self.trigger();
        info!(grace_ms = grace.as_millis(), "draining connections");

        let outcome = match tokio::time::timeout(grace, &mut listener).await {
            Ok(Ok(())) => DrainOutcome::Drained,
            Ok(Err(e)) => {
                error!(error = %e, "listener task failed during shutdown");
                DrainOutcome::Failed
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis(), "connections still open, aborting listener");
                listener.abort();
                DrainOutcome::TimedOut
            }
        };

        histogram!("daemon_shutdown_drain_seconds").record(started.elapsed().as_secs_f64());
        outcome
    }
}

/// Resolve when the process receives SIGINT or SIGTERM.
pub async fn wait_for_signal() -> std::io::Result<Signal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| Signal::Interrupt),
        _ = terminate.recv() => Ok(Signal::Terminate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_cascades_to_connection_and_request_tokens() {
        let coord = ShutdownCoordinator::new();
        let connection = coord.token().child_token();
        let request = connection.child_token();
        assert!(!coord.is_triggered());

        coord.trigger();
        coord.trigger();
        assert!(coord.is_triggered());
        assert!(connection.is_cancelled());
        assert!(request.is_cancelled());
    }

    #[test]
    fn closing_one_connection_leaves_daemon_running() {
        let coord = ShutdownCoordinator::new();
        let connection = coord.token().child_token();
        connection.cancel();
        assert!(!coord.is_triggered());
    }

    #[test]
    fn signal_names() {
        assert_eq!(Signal::Interrupt.as_str(), "SIGINT");
        assert_eq!(Signal::Terminate.as_str(), "SIGTERM");
    }

    #[tokio::test]
    async fn drain_waits_for_listener() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let listener = tokio::spawn(async move { token.cancelled().await });

        let outcome = coord.drain(listener, DRAIN_GRACE).await;
        assert_eq!(outcome, DrainOutcome::Drained);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_stuck_listener() {
        let coord = ShutdownCoordinator::new();
        let listener = tokio::spawn(tokio::time::sleep(Duration::from_secs(300)));

        let outcome = coord.drain(listener, Duration::from_millis(100)).await;
        assert_eq!(outcome, DrainOutcome::TimedOut);
        assert!(coord.is_triggered());
    }

    #[tokio::test]
    async fn drain_reports_panicked_listener() {
        let coord = ShutdownCoordinator::new();
        let listener = tokio::spawn(async { panic!("accept loop died") });

        let outcome = coord.drain(listener, DRAIN_GRACE).await;
        assert_eq!(outcome, DrainOutcome::Failed);
    }
}
