//! Process-termination hook.
//!
//! Abnormal termination cannot be handled by ordinary cleanup code: when the
//! worker process receives an exit request mid-job, no call stack unwinds
//! through the tracker. The hook installed here listens for termination
//! signals process-wide and best-effort marks every running job
//! `interrupted` before teardown. The write is attempted, never guaranteed:
//! if the store is unreachable at that moment the process still dies and the
//! records stay `working` until their TTL clears them.

use crate::tracker::StatusTracker;
use once_cell::sync::OnceCell;
use tokio::sync::broadcast;
use tracing::{info, warn};

static HOOK: OnceCell<Hook> = OnceCell::new();

#[cfg(unix)]
async fn termination_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Signal handler registration failed");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl-c",
        Err(e) => {
            warn!(error = %e, "Signal handler registration failed");
            std::future::pending().await
        }
    }
}

/// Handle to the installed termination hook.
#[derive(Debug, Clone)]
pub struct Hook {
    fire: broadcast::Sender<()>,
}

impl Hook {
    fn spawn(tracker: StatusTracker) -> Self {
        let (fire, mut fired) = broadcast::channel(1);

        tokio::spawn(async move {
            let reason = tokio::select! {
                reason = termination_signal() => reason,
                _ = fired.recv() => "manual trigger",
            };
            info!(reason = %reason, "Termination requested, flushing running-job statuses");
            tracker.interrupt_running().await;
        });

        Self { fire }
    }

    /// Fire the hook as if a termination signal had been delivered.
    ///
    /// Returns immediately; the interrupt sweep runs on the hook's own task.
    /// Firing after the hook has already run is a no-op.
    pub fn trigger(&self) {
        let _ = self.fire.send(());
    }
}

/// Install the process-wide termination hook for `tracker`.
///
/// Spawns a listener for SIGTERM and SIGINT (ctrl-c on non-unix platforms),
/// so it must be called from within the runtime, once, at worker startup.
/// Later calls return the already-installed hook unchanged; the first
/// tracker wins.
pub fn install(tracker: StatusTracker) -> Hook {
    HOOK.get_or_init(|| Hook::spawn(tracker)).clone()
}
