//! Lifecycle of background work.
//!
//! The key ring refresher is the only long-lived task. It runs under a
//! [`ShutdownCoordinator`] so a termination signal stops it within a bound.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Owns background tasks and the flag that stops them
pub struct ShutdownCoordinator {
    stop: watch::Sender<bool>,
    tasks: JoinSet<&'static str>,
}

/// How a bounded shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that stopped on their own or on the stop flag
    pub drained: usize,
    /// Tasks still running at the deadline
    pub aborted: usize,
}

impl ShutdownCoordinator {
    /// Coordinator with no tasks
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop,
            tasks: JoinSet::new(),
        }
    }

    /// Handle that resolves once shutdown begins, even if subscribed late
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            stop: self.stop.subscribe(),
        }
    }

    /// Runs `future` until it finishes or shutdown begins
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let signal = self.subscribe();
        self.tasks.spawn(async move {
            tokio::select! {
                biased;
                () = future => info!(task = name, "Task finished"),
                () = signal.recv() => info!(task = name, "Task stopped"),
            }
            name
        });
    }

    /// Raises the stop flag and waits up to `timeout` for every task
    pub async fn shutdown(mut self, timeout: Duration) -> ShutdownReport {
        info!(tasks = self.tasks.len(), "Stopping background tasks");
        self.stop.send_replace(true);

        let mut drained = 0;
        let deadline = tokio::time::timeout(timeout, async {
            while let Some(joined) = self.tasks.join_next().await {
                drained += 1;
                if let Err(err) = joined {
                    warn!(error = %err, "Task panicked or was cancelled");
                }
            }
        })
        .await;

        let aborted = if deadline.is_err() {
            let remaining = self.tasks.len();
            warn!(remaining, ?timeout, "Deadline passed, aborting tasks");
            self.tasks.abort_all();
            remaining
        } else {
            0
        };

        info!(drained, aborted, "Background tasks stopped");
        ShutdownReport { drained, aborted }
    }

    /// Tasks still tracked
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("tasks", &self.tasks.len())
            .field("stopping", &*self.stop.borrow())
            .finish()
    }
}

/// Resolves when the coordinator starts shutting down
#[derive(Debug)]
pub struct ShutdownSignal {
    stop: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the stop flag; a dropped coordinator counts as stop
    pub async fn recv(mut self) {
        let _ = self.stop.wait_for(|stopping| *stopping).await;
    }
}

/// Process signal that ended the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
}

/// Blocks until the process is asked to stop.
///
/// A handler that cannot be installed never fires; the other one still does.
pub async fn wait_for_signal() -> TerminationSignal {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        () = interrupt => TerminationSignal::Interrupt,
        () = terminate => TerminationSignal::Terminate,
    };
    info!(signal = ?received, "Termination requested");
    received
}
