//! Process runner shared by the relay binaries.
//!
//! A [`Runner`] owns one cancellation token and drives a set of app processes
//! (the TCP listener, the periodic publisher, ...) until one of them fails,
//! all of them finish, or the host asks the service to stop (SIGINT/SIGTERM).
//! Closers run afterwards with a bounded timeout.
//!
//! # Example
//!
//! ```no_run
//! use relay_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_app_process(|ctx| async move {
//!             ctx.cancelled().await;
//!             tracing::info!("listener stopped");
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("flushing record files");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Boxed long-running process. Receives the runner's cancellation token.
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

/// Boxed cleanup step executed once every app process has stopped.
pub type Closer = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

/// How a [`Runner`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every process returned `Ok` or a shutdown signal was handled.
    Completed,
    /// At least one process returned an error or panicked.
    Failed,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Failed => 1,
        }
    }
}

pub struct Runner {
    app_processes: Vec<AppProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with a 10 second closer timeout and signal handling enabled.
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Adds a process. If any process fails, the others are cancelled.
    pub fn with_app_process<F, Fut>(mut self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.app_processes
            .push(Box::new(|token| Box::pin(process(token))));
        self
    }

    /// Adds an already boxed process, as produced by the service modules.
    pub fn with_boxed_process(mut self, process: AppProcess) -> Self {
        self.app_processes.push(process);
        self
    }

    /// Adds a closer. Closers run concurrently after all processes stopped,
    /// whatever the reason; a failing closer does not stop the others.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Uses an externally owned token, so callers (and tests) can stop the runner.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Disables the SIGINT/SIGTERM handlers. Tests drive shutdown through the token.
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Runs to completion and exits the process with the outcome's exit code.
    pub async fn run(self) {
        let outcome = self.run_until_stopped().await;
        match outcome {
            RunOutcome::Completed => tracing::info!("relay exiting normally"),
            RunOutcome::Failed => tracing::error!("relay exiting with error"),
        }
        std::process::exit(outcome.exit_code());
    }

    /// Runs all processes, then all closers, and reports how it went.
    pub async fn run_until_stopped(self) -> RunOutcome {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for process in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move { process(process_token).await });
        }

        if self.handle_signals {
            spawn_signal_handlers(token.clone());
        }

        let mut failed = false;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(())) => {
                    tracing::debug!("app process completed");
                }
                Ok(Err(err)) => {
                    tracing::error!(error = %format!("{err:#}"), "app process failed");
                    failed = true;
                    token.cancel();
                }
                Err(err) => {
                    tracing::error!(error = %err, "app process panicked");
                    failed = true;
                    token.cancel();
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        // Let cancelled processes observe the token before they are aborted.
        while let Ok(Some(result)) =
            tokio::time::timeout(self.closer_timeout, join_set.join_next()).await
        {
            if let Ok(Err(err)) = result {
                tracing::warn!(error = %format!("{err:#}"), "app process failed during shutdown");
            }
        }
        join_set.shutdown().await;

        if !self.closers.is_empty() {
            tracing::info!(timeout = ?self.closer_timeout, "running closers");
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => tracing::info!("all closers completed"),
                Err(_) => tracing::error!(timeout = ?self.closer_timeout, "closers timed out"),
            }
        }

        if failed {
            RunOutcome::Failed
        } else {
            RunOutcome::Completed
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install ctrl-c handler");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received SIGTERM");
                token.cancel();
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("closer completed"),
            Ok(Err(err)) => tracing::error!(error = %format!("{err:#}"), "closer failed"),
            Err(err) => tracing::error!(error = %err, "closer panicked"),
        }
    }
}
