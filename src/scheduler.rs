//! Staggered launch of one worker per provisioned account.

use rand::Rng;
use rand::rngs::StdRng;
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::Invocation;
use crate::config::{LaunchFailurePolicy, RunConfig};
use crate::error::{LaunchFailure, OrchestratorResult};
use crate::jitter::Jitter;
use crate::process::{ExitOutcome, Launcher, WorkerProcess};
use crate::selector::assign;
use crate::types::{Account, AccountSet, Endpoint};

/// A launched worker: which account it sends from, where to, and the
/// process running it.
pub struct WorkerHandle {
    /// Position of the account in the account set
    pub index: usize,
    pub account: Account,
    pub endpoint: Endpoint,
    pid: Option<u32>,
    process: Box<dyn WorkerProcess>,
}

impl WorkerHandle {
    pub fn new(
        index: usize,
        account: Account,
        endpoint: Endpoint,
        process: Box<dyn WorkerProcess>,
    ) -> Self {
        Self {
            index,
            account,
            endpoint,
            pid: process.id(),
            process,
        }
    }

    /// OS process id recorded at launch.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub async fn wait(&mut self) -> io::Result<ExitOutcome> {
        self.process.wait().await
    }

    /// Kill the worker and reap it.
    pub async fn terminate(&mut self) -> io::Result<()> {
        self.process.kill().await
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("index", &self.index)
            .field("account", &self.account)
            .field("endpoint", &self.endpoint)
            .field("pid", &self.pid)
            .finish()
    }
}

/// Result of the launch phase.
#[derive(Debug, Default)]
pub struct LaunchReport {
    /// Launched workers, in launch order.
    pub handles: Vec<WorkerHandle>,
    /// Workers that failed to start and were skipped.
    pub failures: Vec<LaunchFailure>,
    /// Launching stopped early because the run was cancelled.
    pub cancelled: bool,
}

pub struct WorkerScheduler<'a, R = StdRng> {
    config: &'a RunConfig,
    launcher: &'a dyn Launcher,
    jitter: Jitter<R>,
}

impl<'a, R: Rng> WorkerScheduler<'a, R> {
    pub fn new(config: &'a RunConfig, launcher: &'a dyn Launcher, jitter: Jitter<R>) -> Self {
        Self {
            config,
            launcher,
            jitter,
        }
    }

    /// Launch one batch worker per account, in account order, sleeping a
    /// jittered delay before every launch but the first.
    ///
    /// Under [`LaunchFailurePolicy::Abort`] the first launch failure
    /// terminates the workers started so far and is returned as an error.
    /// Cancellation stops further launches; the workers already started are
    /// returned so they can be supervised to exit.
    pub async fn launch_all(
        &mut self,
        accounts: &AccountSet,
        cancel: &CancellationToken,
    ) -> OrchestratorResult<LaunchReport> {
        let mut report = LaunchReport::default();
        info!(
            workers = accounts.len(),
            endpoints = self.config.endpoints.len(),
            "Launching workers"
        );

        for assignment in assign(&self.config.endpoints, accounts) {
            if assignment.index > 0 {
                let delay = self.jitter.next_delay();
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => {}
                    }
                }
            }
            if cancel.is_cancelled() {
                warn!(
                    launched = report.handles.len(),
                    remaining = accounts.len() - assignment.index,
                    "Cancelled while launching, no further workers will start"
                );
                report.cancelled = true;
                break;
            }

            let invocation =
                Invocation::batch(self.config, assignment.endpoint, assignment.account);
            match self.launcher.spawn(&invocation) {
                Ok(process) => {
                    let handle = WorkerHandle::new(
                        assignment.index,
                        assignment.account.clone(),
                        assignment.endpoint.clone(),
                        process,
                    );
                    debug!(
                        worker = handle.index,
                        pid = ?handle.pid(),
                        endpoint = %handle.endpoint,
                        sender = %handle.account,
                        "Worker launched"
                    );
                    report.handles.push(handle);
                }
                Err(source) => {
                    let failure = LaunchFailure {
                        index: assignment.index,
                        endpoint: assignment.endpoint.clone(),
                        source,
                    };
                    error!("{}", failure);
                    match self.config.launch_failure_policy {
                        LaunchFailurePolicy::Skip => report.failures.push(failure),
                        LaunchFailurePolicy::Abort => {
                            terminate_all(&mut report.handles).await;
                            return Err(failure.into());
                        }
                    }
                }
            }
        }

        info!(
            launched = report.handles.len(),
            failed = report.failures.len(),
            "Launch phase finished"
        );
        Ok(report)
    }
}

/// Kill and reap every handle.
pub async fn terminate_all(handles: &mut [WorkerHandle]) {
    for handle in handles.iter_mut() {
        if let Err(e) = handle.terminate().await {
            warn!(worker = handle.index, "Failed to terminate worker: {}", e);
        }
    }
}
