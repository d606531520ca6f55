//! One load run, from provisioning to the last worker's exit.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::{LaunchFailure, OrchestratorError, OrchestratorResult};
use crate::jitter::Jitter;
use crate::process::Launcher;
use crate::provisioner::AccountProvisioner;
use crate::scheduler::WorkerScheduler;
use crate::supervisor::{RunSummary, RunSupervisor};

/// Phase of a run. `Completed` and `Failed` are terminal.
///
/// An interrupt after the first worker has started still ends in
/// `Completed`: every launched worker has been reaped by then. Accounts left
/// without a worker and terminated workers show up in
/// [`RunReport::cancelled`] and the [`RunSummary`], not in the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Provisioning,
    Settling,
    Launching,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (NotStarted, Provisioning)
                | (Provisioning, Settling)
                | (Settling, Launching)
                | (Launching, Running)
                | (Running, Completed)
                | (Provisioning, Failed)
                | (Settling, Failed)
                | (Launching, Failed)
        )
    }
}

/// What a finished run reports.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Accounts provisioned, one worker each.
    pub accounts: usize,
    /// Workers skipped because they could not be started.
    pub launch_failures: Vec<LaunchFailure>,
    pub summary: RunSummary,
    /// The run was interrupted; unfinished workers were terminated.
    pub cancelled: bool,
}

impl RunReport {
    /// Turn the report into an error when `strict` is set and any worker
    /// failed to launch or exited unsuccessfully.
    pub fn check(self, strict: bool) -> OrchestratorResult<Self> {
        let failed = self.summary.failed() + self.launch_failures.len();
        if strict && failed > 0 {
            return Err(OrchestratorError::WorkersFailed {
                failed,
                total: self.accounts,
            });
        }
        Ok(self)
    }
}

pub struct Run<'a> {
    id: Uuid,
    config: &'a RunConfig,
    launcher: &'a dyn Launcher,
    cancel: CancellationToken,
    state: RunState,
    history: Vec<RunState>,
}

impl<'a> Run<'a> {
    pub fn new(
        config: &'a RunConfig,
        launcher: &'a dyn Launcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            launcher,
            cancel,
            state: RunState::NotStarted,
            history: vec![RunState::NotStarted],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Every state the run has been in, oldest first.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    fn advance(&mut self, next: RunState) {
        assert!(
            self.state.can_transition_to(next),
            "illegal run transition {:?} -> {:?}",
            self.state,
            next
        );
        info!(run_id = %self.id, from = ?self.state, to = ?next, "Run state changed");
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, err: OrchestratorError) -> OrchestratorError {
        error!(run_id = %self.id, "Run failed: {}", err);
        self.advance(RunState::Failed);
        err
    }

    /// Provision accounts, launch a worker per account, and wait for all of
    /// them to exit.
    ///
    /// A run executes once; calling this again returns
    /// [`OrchestratorError::AlreadyStarted`].
    pub async fn execute(&mut self) -> OrchestratorResult<RunReport> {
        if self.state != RunState::NotStarted {
            return Err(OrchestratorError::AlreadyStarted);
        }
        self.config.validate()?;

        let started_at = Utc::now();
        info!(
            run_id = %self.id,
            endpoints = self.config.endpoints.len(),
            accounts = self.config.accounts,
            "Starting load run"
        );

        let config = self.config;
        let launcher = self.launcher;
        let cancel = self.cancel.clone();
        let provisioner = AccountProvisioner::new(config, launcher);

        self.advance(RunState::Provisioning);
        if let Err(e) = provisioner.invoke(&cancel).await {
            return Err(self.fail(e));
        }

        self.advance(RunState::Settling);
        if let Err(e) = provisioner.settle(&cancel).await {
            return Err(self.fail(e));
        }
        let accounts = match provisioner.load().await {
            Ok(accounts) => accounts,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.advance(RunState::Launching);
        let mut scheduler = WorkerScheduler::new(config, launcher, Jitter::from_config(config));
        let launched = match scheduler.launch_all(&accounts, &cancel).await {
            Ok(launched) => launched,
            Err(e) => return Err(self.fail(e)),
        };

        self.advance(RunState::Running);
        let summary = RunSupervisor::await_completion(launched.handles, &cancel).await;

        self.advance(RunState::Completed);
        let cancelled = launched.cancelled || cancel.is_cancelled();
        if cancelled {
            warn!(run_id = %self.id, "Run was interrupted");
        }
        info!(
            run_id = %self.id,
            workers = summary.total(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            launch_failures = launched.failures.len(),
            "Run completed"
        );

        Ok(RunReport {
            run_id: self.id,
            started_at,
            finished_at: Utc::now(),
            accounts: accounts.len(),
            launch_failures: launched.failures,
            summary,
            cancelled,
        })
    }
}
