//! Waiting for every launched worker to exit.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::process::ExitOutcome;
use crate::scheduler::WorkerHandle;
use crate::types::Endpoint;

/// How a supervised worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Exited(ExitOutcome),
    /// Killed by the orchestrator after cancellation.
    Terminated,
    /// Its exit status could not be observed.
    Lost(String),
}

#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub index: usize,
    pub endpoint: Endpoint,
    pub pid: Option<u32>,
    pub exit: WorkerExit,
}

impl WorkerOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.exit, WorkerExit::Exited(outcome) if outcome.success())
    }
}

/// Completion signal of a run: one outcome per launched worker, in launch
/// order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<WorkerOutcome>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn terminated(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.exit == WorkerExit::Terminated)
            .count()
    }

    /// Workers that exited unsuccessfully or whose exit was lost.
    pub fn failed(&self) -> usize {
        self.total() - self.succeeded() - self.terminated()
    }
}

pub struct RunSupervisor;

impl RunSupervisor {
    /// Block until every handle has exited.
    ///
    /// Workers are awaited concurrently and a failing worker never affects
    /// the others. Once `cancel` fires, workers still running are killed and
    /// reaped; the summary is returned only after that.
    pub async fn await_completion(
        handles: Vec<WorkerHandle>,
        cancel: &CancellationToken,
    ) -> RunSummary {
        info!(workers = handles.len(), "Waiting for workers to finish");

        let tasks: Vec<_> = handles
            .into_iter()
            .map(|handle| {
                let index = handle.index;
                let endpoint = handle.endpoint.clone();
                let cancel = cancel.clone();
                let task = tokio::spawn(supervise(handle, cancel));
                (index, endpoint, task)
            })
            .collect();

        let mut summary = RunSummary::default();
        for (index, endpoint, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(worker = index, "Supervision task failed: {}", e);
                    WorkerOutcome {
                        index,
                        endpoint,
                        pid: None,
                        exit: WorkerExit::Lost(e.to_string()),
                    }
                }
            };
            summary.outcomes.push(outcome);
        }

        info!(
            total = summary.total(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            terminated = summary.terminated(),
            "All workers finished"
        );
        summary
    }
}

async fn supervise(mut handle: WorkerHandle, cancel: CancellationToken) -> WorkerOutcome {
    let exit = tokio::select! {
        result = handle.wait() => match result {
            Ok(outcome) => WorkerExit::Exited(outcome),
            Err(e) => WorkerExit::Lost(e.to_string()),
        },
        _ = cancel.cancelled() => {
            match handle.terminate().await {
                Ok(()) => WorkerExit::Terminated,
                Err(e) => {
                    warn!(worker = handle.index, "Failed to terminate worker: {}", e);
                    // Fall back to reaping it however it ends.
                    match handle.wait().await {
                        Ok(outcome) => WorkerExit::Exited(outcome),
                        Err(e) => WorkerExit::Lost(e.to_string()),
                    }
                }
            }
        }
    };

    match &exit {
        WorkerExit::Exited(outcome) if outcome.success() => {
            info!(worker = handle.index, endpoint = %handle.endpoint, "Worker finished");
        }
        WorkerExit::Exited(outcome) => warn!(
            worker = handle.index,
            endpoint = %handle.endpoint,
            code = ?outcome.code,
            "Worker exited unsuccessfully"
        ),
        WorkerExit::Terminated => {
            info!(worker = handle.index, "Worker terminated");
        }
        WorkerExit::Lost(reason) => warn!(
            worker = handle.index,
            endpoint = %handle.endpoint,
            "Lost track of worker: {}",
            reason
        ),
    }

    WorkerOutcome {
        index: handle.index,
        endpoint: handle.endpoint.clone(),
        pid: handle.pid(),
        exit,
    }
}
