// Building blocks
mod types;
mod error;
pub mod config;
pub mod command;
pub mod process;

// Run phases
pub mod provisioner;
pub mod selector;
pub mod jitter;
pub mod scheduler;
pub mod supervisor;
pub mod run;
pub mod signal;

#[cfg(test)]
mod testing;

// Re-export key types and functions
pub use types::{Account, AccountSet, Endpoint};
pub use error::{LaunchFailure, OrchestratorError, OrchestratorResult, ProvisioningError};
pub use config::{ConfigOverrides, LaunchFailurePolicy, RunConfig};
pub use process::{Launcher, ProcessLauncher};
pub use provisioner::{AccountProvisioner, load_accounts};
pub use selector::{Assignment, assign, select};
pub use scheduler::{WorkerHandle, WorkerScheduler};
pub use supervisor::{RunSummary, RunSupervisor};
pub use run::{Run, RunReport, RunState};

use tokio_util::sync::CancellationToken;

/// Convenience function to execute a full load run with real processes.
///
/// This provisions accounts, launches one `sendtx batch` worker per account,
/// and returns once every worker has exited. With `config.strict` set, any
/// failed worker turns the report into an error.
pub async fn run(config: &RunConfig, cancel: CancellationToken) -> OrchestratorResult<RunReport> {
    let launcher = ProcessLauncher::new();
    let mut run = Run::new(config, &launcher, cancel);
    run.execute().await?.check(config.strict)
}
