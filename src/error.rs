//! Error types for a load run.
//!
//! Provisioning errors are always fatal. Launch errors are fatal only under
//! [`LaunchFailurePolicy::Abort`](crate::config::LaunchFailurePolicy); worker
//! exit failures never are and show up in the run summary instead.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::types::Endpoint;

/// Why the account pool could not be provisioned.
#[derive(Debug)]
pub enum ProvisioningError {
    /// The provisioning command could not be started or awaited.
    Spawn(io::Error),

    /// The provisioning command ran but exited unsuccessfully.
    NonZeroExit {
        /// Exit code, absent when the process was killed by a signal
        code: Option<i32>,
    },

    /// An account file left by an earlier run could not be removed.
    StaleAccountFile { path: PathBuf, source: io::Error },

    /// The account file does not exist after provisioning.
    AccountFileMissing(PathBuf),

    /// The account file exists but could not be read.
    AccountFileUnreadable { path: PathBuf, source: io::Error },

    /// The account file is not a JSON array of strings.
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The account file contains an empty credential.
    EmptyCredential { path: PathBuf, index: usize },

    /// The account file is a valid but empty array.
    NoAccounts(PathBuf),
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "failed to run provisioning command: {}", err),
            Self::NonZeroExit { code: Some(code) } => {
                write!(f, "provisioning command exited with status {}", code)
            }
            Self::NonZeroExit { code: None } => {
                write!(f, "provisioning command was terminated by a signal")
            }
            Self::StaleAccountFile { path, source } => write!(
                f,
                "failed to remove stale account file {}: {}",
                path.display(),
                source
            ),
            Self::AccountFileMissing(path) => {
                write!(f, "account file {} was not created", path.display())
            }
            Self::AccountFileUnreadable { path, source } => {
                write!(f, "failed to read account file {}: {}", path.display(), source)
            }
            Self::Malformed { path, source } => write!(
                f,
                "account file {} is not a JSON array of strings: {}",
                path.display(),
                source
            ),
            Self::EmptyCredential { path, index } => write!(
                f,
                "account file {} has an empty credential at index {}",
                path.display(),
                index
            ),
            Self::NoAccounts(path) => {
                write!(f, "account file {} contains no accounts", path.display())
            }
        }
    }
}

impl std::error::Error for ProvisioningError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            Self::StaleAccountFile { source, .. } => Some(source),
            Self::AccountFileUnreadable { source, .. } => Some(source),
            Self::Malformed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A worker process that failed to start.
#[derive(Debug)]
pub struct LaunchFailure {
    /// Position of the worker's account in the account set
    pub index: usize,
    pub endpoint: Endpoint,
    pub source: io::Error,
}

impl fmt::Display for LaunchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to launch worker {} against {}: {}",
            self.index, self.endpoint, self.source
        )
    }
}

impl std::error::Error for LaunchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Errors that end a run before every worker has been supervised to exit.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Configuration is invalid.
    Config(String),

    /// Accounts could not be provisioned; no worker was launched.
    Provisioning(ProvisioningError),

    /// A worker failed to launch under the abort policy. Workers launched
    /// before it have been terminated and reaped.
    Launch(LaunchFailure),

    /// The run was interrupted before any worker was launched.
    Cancelled,

    /// The run has already been executed.
    AlreadyStarted,

    /// The run completed but some workers failed and strict mode is on.
    WorkersFailed { failed: usize, total: usize },
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Self::Provisioning(err) => write!(f, "provisioning failed: {}", err),
            Self::Launch(err) => write!(f, "launch aborted: {}", err),
            Self::Cancelled => write!(f, "run cancelled before workers were launched"),
            Self::AlreadyStarted => write!(f, "run has already been executed"),
            Self::WorkersFailed { failed, total } => {
                write!(f, "{} of {} workers failed", failed, total)
            }
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Provisioning(err) => Some(err),
            Self::Launch(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ProvisioningError> for OrchestratorError {
    fn from(err: ProvisioningError) -> Self {
        Self::Provisioning(err)
    }
}

impl From<LaunchFailure> for OrchestratorError {
    fn from(err: LaunchFailure) -> Self {
        Self::Launch(err)
    }
}

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
