//! Creation of the funded account pool.
//!
//! Provisioning runs the executable's `prepare` mode once against the first
//! endpoint, waits for the funding transactions to settle, then loads the
//! account file the executable wrote.

use std::io;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::Invocation;
use crate::config::RunConfig;
use crate::error::{OrchestratorError, OrchestratorResult, ProvisioningError};
use crate::process::Launcher;
use crate::types::{Account, AccountSet};

pub struct AccountProvisioner<'a> {
    config: &'a RunConfig,
    launcher: &'a dyn Launcher,
}

impl<'a> AccountProvisioner<'a> {
    pub fn new(config: &'a RunConfig, launcher: &'a dyn Launcher) -> Self {
        Self { config, launcher }
    }

    /// Run all three provisioning steps: invoke, settle, load.
    pub async fn provision(&self, cancel: &CancellationToken) -> OrchestratorResult<AccountSet> {
        self.invoke(cancel).await?;
        self.settle(cancel).await?;
        Ok(self.load().await?)
    }

    /// Run `prepare` and wait for it to exit successfully.
    ///
    /// A stale account file from an earlier run is removed first, so a
    /// `prepare` that exits cleanly without writing one is caught by
    /// [`load`](Self::load).
    pub async fn invoke(&self, cancel: &CancellationToken) -> OrchestratorResult<()> {
        let endpoint = self.config.provisioning_endpoint().ok_or_else(|| {
            OrchestratorError::Config("at least one endpoint is required".to_string())
        })?;

        let path = self.config.account_file_path();
        remove_stale(&path).await?;

        let invocation = Invocation::provision(self.config, endpoint);
        info!(
            endpoint = %endpoint,
            accounts = self.config.accounts,
            "Provisioning accounts"
        );
        debug!(?invocation, "Provisioning command");

        let mut process = self
            .launcher
            .spawn(&invocation)
            .map_err(ProvisioningError::Spawn)?;

        let outcome = tokio::select! {
            outcome = process.wait() => outcome.map_err(ProvisioningError::Spawn)?,
            _ = cancel.cancelled() => {
                warn!("Cancelled during provisioning, terminating provisioning command");
                if let Err(e) = process.kill().await {
                    warn!("Failed to terminate provisioning command: {}", e);
                }
                return Err(OrchestratorError::Cancelled);
            }
        };

        if !outcome.success() {
            return Err(ProvisioningError::NonZeroExit { code: outcome.code }.into());
        }
        Ok(())
    }

    /// Wait the settle delay so funding is effective before accounts are used.
    pub async fn settle(&self, cancel: &CancellationToken) -> OrchestratorResult<()> {
        let delay = self.config.settle_delay;
        if delay.is_zero() {
            return Ok(());
        }
        info!("Waiting {:?} for funding to settle", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(OrchestratorError::Cancelled),
        }
    }

    /// Read the account file written by `prepare`.
    pub async fn load(&self) -> Result<AccountSet, ProvisioningError> {
        let accounts = load_accounts(&self.config.account_file_path()).await?;
        if accounts.len() != self.config.accounts {
            warn!(
                requested = self.config.accounts,
                provisioned = accounts.len(),
                "Provisioned account count differs from the requested count"
            );
        }
        info!("Loaded {} provisioned accounts", accounts.len());
        Ok(accounts)
    }
}

async fn remove_stale(path: &Path) -> Result<(), ProvisioningError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale account file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ProvisioningError::StaleAccountFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse an account file: a JSON array of non-empty credential strings.
pub async fn load_accounts(path: &Path) -> Result<AccountSet, ProvisioningError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ProvisioningError::AccountFileMissing(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ProvisioningError::AccountFileUnreadable {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let credentials: Vec<String> =
        serde_json::from_str(&raw).map_err(|source| ProvisioningError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    if credentials.is_empty() {
        return Err(ProvisioningError::NoAccounts(path.to_path_buf()));
    }
    if let Some(index) = credentials.iter().position(|c| c.is_empty()) {
        return Err(ProvisioningError::EmptyCredential {
            path: path.to_path_buf(),
            index,
        });
    }

    Ok(credentials.into_iter().map(Account::new).collect())
}
