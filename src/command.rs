//! Command lines of the `sendtx` executable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::RunConfig;
use crate::types::{Account, Endpoint};

/// Which mode of the executable an invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `prepare`: create and fund the account pool.
    Provision,
    /// `batch`: send transactions from one account.
    Batch,
}

/// A fully built call of the executable.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub mode: Mode,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// `<exe> prepare --addr <endpoint> --admin <admin> --number <count>`
    pub fn provision(config: &RunConfig, endpoint: &Endpoint) -> Self {
        Self {
            mode: Mode::Provision,
            program: config.executable.clone(),
            args: vec![
                "prepare".to_string(),
                "--addr".to_string(),
                endpoint.to_string(),
                "--admin".to_string(),
                config.admin.as_str().to_string(),
                "--number".to_string(),
                config.accounts.to_string(),
            ],
            working_dir: config.working_dir.clone(),
        }
    }

    /// `<exe> batch --addr <endpoint> --admin <sender> --count <n> --period <secs>`
    pub fn batch(config: &RunConfig, endpoint: &Endpoint, sender: &Account) -> Self {
        Self {
            mode: Mode::Batch,
            program: config.executable.clone(),
            args: vec![
                "batch".to_string(),
                "--addr".to_string(),
                endpoint.to_string(),
                "--admin".to_string(),
                sender.as_str().to_string(),
                "--count".to_string(),
                config.tx_count.to_string(),
                "--period".to_string(),
                period_secs(config.send_period).to_string(),
            ],
            working_dir: config.working_dir.clone(),
        }
    }

    /// Value following `flag` in the argument list.
    pub fn arg(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

// The executable takes whole seconds; round up so a sub-second period is not
// turned into zero.
fn period_secs(period: Duration) -> u64 {
    let secs = period.as_secs();
    if period.subsec_nanos() > 0 { secs + 1 } else { secs }
}

impl std::fmt::Debug for Invocation {
    // Credentials stay out of logs: the value after `--admin` is redacted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut redact_next = false;
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| {
                if redact_next {
                    redact_next = false;
                    Account::new(a.as_str()).redacted()
                } else {
                    redact_next = a == "--admin";
                    a.clone()
                }
            })
            .collect();
        f.debug_struct("Invocation")
            .field("mode", &self.mode)
            .field("program", &self.program)
            .field("args", &args)
            .field("working_dir", &self.working_dir)
            .finish()
    }
}
