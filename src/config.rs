use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::{env, fs, time::Duration};

use crate::error::OrchestratorError;
use crate::types::{Account, Endpoint};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "SENDTX_ORCHESTRATOR_CONFIG";

/// Configuration file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "sendtx-orchestrator.json";

/// What to do when a worker process cannot be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchFailurePolicy {
    /// Log the failure, keep launching the remaining workers.
    #[default]
    Skip,
    /// Terminate the workers launched so far and fail the run.
    Abort,
}

/// On-disk shape of the configuration file. Every field is optional.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfigFile {
    pub endpoints: Vec<String>,
    pub admin: Option<String>,
    pub accounts: usize,
    pub tx_count: u64,
    pub send_period_secs: u64,
    pub settle_delay_ms: u64,
    pub jitter_bound_ms: u64,
    pub jitter_step_ms: u64,
    pub jitter_seed: Option<u64>,
    pub executable: String,
    pub account_file: String,
    pub working_dir: Option<String>,
    pub launch_failure_policy: LaunchFailurePolicy,
    pub strict: bool,
}

impl Default for RunConfigFile {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "http://127.0.0.1:8811".to_string(),
                "http://127.0.0.1:8822".to_string(),
                "http://127.0.0.1:8833".to_string(),
                "http://127.0.0.1:8844".to_string(),
            ],
            admin: None,
            accounts: 100,
            tx_count: 120,
            send_period_secs: 600,
            settle_delay_ms: 5_000,
            jitter_bound_ms: 600,
            jitter_step_ms: 200,
            jitter_seed: None,
            executable: "./sendtx".to_string(),
            account_file: "accs".to_string(),
            working_dir: None,
            launch_failure_policy: LaunchFailurePolicy::Skip,
            strict: false,
        }
    }
}

/// Immutable parameters of one load run.
///
/// Built once at startup and passed by reference to every stage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Nodes to spread workers over. Provisioning always uses the first.
    pub endpoints: Vec<Endpoint>,
    /// Credential of the account that funds the pool.
    pub admin: Account,
    /// Number of accounts to provision, one worker each.
    pub accounts: usize,
    /// Transactions each worker sends per round.
    pub tx_count: u64,
    /// How long each worker keeps sending.
    pub send_period: Duration,
    /// Wait between provisioning and reading the account file.
    pub settle_delay: Duration,
    /// Upper bound of the delay between two launches.
    pub jitter_bound: Duration,
    /// Quantum of the launch delay; delays are multiples of it.
    pub jitter_step: Duration,
    /// Seed for the launch delay generator, random when absent.
    pub jitter_seed: Option<u64>,
    pub executable: PathBuf,
    /// Where the executable writes provisioned accounts, relative to
    /// `working_dir`. `sendtx prepare` always writes `accs` in its working
    /// directory, so anything else only fits a wrapper that moves the file.
    pub account_file: PathBuf,
    /// Directory the executable runs in; the account file is relative to it.
    pub working_dir: Option<PathBuf>,
    pub launch_failure_policy: LaunchFailurePolicy,
    /// Fail the run when any worker exits unsuccessfully.
    pub strict: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_file(RunConfigFile::default())
    }
}

impl RunConfig {
    pub fn from_file(cfg: RunConfigFile) -> Self {
        Self {
            endpoints: cfg.endpoints.into_iter().map(Endpoint::from).collect(),
            admin: Account::new(cfg.admin.unwrap_or_default()),
            accounts: cfg.accounts,
            tx_count: cfg.tx_count,
            send_period: Duration::from_secs(cfg.send_period_secs),
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
            jitter_bound: Duration::from_millis(cfg.jitter_bound_ms),
            jitter_step: Duration::from_millis(cfg.jitter_step_ms),
            jitter_seed: cfg.jitter_seed,
            executable: PathBuf::from(cfg.executable),
            account_file: PathBuf::from(cfg.account_file),
            working_dir: cfg.working_dir.map(PathBuf::from),
            launch_failure_policy: cfg.launch_failure_policy,
            strict: cfg.strict,
        }
    }

    /// Parse a JSON configuration document, expanding `${VAR}` references.
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let cfg: RunConfigFile = serde_json::from_str(raw)?;
        Ok(Self::from_file(expand_file(cfg)))
    }

    /// Load the configuration from `path`, the [`CONFIG_ENV_VAR`] file, or
    /// [`DEFAULT_CONFIG_FILE`], falling back to built-in defaults when none
    /// exists. The result is not validated.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match resolve_config_path(path)? {
            Some(path) => {
                let raw = fs::read_to_string(&path).map_err(|e| {
                    anyhow::anyhow!("Failed to read config `{}`: {}", path.display(), e)
                })?;
                Self::from_json(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    /// Account file location as seen from the orchestrator's own directory.
    pub fn account_file_path(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) if self.account_file.is_relative() => dir.join(&self.account_file),
            _ => self.account_file.clone(),
        }
    }

    /// Endpoint used for provisioning.
    pub fn provisioning_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.first()
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(admin) = overrides.admin {
            self.admin = Account::new(admin);
        }
        if let Some(accounts) = overrides.accounts {
            self.accounts = accounts;
        }
        if let Some(tx_count) = overrides.tx_count {
            self.tx_count = tx_count;
        }
        if let Some(secs) = overrides.period_secs {
            self.send_period = Duration::from_secs(secs);
        }
        if !overrides.endpoints.is_empty() {
            self.endpoints = overrides.endpoints.into_iter().map(Endpoint::new).collect();
        }
        if let Some(executable) = overrides.executable {
            self.executable = executable;
        }
        if overrides.seed.is_some() {
            self.jitter_seed = overrides.seed;
        }
        self.strict |= overrides.strict;
    }

    /// Check only the endpoint list. Enough for commands that plan workers
    /// without running anything.
    pub fn validate_endpoints(&self) -> Result<(), OrchestratorError> {
        if self.endpoints.is_empty() {
            return Err(OrchestratorError::Config(
                "at least one endpoint is required".to_string(),
            ));
        }
        if let Some(pos) = self.endpoints.iter().position(Endpoint::is_empty) {
            return Err(OrchestratorError::Config(format!(
                "endpoint at index {} is empty",
                pos
            )));
        }
        Ok(())
    }

    /// Check everything a provisioning or load run needs.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let invalid = |msg: &str| Err(OrchestratorError::Config(msg.to_string()));

        self.validate_endpoints()?;
        if self.admin.is_empty() {
            return invalid("admin credential is required");
        }
        if self.accounts == 0 {
            return invalid("account count must be positive");
        }
        if self.jitter_step.is_zero() && !self.jitter_bound.is_zero() {
            return invalid("jitter step must be positive when a jitter bound is set");
        }
        if self.jitter_step > self.jitter_bound && !self.jitter_bound.is_zero() {
            return invalid("jitter step must not exceed the jitter bound");
        }
        if self.executable.as_os_str().is_empty() {
            return invalid("executable path is empty");
        }
        // The file is deleted before provisioning, keep it inside working_dir.
        let contained = self
            .account_file
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if self.account_file.as_os_str().is_empty() || !contained {
            return invalid("account file must be a relative path inside the working directory");
        }
        Ok(())
    }
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub admin: Option<String>,
    pub accounts: Option<usize>,
    pub tx_count: Option<u64>,
    pub period_secs: Option<u64>,
    /// Replaces the configured list when non-empty.
    pub endpoints: Vec<String>,
    pub executable: Option<PathBuf>,
    pub seed: Option<u64>,
    /// OR-ed with the configured value.
    pub strict: bool,
}

fn resolve_config_path(explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(p) = explicit {
        return Ok(Some(p.to_path_buf()));
    }

    if let Ok(p) = env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(p);
        if !candidate.exists() {
            return Err(anyhow::anyhow!(
                "{} points to `{}`, which does not exist",
                CONFIG_ENV_VAR,
                candidate.display()
            ));
        }
        return Ok(Some(candidate));
    }

    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_file(cfg: RunConfigFile) -> RunConfigFile {
    let mut cfg = cfg;

    cfg.endpoints = cfg.endpoints.iter().map(|e| expand_env_vars(e)).collect();
    if let Some(admin) = cfg.admin.as_mut() {
        *admin = expand_env_vars(admin);
    }
    cfg.executable = expand_env_vars(&cfg.executable);
    cfg.account_file = expand_env_vars(&cfg.account_file);
    if let Some(dir) = cfg.working_dir.as_mut() {
        *dir = expand_env_vars(dir);
    }

    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RunConfig {
        RunConfig {
            admin: Account::new("c921c91a"),
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.endpoints.len(), 4);
        assert_eq!(cfg.endpoints[0].as_str(), "http://127.0.0.1:8811");
        assert_eq!(cfg.accounts, 100);
        assert_eq!(cfg.tx_count, 120);
        assert_eq!(cfg.send_period, Duration::from_secs(600));
        assert_eq!(cfg.settle_delay, Duration::from_secs(5));
        assert_eq!(cfg.jitter_bound, Duration::from_millis(600));
        assert_eq!(cfg.jitter_step, Duration::from_millis(200));
        assert_eq!(cfg.launch_failure_policy, LaunchFailurePolicy::Skip);
        assert!(cfg.admin.is_empty());
    }

    #[test]
    fn test_defaults_require_admin() {
        let err = RunConfig::default().validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: admin credential is required"
        );
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let cfg = RunConfig::from_json(
            r#"{
                "endpoints": ["http://n0:8545", "http://n1:8545"],
                "admin": "deadbeef",
                "accounts": 4,
                "settle_delay_ms": 250,
                "launch_failure_policy": "abort"
            }"#,
        )
        .unwrap();

        assert_eq!(
            cfg.endpoints,
            vec![Endpoint::new("http://n0:8545"), Endpoint::new("http://n1:8545")]
        );
        assert_eq!(cfg.admin.as_str(), "deadbeef");
        assert_eq!(cfg.accounts, 4);
        assert_eq!(cfg.settle_delay, Duration::from_millis(250));
        assert_eq!(cfg.launch_failure_policy, LaunchFailurePolicy::Abort);
        // untouched fields keep their defaults
        assert_eq!(cfg.tx_count, 120);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = RunConfig::from_json(include_str!("../config.example.json")).unwrap();
        assert_eq!(cfg.endpoints.len(), 4);
        assert_eq!(cfg.launch_failure_policy, LaunchFailurePolicy::Skip);
        assert_eq!(cfg.executable, PathBuf::from("./sendtx"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(RunConfig::from_json(r#"{"acounts": 4}"#).is_err());
    }

    #[test]
    fn test_env_expansion() {
        // Unique name so parallel tests do not interfere.
        unsafe { env::set_var("SENDTX_ORCH_TEST_ADMIN", "feedface") };
        let cfg = RunConfig::from_json(r#"{"admin": "${SENDTX_ORCH_TEST_ADMIN}"}"#).unwrap();
        assert_eq!(cfg.admin.as_str(), "feedface");

        let cfg = RunConfig::from_json(r#"{"admin": "${SENDTX_ORCH_TEST_UNSET_VAR}"}"#).unwrap();
        assert_eq!(cfg.admin.as_str(), "${SENDTX_ORCH_TEST_UNSET_VAR}");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = RunConfig { endpoints: vec![], ..valid() };
        assert!(matches!(cfg.validate(), Err(OrchestratorError::Config(_))));

        let cfg = RunConfig {
            endpoints: vec![Endpoint::new("http://n0"), Endpoint::new("")],
            ..valid()
        };
        assert_eq!(
            cfg.validate().unwrap_err().to_string(),
            "invalid configuration: endpoint at index 1 is empty"
        );

        let cfg = RunConfig { accounts: 0, ..valid() };
        assert!(cfg.validate().is_err());

        let cfg = RunConfig { jitter_step: Duration::ZERO, ..valid() };
        assert!(cfg.validate().is_err());

        let cfg = RunConfig {
            jitter_step: Duration::from_secs(1),
            jitter_bound: Duration::from_millis(500),
            ..valid()
        };
        assert!(cfg.validate().is_err());

        let cfg = RunConfig {
            jitter_step: Duration::ZERO,
            jitter_bound: Duration::ZERO,
            ..valid()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_account_file_path_joins_working_dir() {
        let cfg = RunConfig {
            working_dir: Some(PathBuf::from("/tmp/run")),
            ..valid()
        };
        assert_eq!(cfg.account_file_path(), PathBuf::from("/tmp/run/accs"));

        let cfg = RunConfig {
            working_dir: Some(PathBuf::from("/tmp/run")),
            account_file: PathBuf::from("out/accs"),
            ..valid()
        };
        assert_eq!(cfg.account_file_path(), PathBuf::from("/tmp/run/out/accs"));

        assert_eq!(valid().account_file_path(), PathBuf::from("accs"));
    }

    #[test]
    fn test_account_file_must_stay_in_working_dir() {
        for bad in ["/var/accs.json", "../accs", "out/../../accs", ""] {
            let cfg = RunConfig {
                account_file: PathBuf::from(bad),
                ..valid()
            };
            let err = cfg.validate().unwrap_err().to_string();
            assert!(err.contains("account file must be a relative path"), "{:?}: {}", bad, err);
        }

        let cfg = RunConfig {
            account_file: PathBuf::from("./out/accs"),
            ..valid()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_endpoints_ignores_admin() {
        let cfg = RunConfig::default();
        assert!(cfg.admin.is_empty());
        assert!(cfg.validate().is_err());
        assert!(cfg.validate_endpoints().is_ok());

        let cfg = RunConfig { endpoints: vec![], ..RunConfig::default() };
        assert!(cfg.validate_endpoints().is_err());

        let cfg = RunConfig {
            endpoints: vec![Endpoint::new("")],
            ..RunConfig::default()
        };
        assert!(cfg.validate_endpoints().is_err());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        unsafe { env::set_var("SENDTX_ORCH_TEST_OVERRIDDEN_ADMIN", "fromenv") };
        let mut cfg = RunConfig::from_json(
            r#"{
                "endpoints": ["http://file0", "http://file1"],
                "admin": "${SENDTX_ORCH_TEST_OVERRIDDEN_ADMIN}",
                "accounts": 4,
                "jitter_seed": 1
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.admin.as_str(), "fromenv");

        cfg.apply_overrides(ConfigOverrides {
            admin: Some("fromflag".to_string()),
            accounts: Some(9),
            tx_count: Some(30),
            period_secs: Some(45),
            endpoints: vec!["http://flag0".to_string()],
            executable: Some(PathBuf::from("/opt/sendtx")),
            seed: Some(42),
            strict: false,
        });

        assert_eq!(cfg.admin.as_str(), "fromflag");
        assert_eq!(cfg.accounts, 9);
        assert_eq!(cfg.tx_count, 30);
        assert_eq!(cfg.send_period, Duration::from_secs(45));
        assert_eq!(cfg.endpoints, vec![Endpoint::new("http://flag0")]);
        assert_eq!(cfg.executable, PathBuf::from("/opt/sendtx"));
        assert_eq!(cfg.jitter_seed, Some(42));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_overrides_keep_file_values() {
        let mut cfg = RunConfig::from_json(
            r#"{"endpoints": ["http://file0"], "admin": "abcd", "jitter_seed": 7, "strict": true}"#,
        )
        .unwrap();
        cfg.apply_overrides(ConfigOverrides::default());

        assert_eq!(cfg.endpoints, vec![Endpoint::new("http://file0")]);
        assert_eq!(cfg.admin.as_str(), "abcd");
        assert_eq!(cfg.jitter_seed, Some(7));
        // --strict can only turn strict mode on
        assert!(cfg.strict);

        let mut cfg = valid();
        cfg.apply_overrides(ConfigOverrides {
            strict: true,
            ..ConfigOverrides::default()
        });
        assert!(cfg.strict);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{"admin": "abcd", "accounts": 7}"#).unwrap();

        let cfg = RunConfig::load(Some(path.as_path())).unwrap();
        assert_eq!(cfg.accounts, 7);

        let missing = dir.path().join("missing.json");
        assert!(RunConfig::load(Some(missing.as_path())).is_err());
    }
}
