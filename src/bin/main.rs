use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use sendtx_orchestrator::{
    AccountProvisioner, ConfigOverrides, ProcessLauncher, RunConfig, assign, load_accounts,
    signal::setup_signal_handler,
};

#[derive(Parser)]
#[command(name = "sendtx-orchestrator")]
#[command(about = "Provision funded accounts and drive sendtx load workers against a set of nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision accounts, launch one worker per account, wait for all of them
    Run {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Only provision accounts and wait for funding to settle
    Provision {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print which endpoint each provisioned account would target
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Configuration file plus command-line overrides.
#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long, env = "SENDTX_ORCHESTRATOR_CONFIG")]
    config: Option<PathBuf>,
    /// Admin credential funding the account pool
    #[arg(long, env = "SENDTX_ADMIN_KEY", hide_env_values = true)]
    admin: Option<String>,
    /// Number of accounts (and workers)
    #[arg(long)]
    accounts: Option<usize>,
    /// Transactions per worker round
    #[arg(long)]
    tx_count: Option<u64>,
    /// Seconds each worker keeps sending
    #[arg(long)]
    period_secs: Option<u64>,
    /// Node endpoint, repeat for several; replaces the configured list
    #[arg(long = "endpoint")]
    endpoints: Vec<String>,
    /// Path of the sendtx executable
    #[arg(long)]
    executable: Option<PathBuf>,
    /// Seed for launch jitter
    #[arg(long)]
    seed: Option<u64>,
    /// Exit with an error if any worker fails
    #[arg(long, default_value_t = false)]
    strict: bool,
}

impl ConfigArgs {
    /// Load the configuration file and apply the flags on top, unvalidated.
    fn load(self) -> Result<RunConfig> {
        let mut config = RunConfig::load(self.config.as_deref())?;
        config.apply_overrides(ConfigOverrides {
            admin: self.admin,
            accounts: self.accounts,
            tx_count: self.tx_count,
            period_secs: self.period_secs,
            endpoints: self.endpoints,
            executable: self.executable,
            seed: self.seed,
            strict: self.strict,
        });
        Ok(config)
    }

    fn into_config(self) -> Result<RunConfig> {
        let config = self.load()?;
        config.validate()?;
        Ok(config)
    }
}

/// Log filter used when `RUST_LOG` is unset or empty.
const DEFAULT_LOG_FILTER: &str = "sendtx_orchestrator=info";

fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    match rust_log {
        Some(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(DEFAULT_LOG_FILTER),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = config.into_config()?;
            info!(
                "Running {} workers against {} endpoints",
                config.accounts,
                config.endpoints.len()
            );

            let cancel = CancellationToken::new();
            setup_signal_handler(cancel.clone());

            let report = sendtx_orchestrator::run(&config, cancel).await?;

            println!("Run {}", report.run_id);
            println!("  Accounts:        {}", report.accounts);
            println!("  Succeeded:       {}", report.summary.succeeded());
            println!("  Failed:          {}", report.summary.failed());
            println!("  Terminated:      {}", report.summary.terminated());
            println!("  Launch failures: {}", report.launch_failures.len());
            println!(
                "  Duration:        {}s",
                (report.finished_at - report.started_at).num_seconds()
            );

            if report.cancelled {
                return Err(anyhow::anyhow!("run was interrupted"));
            }
        }
        Commands::Provision { config } => {
            let config = config.into_config()?;
            let cancel = CancellationToken::new();
            setup_signal_handler(cancel.clone());

            let launcher = ProcessLauncher::new();
            let accounts = AccountProvisioner::new(&config, &launcher)
                .provision(&cancel)
                .await?;

            println!(
                "Provisioned {} accounts into {}",
                accounts.len(),
                config.account_file_path().display()
            );
        }
        Commands::Plan { config } => {
            // Planning launches nothing, so the admin credential is not needed.
            let config = config.load()?;
            config.validate_endpoints()?;
            let path = config.account_file_path();
            let accounts = load_accounts(&path).await?;

            if accounts.len() != config.accounts {
                warn!(
                    "{} holds {} accounts, configuration asks for {}",
                    path.display(),
                    accounts.len(),
                    config.accounts
                );
            }

            println!("{:<8} {:<12} {:<40}", "WORKER", "SENDER", "ENDPOINT");
            println!("{}", "-".repeat(60));
            for assignment in assign(&config.endpoints, &accounts) {
                println!(
                    "{:<8} {:<12} {:<40}",
                    assignment.index,
                    assignment.account.to_string(),
                    assignment.endpoint.as_str()
                );
            }
        }
    }

    Ok(())
}
