use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use citifit::config::{Config, LoggingConfig};
use citifit::coordinator::{LiveSyncRunner, UpdateCoordinator};
use citifit::models::{Account, FitnessCredentials, SourceCredentials};
use citifit::source::{SourceClient, TripSource};
use citifit::storage::{AccountRepository, SqliteAccountRepository};

#[derive(Parser)]
#[command(
    name = "citifit",
    version,
    about = "Synchronize Citi Bike trips to fitness providers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides `logging.format`
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Lock and synchronize every idle account once
    Trigger,

    /// Synchronize a single account (takes its lock first)
    Task {
        /// Account identifier
        #[arg(short, long)]
        account: i64,
    },

    /// Trigger all accounts periodically until interrupted
    Daemon {
        /// Override the trigger interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Print the current station roster
    Stations,

    /// Manage account records
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Create or update an account
    Add {
        #[arg(long)]
        id: i64,

        /// Bike-share username
        #[arg(long)]
        username: Option<String>,

        /// Bike-share password
        #[arg(long, env = "CITIFIT_SOURCE_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Fitbit OAuth access token
        #[arg(long, env = "CITIFIT_FITBIT_TOKEN", hide_env_values = true)]
        fitbit_token: Option<String>,

        /// Google Fit OAuth access token
        #[arg(long, env = "CITIFIT_GOOGLE_FIT_TOKEN", hide_env_values = true)]
        google_fit_token: Option<String>,
    },

    /// List accounts with their watermark and lock state
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(&tracing_filter(&config.logging, cli.verbose), format)?;

    match cli.command {
        Commands::Trigger => {
            tracing::info!("Starting trigger command");
            trigger(config).await?;
        }

        Commands::Task { account } => {
            tracing::info!(account_id = account, "Starting task command");
            task(config, account).await?;
        }

        Commands::Daemon { interval } => {
            tracing::info!(interval = ?interval, "Starting daemon command");
            daemon(config, interval).await?;
        }

        Commands::Stations => stations(config).await?,

        Commands::Account { action } => account(config, action)?,
    }

    Ok(())
}

/// Default filter when `RUST_LOG` is unset: `--verbose` wins over `logging.level`
fn tracing_filter(logging: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        String::from("citifit=debug,info")
    } else {
        format!("citifit={},warn", logging.level)
    }
}

fn setup_tracing(default_filter: &str, format: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_filter))
        .context("Invalid logging.level")?;

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn coordinator(config: Config) -> Result<UpdateCoordinator<SqliteAccountRepository>> {
    let repo = SqliteAccountRepository::new(&config.database.sqlite_path)
        .context("Failed to open account database")?
        .with_lock_lease(config.sync.lock_lease());
    Ok(UpdateCoordinator::new(
        Arc::new(repo),
        Arc::new(LiveSyncRunner::new(config)),
    ))
}

async fn trigger(config: Config) -> Result<()> {
    let report = coordinator(config)?.trigger_all()?;
    let dispatched = report.dispatched.len();
    let failures = report.join().await;

    println!("Dispatched {dispatched} account(s), {failures} failed");
    Ok(())
}

async fn task(config: Config, account_id: i64) -> Result<()> {
    let coordinator = coordinator(config)?;

    if !coordinator.repository().try_lock(account_id)? {
        anyhow::bail!("Account {account_id} is locked or does not exist");
    }
    let watermark = coordinator.task(account_id).await?;

    println!("Account {account_id} synchronized up to trip {watermark}");
    Ok(())
}

async fn daemon(config: Config, interval: Option<u64>) -> Result<()> {
    let interval = interval
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.sync.trigger_interval());
    let coordinator = coordinator(config)?;

    let failures = coordinator
        .run_periodic(interval, async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received Ctrl-C"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        })
        .await;
    tracing::info!(failures, "Daemon stopped");
    Ok(())
}

async fn stations(config: Config) -> Result<()> {
    let mut client = SourceClient::new(&config.source, None)?;
    let mut stations = client.stations().await?;
    stations.sort_by_key(|s| s.id);

    for station in &stations {
        println!(
            "{:>5}  {:<45} {:>3} bikes {:>3} docks  ({})",
            station.id,
            station.name,
            station.available_bikes,
            station.available_docks,
            station.coordinates()
        );
    }
    println!("{} stations", stations.len());
    Ok(())
}

fn account(config: Config, action: AccountAction) -> Result<()> {
    let repo = SqliteAccountRepository::new(&config.database.sqlite_path)
        .context("Failed to open account database")?;

    match action {
        AccountAction::Add {
            id,
            username,
            password,
            fitbit_token,
            google_fit_token,
        } => {
            let mut account = Account::new(id);
            account.source = match (username, password) {
                (Some(username), Some(password)) => Some(SourceCredentials { username, password }),
                (None, None) => None,
                _ => anyhow::bail!("--username and --password must be given together"),
            };
            if let Some(access_token) = fitbit_token {
                account.fitness.push(FitnessCredentials::Fitbit { access_token });
            }
            if let Some(access_token) = google_fit_token {
                account.fitness.push(FitnessCredentials::GoogleFit { access_token });
            }

            repo.upsert_account(&account)?;
            tracing::info!(account_id = id, providers = account.fitness.len(), "Account saved");
            println!("Account {id} saved");
        }

        AccountAction::List => {
            for id in repo.list_account_ids()? {
                let account = repo.load_account(id)?;
                let providers: Vec<&str> = account.fitness.iter().map(|f| f.provider()).collect();
                println!(
                    "{:>6}  user={:<30} watermark={:<12} locked={:<5} providers=[{}]",
                    account.id,
                    account.source.as_ref().map_or("-", |s| s.username.as_str()),
                    account.watermark,
                    account.locked,
                    providers.join(",")
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_filter_follows_logging_level() {
        let logging = LoggingConfig {
            level: "trace".to_string(),
            format: "json".to_string(),
        };
        assert_eq!(tracing_filter(&logging, false), "citifit=trace,warn");
        assert_eq!(tracing_filter(&logging, true), "citifit=debug,info");
        assert_eq!(
            tracing_filter(&LoggingConfig::default(), false),
            "citifit=info,warn"
        );
    }

    #[test]
    fn test_log_format_flag_is_optional() {
        let cli = Cli::try_parse_from(["citifit", "trigger"]).unwrap();
        assert!(cli.log_format.is_none());

        let cli = Cli::try_parse_from(["citifit", "--log-format", "json", "trigger"]).unwrap();
        assert_eq!(cli.log_format.as_deref(), Some("json"));
    }
}
