//! Command-line interface for zenfarm.
//!
//! Provides commands for importing accounts, running one-off batches,
//! the repeating farm loop, and inspecting accounts and action stats.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::accounts::import_accounts;
use crate::config;
use crate::core::{ActionLifecycle, DependencyResolver, Scheduler};
use crate::domain::ActionKind;
use crate::handlers::HandlerRegistry;
use crate::store::Store;

/// zenfarm - dependency-aware action orchestrator for testnet farming
#[derive(Parser, Debug)]
#[command(name = "zenfarm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import accounts from a delimited file (email|address|private_key)
    Import {
        /// Accounts file
        accounts: PathBuf,

        /// Proxy list, one per line, assigned round-robin
        #[arg(short, long)]
        proxies: Option<PathBuf>,
    },

    /// Run one batch of the given action for all active accounts
    Run {
        /// Action kind (waitlist, faucet, stake)
        kind: ActionKind,

        /// Override the configured concurrency bound
        #[arg(short, long)]
        max_concurrent: Option<usize>,
    },

    /// Repeatedly run a batch, sleeping between runs
    Farm {
        /// Action kind to farm
        #[arg(short, long, default_value = "stake")]
        kind: ActionKind,

        /// Hours to wait between batches
        #[arg(short, long, default_value = "23")]
        interval_hours: u64,
    },

    /// List accounts
    Accounts {
        /// Include inactive accounts
        #[arg(long)]
        all: bool,
    },

    /// Show action counts by kind and status
    Stats,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Import { accounts, proxies } => cmd_import(accounts, proxies),
            Commands::Run {
                kind,
                max_concurrent,
            } => cmd_run(kind, max_concurrent).await,
            Commands::Farm {
                kind,
                interval_hours,
            } => cmd_farm(kind, interval_hours).await,
            Commands::Accounts { all } => cmd_accounts(all),
            Commands::Stats => cmd_stats(),
            Commands::Config => cmd_config(),
        }
    }
}

fn open_store() -> Result<Store> {
    let config = config::config()?;
    Store::open(config.db_path())
}

fn build_scheduler(max_concurrent: Option<usize>) -> Result<Scheduler> {
    let config = config::config()?;
    let store = open_store()?;

    let resolver = DependencyResolver::new(config.dependencies.clone());
    let registry = HandlerRegistry::testnet(&config.endpoints);
    let lifecycle = ActionLifecycle::new(resolver, registry);

    let mut engine = config.engine.clone();
    if let Some(max) = max_concurrent {
        engine.max_concurrent_tasks = max;
    }

    Ok(Scheduler::new(store, lifecycle, engine))
}

fn cmd_import(accounts: PathBuf, proxies: Option<PathBuf>) -> Result<()> {
    let store = open_store()?;
    let session = store.session()?;

    let report = import_accounts(&session, &accounts, proxies.as_deref())
        .context("account import failed")?;

    println!("Rows read:    {}", report.total_rows);
    println!("Imported:     {}", report.added);
    println!("Malformed:    {}", report.skipped_malformed);
    println!("Duplicates:   {}", report.duplicates);
    for error in &report.errors {
        println!("Error:        {}", error);
    }
    Ok(())
}

async fn cmd_run(kind: ActionKind, max_concurrent: Option<usize>) -> Result<()> {
    let scheduler = build_scheduler(max_concurrent)?;
    let outcomes = scheduler.run_for_all_active(kind).await?;

    for (account, outcome) in &outcomes {
        let tag = if outcome.is_success() { "ok" } else { "failed" };
        match &outcome.error {
            Some(error) => println!("{:<40} {} ({})", account, tag, error),
            None => println!("{:<40} {}", account, tag),
        }
    }
    Ok(())
}

async fn cmd_farm(kind: ActionKind, interval_hours: u64) -> Result<()> {
    let scheduler = build_scheduler(None)?;

    loop {
        let started = std::time::Instant::now();
        info!(%kind, "starting farm batch");

        match scheduler.run_for_all_active(kind).await {
            Ok(outcomes) => {
                let succeeded = outcomes.values().filter(|o| o.is_success()).count();
                info!(
                    total = outcomes.len(),
                    succeeded,
                    elapsed_secs = started.elapsed().as_secs(),
                    "farm batch finished"
                );
            }
            Err(e) => error!(error = %format!("{:#}", e), "farm batch failed"),
        }

        info!(interval_hours, "waiting until next batch");
        tokio::time::sleep(Duration::from_secs(interval_hours * 3600)).await;
    }
}

fn cmd_accounts(all: bool) -> Result<()> {
    let store = open_store()?;
    let session = store.session()?;

    let accounts = session.list_accounts(!all)?;

    for account in accounts {
        println!(
            "{:<6} {:<40} {:<44} {}",
            account.id,
            account.email,
            account.address,
            if account.active { "active" } else { "inactive" }
        );
    }
    Ok(())
}

fn cmd_stats() -> Result<()> {
    let store = open_store()?;
    let session = store.session()?;

    for (kind, status, count) in session.action_counts()? {
        println!("{:<12} {:<10} {}", kind, status, count);
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = config::config()?;

    println!("home:          {}", config.home.display());
    println!("database:      {}", config.db_path().display());
    match &config.config_file {
        Some(path) => println!("config file:   {}", path.display()),
        None => println!("config file:   (none, using defaults)"),
    }
    println!("max concurrent: {}", config.engine.max_concurrent_tasks);
    println!(
        "exec delay:    [{}, {}]s",
        config.engine.execution_delay_secs[0], config.engine.execution_delay_secs[1]
    );
    for kind in [ActionKind::Waitlist, ActionKind::Faucet, ActionKind::Stake] {
        let rules = config.dependencies.rules_for(kind);
        if rules.is_empty() {
            println!("deps {:<10} (none)", kind);
        } else {
            let rendered: Vec<String> = rules
                .iter()
                .map(|r| match r.max_age_hours {
                    Some(hours) => format!("{} (max {}h)", r.kind, hours),
                    None => r.kind.to_string(),
                })
                .collect();
            println!("deps {:<10} {}", kind, rendered.join(", "));
        }
    }
    Ok(())
}
