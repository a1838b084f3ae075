//! Vigil Daemon - host health monitoring with guarded remediation
//!
//! `vigild run` drives the periodic check loop; the other subcommands
//! inspect or edit the store.

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vigil_common::RecommendationStatus;
use vigild::executor::{CommandRunner, TokioCommandRunner};
use vigild::monitor::{MetricsProvider, SystemMonitor};
use vigild::policy::safety_gate;
use vigild::{
    run_scheduler, select_executor, AuditSink, Config, CycleOutcome, Engine, SettingsProvider,
    SqliteStore, Store,
};

use cli::{Cli, Commands, RecommendCommands, SettingsCommands, WhitelistCommands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Commands::InitConfig { path } = &cli.command {
        Config::save_default(path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };
    if let Some(db) = cli.db {
        config.daemon.db_path = db;
    }

    let store = Arc::new(
        SqliteStore::open(&config.daemon.db_path)
            .with_context(|| format!("Failed to open {}", config.daemon.db_path.display()))?,
    );
    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new(Duration::from_secs(
        config.effective_command_timeout(),
    )));

    match cli.command {
        Commands::Run => {
            info!("Vigil Daemon v{} starting", env!("CARGO_PKG_VERSION"));
            let period = Duration::from_secs(config.effective_check_interval());
            let engine = build_engine(config, store, runner);
            run_scheduler(Arc::new(engine), period, shutdown_signal()).await;
            info!("Vigil Daemon stopped");
        }

        Commands::Check => {
            let engine = build_engine(config, store, runner);
            match engine.run_cycle().await {
                CycleOutcome::Completed(report) => print_json(&report)?,
                CycleOutcome::NoMetrics => bail!("No metrics could be collected"),
                CycleOutcome::Skipped => bail!("A check cycle is already running"),
                CycleOutcome::Failed(e) => bail!("Check cycle failed: {}", e),
            }
        }

        Commands::Metrics => {
            let monitor = SystemMonitor::new(runner, &config.monitor);
            print_json(&monitor.collect().await)?;
        }

        Commands::Events { limit } => print_json(&store.recent_events(limit)?)?,
        Commands::Actions { limit } => print_json(&store.recent_actions(limit)?)?,
        Commands::Recommendations { limit, pending } => {
            print_json(&store.recommendations(limit, pending)?)?
        }

        Commands::Settings { action } => match action {
            None => {
                let settings: BTreeMap<_, _> = store.get_settings()?.into_iter().collect();
                print_json(&settings)?;
            }
            Some(SettingsCommands::Get { key }) => match store.get_settings()?.get(&key) {
                Some(value) => println!("{}", value),
                None => bail!("Unknown setting: {}", key),
            },
            Some(SettingsCommands::Set { key, value }) => {
                store.update_setting(&key, &value)?;
                println!("{} = {}", key, value);
            }
        },

        Commands::Whitelist { action } => match action.unwrap_or(WhitelistCommands::List) {
            WhitelistCommands::List => {
                for name in store.get_whitelist()? {
                    println!("{}", name);
                }
            }
            WhitelistCommands::Add { name } => {
                if store.add_to_whitelist(&name)? {
                    println!("Added {} to whitelist", name);
                } else {
                    println!("{} already whitelisted", name);
                }
            }
            WhitelistCommands::Remove { name } => {
                if store.remove_from_whitelist(&name)? {
                    println!("Removed {} from whitelist", name);
                } else {
                    bail!("{} is not whitelisted", name);
                }
            }
        },

        Commands::Recommend { action } => {
            let (id, status) = match action {
                RecommendCommands::Apply { id } => (id, RecommendationStatus::Applied),
                RecommendCommands::Dismiss { id } => (id, RecommendationStatus::Dismissed),
            };
            if !store.update_recommendation_status(id, status)? {
                bail!("Recommendation {} not found", id);
            }
            println!("Recommendation {} marked {}", id, status.as_str());
        }

        Commands::Rollback { action_id } => {
            let engine = build_engine(config, store, runner);
            let outcome = engine.rollback_action(action_id).await?;
            print_json(&outcome)?;
            if !outcome.success {
                bail!("Rollback of action {} failed", action_id);
            }
        }

        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

fn build_engine(config: Config, store: Arc<SqliteStore>, runner: Arc<dyn CommandRunner>) -> Engine {
    let gate = safety_gate(&config);
    let executor = select_executor(&config, gate, Some(runner.clone()));
    let monitor = Arc::new(SystemMonitor::new(runner, &config.monitor));
    info!(
        "Environment: {}, executor: {}, profile: {:?}",
        config.daemon.environment.as_str(),
        executor.name(),
        config.remediation.action_profile
    );
    let store: Arc<dyn Store> = store;
    Engine::new(config, monitor, store, executor)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
