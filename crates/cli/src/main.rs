mod app;
mod commands;

use anyhow::{Context, Result};
use chrono::Utc;
use std::{
    fs::{self, OpenOptions},
    sync::{Arc, Mutex},
};

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};
use tycoon_core::{
    catalog::Catalog,
    config::{self, AppConfig},
    engine::Engine,
    metrics::format_amount,
    scheduler::TickScheduler,
    store::{FileStore, KeyValueStore},
    wallet::StoredWallet,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::standard()?,
    };
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.save_root.clone()));
    let wallet = Arc::new(StoredWallet::open(
        store.clone(),
        config.wallet_key.clone(),
        config.starting_balance,
    ));
    let engine = Arc::new(Engine::open(
        Arc::new(catalog),
        wallet,
        store,
        config.engine_options(),
    ));
    if let Some(recovery) = engine.load_recovery() {
        warn!(?recovery, "saved state was not loaded cleanly");
    }
    if engine.writes_suspended() {
        println!("Your saved game could not be read. Progress from this session will not be saved.");
    }

    if config.offline_progress {
        if let Some(report) = engine.catch_up_since_save(Utc::now()) {
            if report.earned > 0.0 {
                println!(
                    "While you were away your businesses earned {}.",
                    format_amount(report.earned)
                );
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = TickScheduler::new(engine.clone(), config.scheduler_options());
    let ticker = tokio::spawn(async move {
        if let Err(err) = scheduler.run(shutdown_rx).await {
            error!("Tick scheduler error: {err}");
        }
    });

    let mut app = app::TycoonApp::new(engine.clone(), config.status_interval());
    let result = app.run().await;

    let _ = shutdown_tx.send(true);
    if let Err(err) = ticker.await {
        error!(?err, "tick scheduler task panicked");
    }
    info!(balance = engine.balance(), "shut down");
    result
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("tycoon.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let env_filter = EnvFilter::from_default_env();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_ansi(false)
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
