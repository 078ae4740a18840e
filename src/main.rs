use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod config;
mod db;
mod engine;
mod ledger;
mod models;
mod odds;
mod provider;
mod server;
mod staking;

use config::Config;
use db::Database;
use engine::results::ResultsSyncer;
use engine::{EngineConfig, PredictionEngine};
use ledger::Ledger;
use provider::{SportMonksClient, SportsDataProvider};
use server::AppState;
use staking::KellyConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;
    let default_policy = config.parsed_stake_policy()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    // Build the data provider
    let token = config
        .sportmonks_api_token
        .clone()
        .unwrap_or_default();
    let provider: Arc<dyn SportsDataProvider> =
        Arc::new(SportMonksClient::new(&config.sportmonks_api_url, &token)?);

    // Ledger and bankroll bootstrap
    let kelly_config = KellyConfig {
        kelly_fraction: config.kelly_fraction,
        ..KellyConfig::default()
    };
    let ledger = Ledger::new(db.clone(), kelly_config, config.currency.clone());
    let bankroll = ledger.ensure_bankroll(&config.user_id, config.initial_bankroll)?;
    info!(
        "Bankroll for {}: {:.2} {} (peak {:.2})",
        config.user_id, bankroll.current_bankroll, bankroll.currency, bankroll.peak_bankroll
    );

    // Prediction engine and result sync
    let engine_config = EngineConfig {
        lookahead_hours: config.lookahead_hours,
        fixture_cap: config.fixture_cap,
        ..EngineConfig::default()
    };
    let engine = Arc::new(PredictionEngine::new(
        db.clone(),
        provider.clone(),
        engine_config,
    ));
    let syncer = Arc::new(ResultsSyncer::new(
        db.clone(),
        provider.clone(),
        ledger.clone(),
    ));

    // Optional scheduler: run cycle + result sync every N minutes. The engine
    // itself rejects overlapping cycles, so a slow run just skips a tick.
    if config.cycle_interval_mins > 0 {
        let engine = engine.clone();
        let syncer = syncer.clone();
        let every = Duration::from_secs(config.cycle_interval_mins * 60);
        info!("Scheduler enabled: every {} min", config.cycle_interval_mins);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = engine.run_cycle().await {
                    error!("Scheduled engine cycle failed: {}", e);
                }
                if let Err(e) = syncer.sync().await {
                    error!("Scheduled result sync failed: {}", e);
                }
            }
        });
    }

    // API server (blocks until shutdown)
    let state = AppState {
        db,
        engine,
        syncer,
        ledger,
        user_id: config.user_id.clone(),
        default_policy,
        initial_bankroll: config.initial_bankroll,
    };
    let app = server::router(state);
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
