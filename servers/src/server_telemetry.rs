mod telemetry_logic;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use lib_common::connections::db_postgres::Database;
use telemetry_logic::state::AppState;
use telemetry_logic::store::RecordStore;
use telemetry_logic::{config, http_api, logger};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    logger::setup_logging(&config.log_dir, &config.log_level)?;
    log::info!("Starting telemetry server");

    let db_url = config
        .db_url
        .clone()
        .context("DATABASE_URL is not set; provide it via environment, config file, or --db-url")?;

    let db = Database::new(&db_url, config.db_pool_size)
        .context("Failed to configure the database pool")?;
    db.ping().await.context("Database is unreachable")?;

    let store = RecordStore::new(db);
    store
        .ensure_schema()
        .await
        .context("Failed to prepare the sensor_records table")?;
    log::info!("Database ready");

    let state = AppState::new(store, config.broadcast_capacity);

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let mut server_handle = tokio::spawn({
        let config = config.clone();
        async move { http_api::run(&config, state, shutdown_rx).await }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received Ctrl-C, shutting down");
            false
        }
        _ = sigterm.recv() => {
            log::info!("Received SIGTERM, shutting down");
            false
        }
        result = &mut server_handle => {
            result??;
            true
        }
    };

    if !finished {
        let _ = shutdown_tx.send(());
        server_handle.await??;
    }

    log::info!("Telemetry server stopped");
    Ok(())
}
