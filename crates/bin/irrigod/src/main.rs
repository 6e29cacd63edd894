//! # irrigod: irrigation controller daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Load configuration (`irrigo.toml`, env vars)
//! - Initialize tracing
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repositories, the relay driver and the engine
//! - Recover from an interrupted run before serving
//! - Spawn the scheduler tick and the event recorder
//! - Bind to a TCP port and serve until SIGINT/SIGTERM, then close every valve
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use irrigo_adapter_http_axum::router;
use irrigo_adapter_http_axum::state::AppState;
use irrigo_adapter_storage_sqlite_sqlx::{
    Config as StorageConfig, SqliteEventStore, SqliteExecutionStateStore,
    SqliteProgramRepository, SqliteSettingsRepository,
};
use irrigo_adapter_virtual::VirtualZoneDriver;
use irrigo_app::engine::Engine;
use irrigo_app::event_bus::InProcessEventBus;
use irrigo_app::services::program_service::ProgramService;
use irrigo_app::services::settings_service::SettingsService;
use irrigo_app::{event_recorder, ticker};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = StorageConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let pool = db.pool().clone();

    // Event log
    let event_bus = Arc::new(InProcessEventBus::new(256));
    let event_store = Arc::new(SqliteEventStore::new(pool.clone()));
    let recorder = event_recorder::spawn(event_bus.subscribe(), Arc::clone(&event_store));

    // Engine
    let driver = VirtualZoneDriver::new().with_latency(config.driver_latency());
    let engine = Arc::new(Engine::new(
        driver,
        ProgramService::new(SqliteProgramRepository::new(pool.clone())),
        SettingsService::new(SqliteSettingsRepository::new(pool.clone())),
        SqliteExecutionStateStore::new(pool),
        Arc::clone(&event_bus),
        config.engine_config()?,
    ));
    engine.recover().await?;
    let ticker = ticker::spawn(Arc::clone(&engine), config.tick_interval());

    // HTTP
    let state = AppState::from_arcs(Arc::clone(&engine), event_store);
    let app = router::build(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "irrigod listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ticker.abort();
    if let Err(err) = engine.stop_program().await {
        tracing::error!(error = %err, "failed to close valves on shutdown");
    }
    recorder.abort();
    db.close().await;
    tracing::info!("irrigod stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown requested");
}
