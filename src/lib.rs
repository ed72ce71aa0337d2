use std::sync::Arc;

use anyhow::Context;
use tracing::info;

pub mod api;
pub mod config;
pub mod model;
pub mod service;
pub mod storage;

use config::{Config, StoreBackend, StoreConfig};
use service::ObservationService;
use storage::{MemoryStore, ObservationStore, SqliteStore};

pub struct AppState {
    pub service: ObservationService,
}

impl AppState {
    pub fn new(service: ObservationService) -> Self {
        Self { service }
    }
}

/// Builds the store selected by `config`.
pub fn open_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn ObservationStore>> {
    let store: Arc<dyn ObservationStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(
            SqliteStore::open(&config.sqlite_path, config.timeout())
                .with_context(|| format!("failed to open {}", config.sqlite_path.display()))?,
        ),
    };
    info!(backend = ?config.backend, "observation store ready");
    Ok(store)
}

pub async fn run_server() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load config")?;
    let store = open_store(&config.store)?;
    let state = Arc::new(AppState::new(ObservationService::new(store)));

    // broadcast channel for shutdown signaling
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let http_state = state.clone();
    let http_shutdown = shutdown_tx.clone();
    let mut server = tokio::spawn(async move {
        api::http::run(http_state, config.http, http_shutdown).await
    });

    // wait for CTRL-C (or an early server exit) then signal shutdown
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("shutdown requested");
            let _ = shutdown_tx.send(());
            server.await??;
        }
        res = &mut server => {
            res??;
        }
    }
    Ok(())
}
