//! DJ set prep engine library: shared `AppState` and router assembly for
//! the HTTP API, plus every component module consumed by `main.rs` and
//! the integration tests.

pub mod analyzer_client;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod model;
pub mod planner;
pub mod scanner;
pub mod scheduler;

pub use crate::error::{EngineError, EngineResult};

use crate::analyzer_client::AnalyzerClient;
use crate::config::Config;
use crate::db::content_store::ContentStore;
use crate::scheduler::Scheduler;
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared application state for every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub store: ContentStore,
    pub scheduler: Arc<Scheduler>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        store: ContentStore,
        analyzer: Arc<dyn AnalyzerClient>,
        config: Config,
    ) -> Self {
        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let scheduler = Arc::new(Scheduler::new(
            pool.clone(),
            store.clone(),
            analyzer,
            concurrency,
            512 * 1024 * 1024,
        ));
        Self {
            pool,
            store,
            scheduler,
            config: Arc::new(config),
        }
    }
}

/// Assembles every `/api/v1` route plus `/healthz`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health::routes())
        .nest("/api/v1", api::v1_routes())
        .with_state(state)
}
