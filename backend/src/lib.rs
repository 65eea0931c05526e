//! FIFO Sales Ledger
//!
//! Keeps per-barcode running totals of revenue, net profit and quantity,
//! matching sales against supply lots first-in first-out. Any insert,
//! update or delete repairs only the affected suffix of the history, and
//! range reports are the difference of two stored totals.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use services::{LedgerService, SkuLocks};
use store::EventStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub config: Arc<Config>,
    pub locks: SkuLocks,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
            locks: SkuLocks::new(),
        }
    }

    pub fn ledger_service(&self) -> LedgerService {
        LedgerService::new(self.store.clone(), self.locks.clone(), self.config.ledger)
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "FIFO Sales Ledger API v1.0"
}
