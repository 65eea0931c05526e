//! Route definitions for the FIFO ledger API

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/reports", get(handlers::get_report))
        .nest("/sales", sale_routes())
        .nest("/supplies", supply_routes())
        .route("/ledger/:barcode/rebuild", post(handlers::rebuild_ledger))
}

/// Sale routes
fn sale_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sales).post(handlers::create_sale))
        .route(
            "/:id",
            get(handlers::get_sale)
                .put(handlers::update_sale)
                .patch(handlers::patch_sale)
                .delete(handlers::delete_sale),
        )
}

/// Supply lot routes
fn supply_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_supplies).post(handlers::create_supply))
        .route(
            "/:id",
            get(handlers::get_supply)
                .put(handlers::update_supply)
                .patch(handlers::patch_supply)
                .delete(handlers::delete_supply),
        )
}
