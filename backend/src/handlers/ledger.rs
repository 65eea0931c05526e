//! Ledger maintenance handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::AppResult;
use crate::services::PassSummary;
use crate::AppState;

/// Recompute every running total of a barcode from scratch
pub async fn rebuild_ledger(
    State(state): State<AppState>,
    Path(barcode): Path<i64>,
) -> AppResult<Json<PassSummary>> {
    let summary = state.ledger_service().rebuild(barcode).await?;
    Ok(Json(summary))
}
