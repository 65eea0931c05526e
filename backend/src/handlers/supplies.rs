//! HTTP handlers for supply lot endpoints

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::error::{AppError, AppResult};
use crate::models::{CreateSupplyInput, PaginatedResponse, PaginationMeta, Supply, UpdateSupplyInput};
use crate::AppState;

use super::query::{export_to_csv, ListQuery};

/// List supply lots ordered by time
pub async fn list_supplies(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let filter = query.filter()?;
    let pagination = query.pagination()?;
    let (data, total) = state.store.list_supplies(&filter, &pagination).await?;

    if query.wants_csv() {
        let csv = export_to_csv(&data)?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"supplies.csv\""),
            ],
            csv,
        )
            .into_response())
    } else {
        Ok(Json(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total),
        })
        .into_response())
    }
}

/// Record a supply lot
pub async fn create_supply(
    State(state): State<AppState>,
    Json(input): Json<CreateSupplyInput>,
) -> AppResult<Json<Supply>> {
    let supply = state.ledger_service().create_supply(input).await?;
    Ok(Json(supply))
}

pub async fn get_supply(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Supply>> {
    let supply = state
        .store
        .get_supply(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Supply".to_string()))?;
    Ok(Json(supply))
}

/// Replace a lot's quantity, cost and time
pub async fn update_supply(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateSupplyInput>,
) -> AppResult<Json<Supply>> {
    if !input.is_complete() {
        return Err(AppError::ValidationError(
            "quantity, price and supply_time are all required; use PATCH for partial updates"
                .to_string(),
        ));
    }
    let supply = state.ledger_service().update_supply(id, input).await?;
    Ok(Json(supply))
}

pub async fn patch_supply(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateSupplyInput>,
) -> AppResult<Json<Supply>> {
    let supply = state.ledger_service().update_supply(id, input).await?;
    Ok(Json(supply))
}

/// Delete a supply lot
pub async fn delete_supply(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Supply>> {
    let supply = state.ledger_service().delete_supply(id).await?;
    Ok(Json(supply))
}
