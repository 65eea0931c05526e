//! HTTP handlers for sale endpoints

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::error::{AppError, AppResult};
use crate::models::{CreateSaleInput, PaginatedResponse, PaginationMeta, Sale, UpdateSaleInput};
use crate::AppState;

use super::query::{export_to_csv, ListQuery};

/// List sales ordered by time
pub async fn list_sales(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let filter = query.filter()?;
    let pagination = query.pagination()?;
    let (data, total) = state.store.list_sales(&filter, &pagination).await?;

    if query.wants_csv() {
        let csv = export_to_csv(&data)?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"sales.csv\""),
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

/// Record a sale
pub async fn create_sale(
    State(state): State<AppState>,
    Json(input): Json<CreateSaleInput>,
) -> AppResult<Json<Sale>> {
    let sale = state.ledger_service().create_sale(input).await?;
    Ok(Json(sale))
}

/// Get a sale with its running totals
pub async fn get_sale(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Sale>> {
    let sale = state
        .store
        .get_sale(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;
    Ok(Json(sale))
}

/// Replace a sale's quantity, price and time
pub async fn update_sale(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateSaleInput>,
) -> AppResult<Json<Sale>> {
    if !input.is_complete() {
        return Err(AppError::ValidationError(
            "quantity, price and sale_time are all required; use PATCH for partial updates"
                .to_string(),
        ));
    }
    let sale = state.ledger_service().update_sale(id, input).await?;
    Ok(Json(sale))
}

/// Change any subset of a sale's quantity, price and time
pub async fn patch_sale(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateSaleInput>,
) -> AppResult<Json<Sale>> {
    let sale = state.ledger_service().update_sale(id, input).await?;
    Ok(Json(sale))
}

/// Delete a sale
pub async fn delete_sale(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Sale>> {
    let sale = state.ledger_service().delete_sale(id).await?;
    Ok(Json(sale))
}
