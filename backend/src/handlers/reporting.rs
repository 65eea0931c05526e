//! Range report handler

use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::{AppError, AppResult};
use crate::models::{parse_barcode, Report};
use crate::services::ReportingService;
use crate::AppState;

use super::query::{required, required_time, ReportQuery};

/// Totals for sales with `fromTime <= sale_time <= toTime`
pub async fn get_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<Report>> {
    let barcode = parse_barcode(required("barcode", query.barcode.as_deref())?)
        .map_err(|m| AppError::validation("barcode", m))?;
    let from = required_time("fromTime", query.from_time.as_deref())?;
    let to = required_time("toTime", query.to_time.as_deref())?;

    let service = ReportingService::new(state.store.clone());
    let report = service.report(barcode, from, to).await?;
    Ok(Json(report))
}
