//! Range reports
//!
//! A report is the difference of two stored prefix sums, so it costs two
//! indexed lookups no matter how wide the window is.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::error::{AppError, AppResult};
use crate::models::{validate_barcode, validate_time_range, Barcode, Report, Totals};
use crate::store::EventStore;

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn EventStore>,
}

impl ReportingService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Revenue, net profit and quantity of sales with `from <= time <= to`
    pub async fn report(
        &self,
        barcode: Barcode,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> AppResult<Report> {
        validate_barcode(barcode).map_err(|m| AppError::validation("barcode", m))?;
        validate_time_range(from, to).map_err(|m| AppError::validation("fromTime", m))?;

        let upper = self
            .store
            .last_sale_at_or_before(barcode, to)
            .await?
            .map(|sale| sale.totals())
            .unwrap_or(Totals::ZERO);
        let lower = self
            .store
            .last_sale_before(barcode, from)
            .await?
            .map(|sale| sale.totals())
            .unwrap_or(Totals::ZERO);

        let window = upper.checked_sub(lower).ok_or_else(|| {
            AppError::ConsistencyViolation(format!(
                "prefix sums for barcode {} cannot be subtracted",
                barcode
            ))
        })?;
        Ok(Report::from_totals(barcode, window))
    }
}
