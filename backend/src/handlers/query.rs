//! Query-string parsing and CSV output shared by the listing and report
//! endpoints

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{parse_barcode, parse_time, validate_page_size, Pagination, TimeRange};
use crate::store::EventFilter;

/// Filters accepted by `GET /sales` and `GET /supplies`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub barcode: Option<String>,
    #[serde(rename = "fromTime")]
    pub from_time: Option<String>,
    #[serde(rename = "toTime")]
    pub to_time: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub format: Option<String>, // "json" or "csv"
}

impl ListQuery {
    pub fn filter(&self) -> AppResult<EventFilter> {
        let barcode = self
            .barcode
            .as_deref()
            .map(|raw| parse_barcode(raw).map_err(|m| AppError::validation("barcode", m)))
            .transpose()?;
        let range = TimeRange {
            from: optional_time("fromTime", self.from_time.as_deref())?,
            to: optional_time("toTime", self.to_time.as_deref())?,
        };
        if let (Some(from), Some(to)) = (range.from, range.to) {
            if from > to {
                return Err(AppError::validation("fromTime", "fromTime must not be after toTime"));
            }
        }
        Ok(EventFilter { barcode, range })
    }

    pub fn pagination(&self) -> AppResult<Pagination> {
        let defaults = Pagination::default();
        let per_page = self.per_page.unwrap_or(defaults.per_page);
        validate_page_size(per_page).map_err(|m| AppError::validation("per_page", m))?;
        Ok(Pagination {
            page: self.page.unwrap_or(defaults.page).max(1),
            per_page,
        })
    }

    pub fn wants_csv(&self) -> bool {
        self.format.as_deref() == Some("csv")
    }
}

/// Parameters of `GET /reports`
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub barcode: Option<String>,
    #[serde(rename = "fromTime")]
    pub from_time: Option<String>,
    #[serde(rename = "toTime")]
    pub to_time: Option<String>,
}

pub fn required<'a>(field: &str, value: Option<&'a str>) -> AppResult<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::validation(field, format!("{} is required", field))),
    }
}

pub fn required_time(field: &str, value: Option<&str>) -> AppResult<NaiveDateTime> {
    let raw = required(field, value)?;
    parse_time(raw).map_err(|e| AppError::validation(field, e.to_string()))
}

/// Serialize listed rows as CSV with a header row
pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in data {
        wtr.serialize(record)
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
}

fn optional_time(field: &str, value: Option<&str>) -> AppResult<Option<NaiveDateTime>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|raw| parse_time(raw).map_err(|e| AppError::validation(field, e.to_string())))
        .transpose()
}
