//! WebAssembly module for the FIFO Sales Ledger
//!
//! Provides client-side computation for:
//! - Previewing running totals before events are submitted
//! - Range reports over a previewed history
//! - Offline input validation

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use shared::fifo::simulate;
use shared::types::time_format;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

/// A sale as entered on the client, before the server assigns totals
#[derive(Debug, Clone, Deserialize)]
pub struct DraftSale {
    pub id: i64,
    pub quantity: i32,
    pub price: i32,
    #[serde(with = "time_format")]
    pub sale_time: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftSupply {
    pub id: i64,
    pub quantity: i32,
    pub price: i32,
    #[serde(with = "time_format")]
    pub supply_time: NaiveDateTime,
}

/// Running totals after one previewed sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewRow {
    pub id: i64,
    #[serde(with = "time_format")]
    pub sale_time: NaiveDateTime,
    pub total_quantity: i64,
    pub total_revenue: i64,
    pub total_net_profit: i64,
    pub backorder_quantity: i64,
    pub cursor: LotCursor,
}

fn into_sale(draft: &DraftSale) -> Sale {
    Sale {
        id: draft.id,
        barcode: 0,
        quantity: draft.quantity,
        price: draft.price,
        sale_time: draft.sale_time,
        total_quantity: 0,
        total_revenue: 0,
        total_net_profit: 0,
        last_matched_supply_id: None,
        lms_remaining_quantity: None,
        backorder_quantity: 0,
        supply_exhausted: false,
    }
}

fn into_supply(draft: &DraftSupply) -> Supply {
    Supply {
        id: draft.id,
        barcode: 0,
        quantity: draft.quantity,
        price: draft.price,
        supply_time: draft.supply_time,
        first_matched_sale_id: None,
    }
}

fn preview(sales_json: &str, supplies_json: &str) -> Result<Vec<PreviewRow>, String> {
    let sales: Vec<DraftSale> =
        serde_json::from_str(sales_json).map_err(|e| format!("Invalid sales JSON: {}", e))?;
    let supplies: Vec<DraftSupply> =
        serde_json::from_str(supplies_json).map_err(|e| format!("Invalid supplies JSON: {}", e))?;

    for sale in &sales {
        validate_quantity(sale.quantity).map_err(|m| format!("sale {}: {}", sale.id, m))?;
        validate_unit_amount(sale.price).map_err(|m| format!("sale {}: {}", sale.id, m))?;
    }
    for supply in &supplies {
        validate_quantity(supply.quantity).map_err(|m| format!("supply {}: {}", supply.id, m))?;
        validate_unit_amount(supply.price).map_err(|m| format!("supply {}: {}", supply.id, m))?;
    }

    let sales: Vec<Sale> = sales.iter().map(into_sale).collect();
    let supplies: Vec<Supply> = supplies.iter().map(into_supply).collect();

    Ok(simulate(&sales, &supplies)
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|(sale, settled)| PreviewRow {
            id: sale.id,
            sale_time: sale.sale_time,
            total_quantity: settled.totals.quantity,
            total_revenue: settled.totals.revenue,
            total_net_profit: settled.totals.net_profit,
            backorder_quantity: settled.backorder_quantity,
            cursor: settled.cursor,
        })
        .collect())
}

fn report(
    barcode: Barcode,
    sales_json: &str,
    supplies_json: &str,
    from: &str,
    to: &str,
) -> Result<Report, String> {
    let from = parse_time(from).map_err(|e| e.to_string())?;
    let to = parse_time(to).map_err(|e| e.to_string())?;
    validate_time_range(from, to)?;

    let rows = preview(sales_json, supplies_json)?;
    let totals_of = |row: &PreviewRow| Totals {
        quantity: row.total_quantity,
        revenue: row.total_revenue,
        net_profit: row.total_net_profit,
    };
    // rows are in (time, id) order, so the last match is the boundary
    let upper = rows
        .iter()
        .filter(|row| row.sale_time <= to)
        .last()
        .map(totals_of)
        .unwrap_or(Totals::ZERO);
    let lower = rows
        .iter()
        .filter(|row| row.sale_time < from)
        .last()
        .map(totals_of)
        .unwrap_or(Totals::ZERO);

    let window = upper
        .checked_sub(lower)
        .ok_or_else(|| TotalsOverflow.to_string())?;
    Ok(Report::from_totals(barcode, window))
}

fn js_error(message: String) -> JsValue {
    js_sys::Error::new(&message).into()
}

/// Replay a sales and supplies history and return per-sale running totals
/// as JSON
#[wasm_bindgen]
pub fn simulate_ledger(sales_json: &str, supplies_json: &str) -> Result<String, JsValue> {
    let rows = preview(sales_json, supplies_json).map_err(js_error)?;
    serde_json::to_string(&rows).map_err(|e| js_error(e.to_string()))
}

/// Range report over a previewed history, both bounds inclusive
#[wasm_bindgen]
pub fn report_between(
    barcode: i64,
    sales_json: &str,
    supplies_json: &str,
    from_time: &str,
    to_time: &str,
) -> Result<String, JsValue> {
    let report = report(barcode, sales_json, supplies_json, from_time, to_time).map_err(js_error)?;
    serde_json::to_string(&report).map_err(|e| js_error(e.to_string()))
}

/// Validate a timestamp in the ledger's wire format
#[wasm_bindgen]
pub fn is_valid_time(input: &str) -> bool {
    parse_time(input).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPLIES: &str = r#"[
        {"id": 1, "quantity": 10, "price": 5, "supply_time": "2024-01-01 08:00:00"},
        {"id": 2, "quantity": 10, "price": 7, "supply_time": "2024-01-03 08:00:00"}
    ]"#;

    const SALES: &str = r#"[
        {"id": 1, "quantity": 15, "price": 10, "sale_time": "2024-01-02 08:00:00"},
        {"id": 2, "quantity": 2, "price": 12, "sale_time": "2024-01-04 08:00:00"}
    ]"#;

    #[test]
    fn test_preview_running_totals() {
        let rows = preview(SALES, SUPPLIES).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].total_revenue, 150);
        assert_eq!(rows[0].total_net_profit, 65);
        assert_eq!(
            rows[0].cursor,
            LotCursor::Open {
                supply_id: 2,
                remaining: 5
            }
        );
        assert_eq!(rows[1].total_quantity, 17);
        assert_eq!(rows[1].total_revenue, 174);
        assert_eq!(rows[1].total_net_profit, 75);
    }

    #[test]
    fn test_report_window() {
        let only_second =
            report(7, SALES, SUPPLIES, "2024-01-03 00:00:00", "2024-01-31 00:00:00").unwrap();
        assert_eq!(only_second.barcode, 7);
        assert_eq!(only_second.quantity, 2);
        assert_eq!(only_second.revenue, 24);
        assert_eq!(only_second.net_profit, 10);

        let before_everything =
            report(7, SALES, SUPPLIES, "2023-01-01 00:00:00", "2023-12-31 00:00:00").unwrap();
        assert_eq!(before_everything.revenue, 0);
        assert_eq!(before_everything.margin_percent, None);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(preview("not json", SUPPLIES).is_err());
        assert!(preview(
            r#"[{"id": 1, "quantity": 0, "price": 1, "sale_time": "2024-01-01 00:00:00"}]"#,
            "[]"
        )
        .is_err());
        assert!(report(1, SALES, SUPPLIES, "2024-02-01 00:00:00", "2024-01-01 00:00:00").is_err());
    }

    #[test]
    fn test_overflowing_history_is_an_error() {
        let huge: Vec<String> = (1..=3)
            .map(|id| {
                format!(
                    r#"{{"id": {}, "quantity": {}, "price": {}, "sale_time": "2024-01-0{} 00:00:00"}}"#,
                    id,
                    i32::MAX,
                    i32::MAX,
                    id
                )
            })
            .collect();
        let sales = format!("[{}]", huge.join(","));

        let error = preview(&sales, "[]").unwrap_err();
        assert_eq!(error, TotalsOverflow.to_string());
    }

    #[test]
    fn test_is_valid_time() {
        assert!(is_valid_time("2024-05-06 07:08:09"));
        assert!(!is_valid_time("2024-05-06"));
    }
}
