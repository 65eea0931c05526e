//! Sale records and their running totals

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::{time_format, Barcode, LotCursor, Position, Totals};

/// An outgoing sale.
///
/// The `total_*` fields, the cursor columns and `backorder_quantity` are
/// derived by the matching engine and never accepted from clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub barcode: Barcode,
    pub quantity: i32,
    /// Unit price in the smallest currency unit
    pub price: i32,
    #[serde(with = "time_format")]
    pub sale_time: NaiveDateTime,
    pub total_quantity: i64,
    pub total_revenue: i64,
    pub total_net_profit: i64,
    pub last_matched_supply_id: Option<i64>,
    pub lms_remaining_quantity: Option<i64>,
    pub backorder_quantity: i64,
    pub supply_exhausted: bool,
}

impl Sale {
    pub fn position(&self) -> Position {
        Position::new(self.sale_time, self.id)
    }

    pub fn totals(&self) -> Totals {
        Totals {
            quantity: self.total_quantity,
            revenue: self.total_revenue,
            net_profit: self.total_net_profit,
        }
    }

    pub fn cursor(&self) -> LotCursor {
        LotCursor::from_columns(
            self.last_matched_supply_id,
            self.lms_remaining_quantity,
            self.supply_exhausted,
        )
    }
}

/// Input for recording a sale
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateSaleInput {
    pub barcode: Barcode,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: i32,
    #[serde(with = "time_format")]
    pub sale_time: NaiveDateTime,
}

/// Input for updating a sale. The barcode cannot change.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateSaleInput {
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: Option<i32>,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: Option<i32>,
    #[serde(with = "time_format::option", default)]
    pub sale_time: Option<NaiveDateTime>,
}

impl UpdateSaleInput {
    pub fn is_complete(&self) -> bool {
        self.quantity.is_some() && self.price.is_some() && self.sale_time.is_some()
    }
}

/// Derived columns written back for one sale after a matching pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleTotalsUpdate {
    pub sale_id: i64,
    pub totals: Totals,
    pub cursor: LotCursor,
    pub backorder_quantity: i64,
}

impl SaleTotalsUpdate {
    pub fn apply_to(&self, sale: &mut Sale) {
        let (last_matched, remaining, exhausted) = self.cursor.to_columns();
        sale.total_quantity = self.totals.quantity;
        sale.total_revenue = self.totals.revenue;
        sale.total_net_profit = self.totals.net_profit;
        sale.last_matched_supply_id = last_matched;
        sale.lms_remaining_quantity = remaining;
        sale.supply_exhausted = exhausted;
        sale.backorder_quantity = self.backorder_quantity;
    }
}
