//! Supply lots

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::{time_format, Barcode, Position};

/// An incoming supply lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supply {
    pub id: i64,
    pub barcode: Barcode,
    pub quantity: i32,
    /// Unit cost in the smallest currency unit
    pub price: i32,
    #[serde(with = "time_format")]
    pub supply_time: NaiveDateTime,
    /// Earliest sale that drew from this lot. A hint only; the sale-side
    /// cursors are authoritative.
    pub first_matched_sale_id: Option<i64>,
}

impl Supply {
    pub fn position(&self) -> Position {
        Position::new(self.supply_time, self.id)
    }
}

/// Input for recording a supply lot
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateSupplyInput {
    pub barcode: Barcode,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: i32,
    #[serde(with = "time_format")]
    pub supply_time: NaiveDateTime,
}

/// Input for updating a supply lot. The barcode cannot change.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateSupplyInput {
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: Option<i32>,
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: Option<i32>,
    #[serde(with = "time_format::option", default)]
    pub supply_time: Option<NaiveDateTime>,
}

impl UpdateSupplyInput {
    pub fn is_complete(&self) -> bool {
        self.quantity.is_some() && self.price.is_some() && self.supply_time.is_some()
    }
}
