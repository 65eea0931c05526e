//! Range report output

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Barcode, Totals};

/// Revenue, profit and quantity for one barcode over a time window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub barcode: Barcode,
    pub revenue: i64,
    pub net_profit: i64,
    pub quantity: i64,
    pub margin_percent: Option<Decimal>,
}

impl Report {
    pub fn from_totals(barcode: Barcode, totals: Totals) -> Self {
        Self {
            barcode,
            revenue: totals.revenue,
            net_profit: totals.net_profit,
            quantity: totals.quantity,
            margin_percent: margin_percent(totals.net_profit, totals.revenue),
        }
    }
}

/// Net profit as a percentage of revenue, rounded to two places
pub fn margin_percent(net_profit: i64, revenue: i64) -> Option<Decimal> {
    if revenue == 0 {
        return None;
    }
    let margin = Decimal::from(net_profit) * Decimal::ONE_HUNDRED / Decimal::from(revenue);
    Some(margin.round_dp(2))
}
