//! Common types used across the ledger

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SKU key. Every sale, supply and running total is scoped to one barcode.
pub type Barcode = i64;

/// Wire format for all timestamps, both directions
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid timestamp `{input}`, expected YYYY-MM-DD HH:MM:SS")]
pub struct ParseTimeError {
    pub input: String,
}

/// Parse a timestamp in the ledger's wire format
pub fn parse_time(input: &str) -> Result<NaiveDateTime, ParseTimeError> {
    NaiveDateTime::parse_from_str(input.trim(), TIME_FORMAT).map_err(|_| ParseTimeError {
        input: input.to_string(),
    })
}

/// Serde adapter for `NaiveDateTime` fields in the wire format
pub mod time_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(super::TIME_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(serde::de::Error::custom)
    }

    /// Same format for optional fields (PATCH payloads)
    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(v) => serializer.collect_str(&v.format(super::super::TIME_FORMAT)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::super::parse_time(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Position of an event inside its SKU's history.
///
/// Timestamps are not unique, so the store-assigned id breaks ties. The
/// derived ordering compares `time` first, then `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    #[serde(with = "time_format")]
    pub time: NaiveDateTime,
    pub id: i64,
}

impl Position {
    pub fn new(time: NaiveDateTime, id: i64) -> Self {
        Self { time, id }
    }

    /// Lowest position at a timestamp, used to scan from a bare time
    pub fn start_of(time: NaiveDateTime) -> Self {
        Self { time, id: i64::MIN }
    }
}

/// Where an ordered scan begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFrom {
    /// The whole history of the SKU
    Start,
    /// `time > t OR (time == t AND id >= id0)`
    AtOrAfter(Position),
    /// `time > t OR (time == t AND id > id0)`
    After(Position),
}

impl ScanFrom {
    pub fn admits(&self, position: Position) -> bool {
        match self {
            ScanFrom::Start => true,
            ScanFrom::AtOrAfter(from) => position >= *from,
            ScanFrom::After(from) => position > *from,
        }
    }
}

/// Cumulative sums carried from sale to sale
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub quantity: i64,
    pub revenue: i64,
    pub net_profit: i64,
}

impl Totals {
    pub const ZERO: Totals = Totals {
        quantity: 0,
        revenue: 0,
        net_profit: 0,
    };
}

impl Totals {
    /// Sum of two totals, `None` if any column leaves the `i64` range
    pub fn checked_add(self, rhs: Totals) -> Option<Totals> {
        Some(Totals {
            quantity: self.quantity.checked_add(rhs.quantity)?,
            revenue: self.revenue.checked_add(rhs.revenue)?,
            net_profit: self.net_profit.checked_add(rhs.net_profit)?,
        })
    }

    pub fn checked_sub(self, rhs: Totals) -> Option<Totals> {
        Some(Totals {
            quantity: self.quantity.checked_sub(rhs.quantity)?,
            revenue: self.revenue.checked_sub(rhs.revenue)?,
            net_profit: self.net_profit.checked_sub(rhs.net_profit)?,
        })
    }

    /// Contribution of `quantity` units sold at `price` against a unit cost
    pub fn of_units(quantity: i64, price: i64, unit_cost: i64) -> Option<Totals> {
        Some(Totals {
            quantity,
            revenue: price.checked_mul(quantity)?,
            net_profit: price.checked_sub(unit_cost)?.checked_mul(quantity)?,
        })
    }
}

/// Running totals no longer fit in 64 bits
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("running totals exceed the 64-bit range")]
pub struct TotalsOverflow;

/// Lot state a sale left behind, as stored on the sale row.
///
/// Stored as three columns: `last_matched_supply_id`,
/// `lms_remaining_quantity` and `supply_exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LotCursor {
    /// No lot has been drawn yet
    Fresh,
    /// A lot is in flight with `remaining` units left (possibly zero)
    Open { supply_id: i64, remaining: i64 },
    /// The supply stream ran dry
    Exhausted,
}

impl LotCursor {
    pub fn from_columns(
        last_matched_supply_id: Option<i64>,
        lms_remaining_quantity: Option<i64>,
        supply_exhausted: bool,
    ) -> Self {
        match (last_matched_supply_id, supply_exhausted) {
            (Some(supply_id), false) => LotCursor::Open {
                supply_id,
                remaining: lms_remaining_quantity.unwrap_or(0),
            },
            (_, true) => LotCursor::Exhausted,
            (None, false) => LotCursor::Fresh,
        }
    }

    /// `(last_matched_supply_id, lms_remaining_quantity, supply_exhausted)`
    pub fn to_columns(self) -> (Option<i64>, Option<i64>, bool) {
        match self {
            LotCursor::Fresh => (None, None, false),
            LotCursor::Open { supply_id, remaining } => (Some(supply_id), Some(remaining), false),
            LotCursor::Exhausted => (None, None, true),
        }
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 100,
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationMeta {
    pub fn new(pagination: &Pagination, total_items: u64) -> Self {
        let per_page = pagination.per_page.max(1);
        Self {
            page: pagination.page,
            per_page,
            total_items,
            total_pages: total_items.div_ceil(u64::from(per_page)) as u32,
        }
    }
}

/// Inclusive time range for listings
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "time_format::option", default)]
    pub from: Option<NaiveDateTime>,
    #[serde(with = "time_format::option", default)]
    pub to: Option<NaiveDateTime>,
}

impl TimeRange {
    pub fn contains(&self, time: NaiveDateTime) -> bool {
        self.from.map_or(true, |from| time >= from) && self.to.map_or(true, |to| time <= to)
    }
}
