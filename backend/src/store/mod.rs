//! Event store: persistence for sales and supply lots
//!
//! The matching core only talks to storage through [`LedgerTx`], a unit of
//! work scoped to one barcode. Everything a pass reads and writes goes
//! through the same transaction, so readers of committed data see either
//! the whole pass or none of it.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::AppResult;
use crate::models::{Barcode, Pagination, Position, Sale, SaleTotalsUpdate, ScanFrom, Supply, TimeRange};

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

/// Client-owned fields of a sale or supply row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFields {
    pub quantity: i32,
    pub price: i32,
    pub time: NaiveDateTime,
}

/// Listing filter
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFilter {
    pub barcode: Option<Barcode>,
    pub range: TimeRange,
}

/// `first_matched_sale_id` value to write for a supply; `None` clears it
pub type SupplyHint = (i64, Option<i64>);

/// Earliest sale of the trailing run of `newest_first` that satisfies
/// `reaches`.
///
/// Cursor lots never move backwards along sale order and exhaustion is
/// sticky, so the sales that reach a given lot form a suffix. The walk stops
/// at the first sale that does not reach.
pub fn earliest_of_trailing_run<T, I, F>(newest_first: I, mut reaches: F) -> Option<T>
where
    I: IntoIterator<Item = T>,
    F: FnMut(&T) -> bool,
{
    newest_first.into_iter().take_while(|sale| reaches(sale)).last()
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Open a unit of work for one barcode. Holds that barcode's write lock
    /// until commit or drop; dropping without commit rolls back.
    async fn begin(&self, barcode: Barcode) -> AppResult<Box<dyn LedgerTx>>;

    async fn get_sale(&self, id: i64) -> AppResult<Option<Sale>>;

    async fn get_supply(&self, id: i64) -> AppResult<Option<Supply>>;

    /// Page of sales ordered by (time, id) plus the total match count
    async fn list_sales(&self, filter: &EventFilter, page: &Pagination) -> AppResult<(Vec<Sale>, u64)>;

    async fn list_supplies(
        &self,
        filter: &EventFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<Supply>, u64)>;

    /// Greatest (time, id) sale with `sale_time <= time`
    async fn last_sale_at_or_before(
        &self,
        barcode: Barcode,
        time: NaiveDateTime,
    ) -> AppResult<Option<Sale>>;

    /// Greatest (time, id) sale with `sale_time < time`
    async fn last_sale_before(&self, barcode: Barcode, time: NaiveDateTime) -> AppResult<Option<Sale>>;

    /// Connectivity probe for health checks
    async fn ping(&self) -> AppResult<()>;
}

/// Reads and writes for one barcode inside one transaction
#[async_trait]
pub trait LedgerTx: Send {
    fn barcode(&self) -> Barcode;

    /// Up to `limit` sales admitted by `from`, ordered by (time, id)
    async fn scan_sales(&mut self, from: ScanFrom, limit: usize) -> AppResult<Vec<Sale>>;

    /// Up to `limit` supplies admitted by `from`, ordered by (time, id)
    async fn scan_supplies(&mut self, from: ScanFrom, limit: usize) -> AppResult<Vec<Supply>>;

    async fn sale(&mut self, id: i64) -> AppResult<Option<Sale>>;

    async fn supply(&mut self, id: i64) -> AppResult<Option<Supply>>;

    async fn latest_sale(&mut self) -> AppResult<Option<Sale>>;

    async fn latest_supply(&mut self) -> AppResult<Option<Supply>>;

    /// Greatest sale strictly before `position`
    async fn sale_before(&mut self, position: Position) -> AppResult<Option<Sale>>;

    /// Earliest sale whose stored cursor reaches a lot at or after
    /// `supply_position`, names a lot that no longer exists, or settled
    /// with the supply stream exhausted.
    ///
    /// Walks back from the latest sale; `None` after one look when the
    /// latest sale does not reach.
    async fn first_sale_reaching(&mut self, supply_position: Position) -> AppResult<Option<Sale>>;

    async fn insert_sale(&mut self, fields: EventFields) -> AppResult<Sale>;

    async fn update_sale(&mut self, id: i64, fields: EventFields) -> AppResult<Option<Sale>>;

    async fn delete_sale(&mut self, id: i64) -> AppResult<bool>;

    async fn insert_supply(&mut self, fields: EventFields) -> AppResult<Supply>;

    async fn update_supply(&mut self, id: i64, fields: EventFields) -> AppResult<Option<Supply>>;

    async fn delete_supply(&mut self, id: i64) -> AppResult<bool>;

    /// Write derived columns for a batch of sales. Every row must exist.
    async fn update_sale_totals(&mut self, rows: &[SaleTotalsUpdate]) -> AppResult<()>;

    async fn update_supply_hints(&mut self, hints: &[SupplyHint]) -> AppResult<()>;

    /// Clear `first_matched_sale_id` on every supply admitted by `from`
    async fn clear_supply_hints(&mut self, from: ScanFrom) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_run_stops_at_first_miss() {
        let cursors = [1, 2, 2, 5, 7, 9];
        let mut looked_at = 0;
        let first = earliest_of_trailing_run(cursors.iter().rev(), |lot| {
            looked_at += 1;
            **lot >= 5
        });
        assert_eq!(first, Some(&5));
        assert_eq!(looked_at, 4);
    }

    #[test]
    fn test_trailing_run_beyond_frontier_looks_once() {
        let cursors: Vec<i64> = (0..10_000).collect();
        let mut looked_at = 0;
        let first = earliest_of_trailing_run(cursors.iter().rev(), |lot| {
            looked_at += 1;
            **lot >= 20_000
        });
        assert_eq!(first, None);
        assert_eq!(looked_at, 1);
    }

    #[test]
    fn test_trailing_run_covering_everything() {
        let first = earliest_of_trailing_run([3, 2, 1], |_| true);
        assert_eq!(first, Some(1));
        assert_eq!(earliest_of_trailing_run(Vec::<i64>::new(), |_| true), None);
    }
}
