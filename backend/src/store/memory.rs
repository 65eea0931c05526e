//! In-memory event store
//!
//! Used by the test suite and for local runs without PostgreSQL. Each
//! barcode's history lives behind its own async mutex; a transaction holds
//! that mutex, works on a copy, and swaps the copy in on commit.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{earliest_of_trailing_run, EventFields, EventFilter, EventStore, LedgerTx, SupplyHint};
use crate::error::{AppError, AppResult};
use crate::models::{Barcode, Pagination, Position, Sale, SaleTotalsUpdate, ScanFrom, Supply};

/// History of one barcode, keyed by (time, id)
#[derive(Debug, Clone, Default)]
struct SkuHistory {
    sales: BTreeMap<Position, Sale>,
    supplies: BTreeMap<Position, Supply>,
    sale_positions: HashMap<i64, Position>,
    supply_positions: HashMap<i64, Position>,
}

impl SkuHistory {
    fn sale(&self, id: i64) -> Option<&Sale> {
        self.sale_positions.get(&id).and_then(|p| self.sales.get(p))
    }

    fn supply(&self, id: i64) -> Option<&Supply> {
        self.supply_positions.get(&id).and_then(|p| self.supplies.get(p))
    }

    /// Whether a sale's stored cursor sits at or past `supply_position`
    fn reaches(&self, sale: &Sale, supply_position: Position) -> bool {
        if sale.supply_exhausted {
            return true;
        }
        match sale.last_matched_supply_id {
            Some(id) => self
                .supply(id)
                .map_or(true, |lot| lot.position() >= supply_position),
            None => false,
        }
    }

    fn put_sale(&mut self, sale: Sale) {
        self.sale_positions.insert(sale.id, sale.position());
        self.sales.insert(sale.position(), sale);
    }

    fn take_sale(&mut self, id: i64) -> Option<Sale> {
        let position = self.sale_positions.remove(&id)?;
        self.sales.remove(&position)
    }

    fn put_supply(&mut self, supply: Supply) {
        self.supply_positions.insert(supply.id, supply.position());
        self.supplies.insert(supply.position(), supply);
    }

    fn take_supply(&mut self, id: i64) -> Option<Supply> {
        let position = self.supply_positions.remove(&id)?;
        self.supplies.remove(&position)
    }
}

fn scan<T: Clone>(rows: &BTreeMap<Position, T>, from: ScanFrom, limit: usize) -> Vec<T> {
    let lower = match from {
        ScanFrom::Start => Bound::Unbounded,
        ScanFrom::AtOrAfter(p) => Bound::Included(p),
        ScanFrom::After(p) => Bound::Excluded(p),
    };
    rows.range((lower, Bound::Unbounded))
        .take(limit)
        .map(|(_, row)| row.clone())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EventKind {
    Sale,
    Supply,
}

#[derive(Default)]
struct MemoryInner {
    histories: Mutex<HashMap<Barcode, Arc<AsyncMutex<SkuHistory>>>>,
    owners: RwLock<HashMap<(EventKind, i64), Barcode>>,
    next_sale_id: AtomicI64,
    next_supply_id: AtomicI64,
}

impl MemoryInner {
    fn history(&self, barcode: Barcode) -> Arc<AsyncMutex<SkuHistory>> {
        self.histories.lock().entry(barcode).or_default().clone()
    }

    fn histories(&self) -> Vec<Arc<AsyncMutex<SkuHistory>>> {
        self.histories.lock().values().cloned().collect()
    }

    fn owner(&self, kind: EventKind, id: i64) -> Option<Barcode> {
        self.owners.read().get(&(kind, id)).copied()
    }
}

/// Event store holding everything in process memory
#[derive(Clone, Default)]
pub struct MemoryEventStore {
    inner: Arc<MemoryInner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T>(rows: Vec<T>, page: &Pagination) -> (Vec<T>, u64) {
    let total = rows.len() as u64;
    let data = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.per_page as usize)
        .collect();
    (data, total)
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn begin(&self, barcode: Barcode) -> AppResult<Box<dyn LedgerTx>> {
        let guard = self.inner.history(barcode).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryLedgerTx {
            barcode,
            inner: self.inner.clone(),
            guard,
            working,
            owner_changes: Vec::new(),
        }))
    }

    async fn get_sale(&self, id: i64) -> AppResult<Option<Sale>> {
        let Some(barcode) = self.inner.owner(EventKind::Sale, id) else {
            return Ok(None);
        };
        let history = self.inner.history(barcode);
        let history = history.lock().await;
        Ok(history.sale(id).cloned())
    }

    async fn get_supply(&self, id: i64) -> AppResult<Option<Supply>> {
        let Some(barcode) = self.inner.owner(EventKind::Supply, id) else {
            return Ok(None);
        };
        let history = self.inner.history(barcode);
        let history = history.lock().await;
        Ok(history.supply(id).cloned())
    }

    async fn list_sales(&self, filter: &EventFilter, pagination: &Pagination) -> AppResult<(Vec<Sale>, u64)> {
        let histories = match filter.barcode {
            Some(barcode) => vec![self.inner.history(barcode)],
            None => self.inner.histories(),
        };
        let mut rows = Vec::new();
        for history in histories {
            let history = history.lock().await;
            rows.extend(
                history
                    .sales
                    .values()
                    .filter(|s| filter.range.contains(s.sale_time))
                    .cloned(),
            );
        }
        rows.sort_by_key(Sale::position);
        Ok(page(rows, pagination))
    }

    async fn list_supplies(
        &self,
        filter: &EventFilter,
        pagination: &Pagination,
    ) -> AppResult<(Vec<Supply>, u64)> {
        let histories = match filter.barcode {
            Some(barcode) => vec![self.inner.history(barcode)],
            None => self.inner.histories(),
        };
        let mut rows = Vec::new();
        for history in histories {
            let history = history.lock().await;
            rows.extend(
                history
                    .supplies
                    .values()
                    .filter(|s| filter.range.contains(s.supply_time))
                    .cloned(),
            );
        }
        rows.sort_by_key(Supply::position);
        Ok(page(rows, pagination))
    }

    async fn last_sale_at_or_before(
        &self,
        barcode: Barcode,
        time: NaiveDateTime,
    ) -> AppResult<Option<Sale>> {
        let history = self.inner.history(barcode);
        let history = history.lock().await;
        Ok(history
            .sales
            .range(..=Position::new(time, i64::MAX))
            .next_back()
            .map(|(_, sale)| sale.clone()))
    }

    async fn last_sale_before(&self, barcode: Barcode, time: NaiveDateTime) -> AppResult<Option<Sale>> {
        let history = self.inner.history(barcode);
        let history = history.lock().await;
        Ok(history
            .sales
            .range(..Position::start_of(time))
            .next_back()
            .map(|(_, sale)| sale.clone()))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Transaction over one barcode's history
pub struct MemoryLedgerTx {
    barcode: Barcode,
    inner: Arc<MemoryInner>,
    guard: OwnedMutexGuard<SkuHistory>,
    working: SkuHistory,
    owner_changes: Vec<((EventKind, i64), Option<Barcode>)>,
}

impl MemoryLedgerTx {
    fn check_barcode(&self, barcode: Barcode, what: &str, id: i64) -> AppResult<()> {
        if barcode != self.barcode {
            return Err(AppError::ConsistencyViolation(format!(
                "{} {} belongs to barcode {}, not {}",
                what, id, barcode, self.barcode
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    fn barcode(&self) -> Barcode {
        self.barcode
    }

    async fn scan_sales(&mut self, from: ScanFrom, limit: usize) -> AppResult<Vec<Sale>> {
        Ok(scan(&self.working.sales, from, limit))
    }

    async fn scan_supplies(&mut self, from: ScanFrom, limit: usize) -> AppResult<Vec<Supply>> {
        Ok(scan(&self.working.supplies, from, limit))
    }

    async fn sale(&mut self, id: i64) -> AppResult<Option<Sale>> {
        Ok(self.working.sale(id).cloned())
    }

    async fn supply(&mut self, id: i64) -> AppResult<Option<Supply>> {
        Ok(self.working.supply(id).cloned())
    }

    async fn latest_sale(&mut self) -> AppResult<Option<Sale>> {
        Ok(self.working.sales.values().next_back().cloned())
    }

    async fn latest_supply(&mut self) -> AppResult<Option<Supply>> {
        Ok(self.working.supplies.values().next_back().cloned())
    }

    async fn sale_before(&mut self, position: Position) -> AppResult<Option<Sale>> {
        Ok(self
            .working
            .sales
            .range(..position)
            .next_back()
            .map(|(_, sale)| sale.clone()))
    }

    async fn first_sale_reaching(&mut self, supply_position: Position) -> AppResult<Option<Sale>> {
        let history = &self.working;
        let first = earliest_of_trailing_run(history.sales.values().rev(), |sale| {
            history.reaches(sale, supply_position)
        });
        Ok(first.cloned())
    }

    async fn insert_sale(&mut self, fields: EventFields) -> AppResult<Sale> {
        let id = self.inner.next_sale_id.fetch_add(1, Ordering::SeqCst) + 1;
        let sale = Sale {
            id,
            barcode: self.barcode,
            quantity: fields.quantity,
            price: fields.price,
            sale_time: fields.time,
            total_quantity: 0,
            total_revenue: 0,
            total_net_profit: 0,
            last_matched_supply_id: None,
            lms_remaining_quantity: None,
            backorder_quantity: 0,
            supply_exhausted: false,
        };
        self.working.put_sale(sale.clone());
        self.owner_changes.push(((EventKind::Sale, id), Some(self.barcode)));
        Ok(sale)
    }

    async fn update_sale(&mut self, id: i64, fields: EventFields) -> AppResult<Option<Sale>> {
        let Some(mut sale) = self.working.take_sale(id) else {
            return Ok(None);
        };
        self.check_barcode(sale.barcode, "sale", id)?;
        sale.quantity = fields.quantity;
        sale.price = fields.price;
        sale.sale_time = fields.time;
        self.working.put_sale(sale.clone());
        Ok(Some(sale))
    }

    async fn delete_sale(&mut self, id: i64) -> AppResult<bool> {
        let removed = self.working.take_sale(id).is_some();
        if removed {
            self.owner_changes.push(((EventKind::Sale, id), None));
        }
        Ok(removed)
    }

    async fn insert_supply(&mut self, fields: EventFields) -> AppResult<Supply> {
        let id = self.inner.next_supply_id.fetch_add(1, Ordering::SeqCst) + 1;
        let supply = Supply {
            id,
            barcode: self.barcode,
            quantity: fields.quantity,
            price: fields.price,
            supply_time: fields.time,
            first_matched_sale_id: None,
        };
        self.working.put_supply(supply.clone());
        self.owner_changes.push(((EventKind::Supply, id), Some(self.barcode)));
        Ok(supply)
    }

    async fn update_supply(&mut self, id: i64, fields: EventFields) -> AppResult<Option<Supply>> {
        let Some(mut supply) = self.working.take_supply(id) else {
            return Ok(None);
        };
        self.check_barcode(supply.barcode, "supply", id)?;
        supply.quantity = fields.quantity;
        supply.price = fields.price;
        supply.supply_time = fields.time;
        self.working.put_supply(supply.clone());
        Ok(Some(supply))
    }

    async fn delete_supply(&mut self, id: i64) -> AppResult<bool> {
        let removed = self.working.take_supply(id).is_some();
        if removed {
            self.owner_changes.push(((EventKind::Supply, id), None));
        }
        Ok(removed)
    }

    async fn update_sale_totals(&mut self, rows: &[SaleTotalsUpdate]) -> AppResult<()> {
        for row in rows {
            let position = self.working.sale_positions.get(&row.sale_id).copied();
            let sale = position
                .and_then(|p| self.working.sales.get_mut(&p))
                .ok_or_else(|| {
                    AppError::ConsistencyViolation(format!(
                        "sale {} vanished during recompute",
                        row.sale_id
                    ))
                })?;
            row.apply_to(sale);
        }
        Ok(())
    }

    async fn update_supply_hints(&mut self, hints: &[SupplyHint]) -> AppResult<()> {
        for (supply_id, sale_id) in hints {
            let position = self.working.supply_positions.get(supply_id).copied();
            if let Some(supply) = position.and_then(|p| self.working.supplies.get_mut(&p)) {
                supply.first_matched_sale_id = *sale_id;
            }
        }
        Ok(())
    }

    async fn clear_supply_hints(&mut self, from: ScanFrom) -> AppResult<()> {
        for (position, supply) in self.working.supplies.iter_mut() {
            if from.admits(*position) {
                supply.first_matched_sale_id = None;
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryLedgerTx {
            inner,
            mut guard,
            working,
            owner_changes,
            ..
        } = *self;
        *guard = working;
        let mut owners = inner.owners.write();
        for (key, owner) in owner_changes {
            match owner {
                Some(barcode) => owners.insert(key, barcode),
                None => owners.remove(&key),
            };
        }
        Ok(())
    }
}
