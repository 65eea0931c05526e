//! PostgreSQL event store
//!
//! Each ledger transaction is a database transaction that first takes
//! `pg_advisory_xact_lock(barcode)`, so writers for one SKU serialise across
//! server processes. The lock is released with the transaction.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{PgPool, Postgres, Transaction};

use super::{EventFields, EventFilter, EventStore, LedgerTx, SupplyHint};
use crate::error::{AppError, AppResult};
use crate::models::{Barcode, Pagination, Position, Sale, SaleTotalsUpdate, ScanFrom, Supply};

const SALE_COLUMNS: &str = "id, barcode, quantity, price, sale_time, total_quantity, \
    total_revenue, total_net_profit, last_matched_supply_id, lms_remaining_quantity, \
    backorder_quantity, supply_exhausted";

const SUPPLY_COLUMNS: &str = "id, barcode, quantity, price, supply_time, first_matched_sale_id";

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: i64,
    barcode: i64,
    quantity: i32,
    price: i32,
    sale_time: NaiveDateTime,
    total_quantity: i64,
    total_revenue: i64,
    total_net_profit: i64,
    last_matched_supply_id: Option<i64>,
    lms_remaining_quantity: Option<i64>,
    backorder_quantity: i64,
    supply_exhausted: bool,
}

impl From<SaleRow> for Sale {
    fn from(row: SaleRow) -> Self {
        Sale {
            id: row.id,
            barcode: row.barcode,
            quantity: row.quantity,
            price: row.price,
            sale_time: row.sale_time,
            total_quantity: row.total_quantity,
            total_revenue: row.total_revenue,
            total_net_profit: row.total_net_profit,
            last_matched_supply_id: row.last_matched_supply_id,
            lms_remaining_quantity: row.lms_remaining_quantity,
            backorder_quantity: row.backorder_quantity,
            supply_exhausted: row.supply_exhausted,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SupplyRow {
    id: i64,
    barcode: i64,
    quantity: i32,
    price: i32,
    supply_time: NaiveDateTime,
    first_matched_sale_id: Option<i64>,
}

impl From<SupplyRow> for Supply {
    fn from(row: SupplyRow) -> Self {
        Supply {
            id: row.id,
            barcode: row.barcode,
            quantity: row.quantity,
            price: row.price,
            supply_time: row.supply_time,
            first_matched_sale_id: row.first_matched_sale_id,
        }
    }
}

/// Compound resumption predicate on `(time_column, id)`.
///
/// The position, when there is one, binds to `$first` and `$first + 1`.
fn range_clause(time_column: &str, from: ScanFrom, first: usize) -> (String, Option<Position>) {
    let (op, position) = match from {
        ScanFrom::Start => return (String::new(), None),
        ScanFrom::AtOrAfter(p) => (">=", p),
        ScanFrom::After(p) => (">", p),
    };
    (
        format!(
            "AND ({}, id) {} (${}, ${})",
            time_column,
            op,
            first,
            first + 1
        ),
        Some(position),
    )
}

// ============================================================================
// Store
// ============================================================================

/// Event store backed by PostgreSQL
#[derive(Clone)]
pub struct PgEventStore {
    db: PgPool,
}

impl PgEventStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn begin(&self, barcode: Barcode) -> AppResult<Box<dyn LedgerTx>> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(barcode)
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgLedgerTx { barcode, tx }))
    }

    async fn get_sale(&self, id: i64) -> AppResult<Option<Sale>> {
        let sql = format!("SELECT {} FROM sales WHERE id = $1", SALE_COLUMNS);
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Sale::from))
    }

    async fn get_supply(&self, id: i64) -> AppResult<Option<Supply>> {
        let sql = format!("SELECT {} FROM supplies WHERE id = $1", SUPPLY_COLUMNS);
        let row = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Supply::from))
    }

    async fn list_sales(&self, filter: &EventFilter, page: &Pagination) -> AppResult<(Vec<Sale>, u64)> {
        let sql = format!(
            r#"
            SELECT {} FROM sales
            WHERE ($1::BIGINT IS NULL OR barcode = $1)
              AND ($2::TIMESTAMP IS NULL OR sale_time >= $2)
              AND ($3::TIMESTAMP IS NULL OR sale_time <= $3)
            ORDER BY sale_time, id
            LIMIT $4 OFFSET $5
            "#,
            SALE_COLUMNS
        );
        let rows = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(filter.barcode)
            .bind(filter.range.from)
            .bind(filter.range.to)
            .bind(i64::from(page.per_page))
            .bind(page.offset() as i64)
            .fetch_all(&self.db)
            .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sales
            WHERE ($1::BIGINT IS NULL OR barcode = $1)
              AND ($2::TIMESTAMP IS NULL OR sale_time >= $2)
              AND ($3::TIMESTAMP IS NULL OR sale_time <= $3)
            "#,
        )
        .bind(filter.barcode)
        .bind(filter.range.from)
        .bind(filter.range.to)
        .fetch_one(&self.db)
        .await?;

        Ok((rows.into_iter().map(Sale::from).collect(), total as u64))
    }

    async fn list_supplies(
        &self,
        filter: &EventFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<Supply>, u64)> {
        let sql = format!(
            r#"
            SELECT {} FROM supplies
            WHERE ($1::BIGINT IS NULL OR barcode = $1)
              AND ($2::TIMESTAMP IS NULL OR supply_time >= $2)
              AND ($3::TIMESTAMP IS NULL OR supply_time <= $3)
            ORDER BY supply_time, id
            LIMIT $4 OFFSET $5
            "#,
            SUPPLY_COLUMNS
        );
        let rows = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(filter.barcode)
            .bind(filter.range.from)
            .bind(filter.range.to)
            .bind(i64::from(page.per_page))
            .bind(page.offset() as i64)
            .fetch_all(&self.db)
            .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM supplies
            WHERE ($1::BIGINT IS NULL OR barcode = $1)
              AND ($2::TIMESTAMP IS NULL OR supply_time >= $2)
              AND ($3::TIMESTAMP IS NULL OR supply_time <= $3)
            "#,
        )
        .bind(filter.barcode)
        .bind(filter.range.from)
        .bind(filter.range.to)
        .fetch_one(&self.db)
        .await?;

        Ok((rows.into_iter().map(Supply::from).collect(), total as u64))
    }

    async fn last_sale_at_or_before(
        &self,
        barcode: Barcode,
        time: NaiveDateTime,
    ) -> AppResult<Option<Sale>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE barcode = $1 AND sale_time <= $2 \
             ORDER BY sale_time DESC, id DESC LIMIT 1",
            SALE_COLUMNS
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(barcode)
            .bind(time)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Sale::from))
    }

    async fn last_sale_before(&self, barcode: Barcode, time: NaiveDateTime) -> AppResult<Option<Sale>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE barcode = $1 AND sale_time < $2 \
             ORDER BY sale_time DESC, id DESC LIMIT 1",
            SALE_COLUMNS
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(barcode)
            .bind(time)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(Sale::from))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// One barcode's unit of work. Dropping it rolls the transaction back.
pub struct PgLedgerTx {
    barcode: Barcode,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    fn barcode(&self) -> Barcode {
        self.barcode
    }

    async fn scan_sales(&mut self, from: ScanFrom, limit: usize) -> AppResult<Vec<Sale>> {
        let (clause, position) = range_clause("sale_time", from, 3);
        let sql = format!(
            "SELECT {} FROM sales WHERE barcode = $1 {} ORDER BY sale_time, id LIMIT $2",
            SALE_COLUMNS, clause
        );
        let mut query = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(self.barcode)
            .bind(limit as i64);
        if let Some(p) = position {
            query = query.bind(p.time).bind(p.id);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        Ok(rows.into_iter().map(Sale::from).collect())
    }

    async fn scan_supplies(&mut self, from: ScanFrom, limit: usize) -> AppResult<Vec<Supply>> {
        let (clause, position) = range_clause("supply_time", from, 3);
        let sql = format!(
            "SELECT {} FROM supplies WHERE barcode = $1 {} ORDER BY supply_time, id LIMIT $2",
            SUPPLY_COLUMNS, clause
        );
        let mut query = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(self.barcode)
            .bind(limit as i64);
        if let Some(p) = position {
            query = query.bind(p.time).bind(p.id);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        Ok(rows.into_iter().map(Supply::from).collect())
    }

    async fn sale(&mut self, id: i64) -> AppResult<Option<Sale>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE id = $1 AND barcode = $2",
            SALE_COLUMNS
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .bind(self.barcode)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Sale::from))
    }

    async fn supply(&mut self, id: i64) -> AppResult<Option<Supply>> {
        let sql = format!(
            "SELECT {} FROM supplies WHERE id = $1 AND barcode = $2",
            SUPPLY_COLUMNS
        );
        let row = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(id)
            .bind(self.barcode)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Supply::from))
    }

    async fn latest_sale(&mut self) -> AppResult<Option<Sale>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE barcode = $1 ORDER BY sale_time DESC, id DESC LIMIT 1",
            SALE_COLUMNS
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(self.barcode)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Sale::from))
    }

    async fn latest_supply(&mut self) -> AppResult<Option<Supply>> {
        let sql = format!(
            "SELECT {} FROM supplies WHERE barcode = $1 ORDER BY supply_time DESC, id DESC LIMIT 1",
            SUPPLY_COLUMNS
        );
        let row = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(self.barcode)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Supply::from))
    }

    async fn sale_before(&mut self, position: Position) -> AppResult<Option<Sale>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE barcode = $1 AND (sale_time, id) < ($2, $3) \
             ORDER BY sale_time DESC, id DESC LIMIT 1",
            SALE_COLUMNS
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(self.barcode)
            .bind(position.time)
            .bind(position.id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Sale::from))
    }

    async fn first_sale_reaching(&mut self, supply_position: Position) -> AppResult<Option<Sale>> {
        // Reaching sales form a suffix: find the last sale short of the
        // lot walking backwards, then take the sale right after it.
        let row = sqlx::query_as::<_, SaleRow>(
            r#"
            WITH boundary AS (
                SELECT s.sale_time, s.id
                FROM sales s
                LEFT JOIN supplies l
                    ON l.id = s.last_matched_supply_id AND l.barcode = s.barcode
                WHERE s.barcode = $1
                  AND NOT s.supply_exhausted
                  AND (s.last_matched_supply_id IS NULL
                       OR (l.id IS NOT NULL AND (l.supply_time, l.id) < ($2, $3)))
                ORDER BY s.sale_time DESC, s.id DESC
                LIMIT 1
            )
            SELECT s.id, s.barcode, s.quantity, s.price, s.sale_time, s.total_quantity,
                   s.total_revenue, s.total_net_profit, s.last_matched_supply_id,
                   s.lms_remaining_quantity, s.backorder_quantity, s.supply_exhausted
            FROM sales s
            WHERE s.barcode = $1
              AND (NOT EXISTS (SELECT 1 FROM boundary)
                   OR (s.sale_time, s.id) > (SELECT sale_time, id FROM boundary))
            ORDER BY s.sale_time, s.id
            LIMIT 1
            "#,
        )
        .bind(self.barcode)
        .bind(supply_position.time)
        .bind(supply_position.id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Sale::from))
    }

    async fn insert_sale(&mut self, fields: EventFields) -> AppResult<Sale> {
        let sql = format!(
            "INSERT INTO sales (barcode, quantity, price, sale_time) VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            SALE_COLUMNS
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(self.barcode)
            .bind(fields.quantity)
            .bind(fields.price)
            .bind(fields.time)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.into())
    }

    async fn update_sale(&mut self, id: i64, fields: EventFields) -> AppResult<Option<Sale>> {
        let sql = format!(
            "UPDATE sales SET quantity = $3, price = $4, sale_time = $5 \
             WHERE id = $1 AND barcode = $2 RETURNING {}",
            SALE_COLUMNS
        );
        let row = sqlx::query_as::<_, SaleRow>(&sql)
            .bind(id)
            .bind(self.barcode)
            .bind(fields.quantity)
            .bind(fields.price)
            .bind(fields.time)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Sale::from))
    }

    async fn delete_sale(&mut self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM sales WHERE id = $1 AND barcode = $2")
            .bind(id)
            .bind(self.barcode)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_supply(&mut self, fields: EventFields) -> AppResult<Supply> {
        let sql = format!(
            "INSERT INTO supplies (barcode, quantity, price, supply_time) VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            SUPPLY_COLUMNS
        );
        let row = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(self.barcode)
            .bind(fields.quantity)
            .bind(fields.price)
            .bind(fields.time)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.into())
    }

    async fn update_supply(&mut self, id: i64, fields: EventFields) -> AppResult<Option<Supply>> {
        let sql = format!(
            "UPDATE supplies SET quantity = $3, price = $4, supply_time = $5 \
             WHERE id = $1 AND barcode = $2 RETURNING {}",
            SUPPLY_COLUMNS
        );
        let row = sqlx::query_as::<_, SupplyRow>(&sql)
            .bind(id)
            .bind(self.barcode)
            .bind(fields.quantity)
            .bind(fields.price)
            .bind(fields.time)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Supply::from))
    }

    async fn delete_supply(&mut self, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM supplies WHERE id = $1 AND barcode = $2")
            .bind(id)
            .bind(self.barcode)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_sale_totals(&mut self, rows: &[SaleTotalsUpdate]) -> AppResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut ids = Vec::with_capacity(rows.len());
        let mut quantities = Vec::with_capacity(rows.len());
        let mut revenues = Vec::with_capacity(rows.len());
        let mut profits = Vec::with_capacity(rows.len());
        let mut lots: Vec<Option<i64>> = Vec::with_capacity(rows.len());
        let mut remainders: Vec<Option<i64>> = Vec::with_capacity(rows.len());
        let mut backorders = Vec::with_capacity(rows.len());
        let mut exhausted = Vec::with_capacity(rows.len());
        for row in rows {
            let (lot, remaining, is_exhausted) = row.cursor.to_columns();
            ids.push(row.sale_id);
            quantities.push(row.totals.quantity);
            revenues.push(row.totals.revenue);
            profits.push(row.totals.net_profit);
            lots.push(lot);
            remainders.push(remaining);
            backorders.push(row.backorder_quantity);
            exhausted.push(is_exhausted);
        }

        let result = sqlx::query(
            r#"
            UPDATE sales AS s SET
                total_quantity = u.total_quantity,
                total_revenue = u.total_revenue,
                total_net_profit = u.total_net_profit,
                last_matched_supply_id = u.last_matched_supply_id,
                lms_remaining_quantity = u.lms_remaining_quantity,
                backorder_quantity = u.backorder_quantity,
                supply_exhausted = u.supply_exhausted
            FROM UNNEST(
                $2::BIGINT[], $3::BIGINT[], $4::BIGINT[], $5::BIGINT[],
                $6::BIGINT[], $7::BIGINT[], $8::BIGINT[], $9::BOOLEAN[]
            ) AS u(
                id, total_quantity, total_revenue, total_net_profit,
                last_matched_supply_id, lms_remaining_quantity, backorder_quantity,
                supply_exhausted
            )
            WHERE s.id = u.id AND s.barcode = $1
            "#,
        )
        .bind(self.barcode)
        .bind(&ids)
        .bind(&quantities)
        .bind(&revenues)
        .bind(&profits)
        .bind(&lots)
        .bind(&remainders)
        .bind(&backorders)
        .bind(&exhausted)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() != rows.len() as u64 {
            return Err(AppError::ConsistencyViolation(format!(
                "expected to update {} sales of barcode {}, updated {}",
                rows.len(),
                self.barcode,
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn update_supply_hints(&mut self, hints: &[SupplyHint]) -> AppResult<()> {
        if hints.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = hints.iter().map(|(supply_id, _)| *supply_id).collect();
        let sales: Vec<Option<i64>> = hints.iter().map(|(_, sale_id)| *sale_id).collect();

        sqlx::query(
            r#"
            UPDATE supplies AS l SET first_matched_sale_id = u.sale_id
            FROM UNNEST($2::BIGINT[], $3::BIGINT[]) AS u(id, sale_id)
            WHERE l.id = u.id AND l.barcode = $1
            "#,
        )
        .bind(self.barcode)
        .bind(&ids)
        .bind(&sales)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn clear_supply_hints(&mut self, from: ScanFrom) -> AppResult<()> {
        let (clause, position) = range_clause("supply_time", from, 2);
        let sql = format!(
            "UPDATE supplies SET first_matched_sale_id = NULL \
             WHERE barcode = $1 AND first_matched_sale_id IS NOT NULL {}",
            clause
        );
        let mut query = sqlx::query(&sql).bind(self.barcode);
        if let Some(p) = position {
            query = query.bind(p.time).bind(p.id);
        }
        query.execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
