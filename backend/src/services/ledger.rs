//! Ledger service: sale and supply mutations with suffix repair
//!
//! Every mutation runs the same way: take the barcode's lock, open a store
//! transaction, apply the row change, resolve the anchor, run one matching
//! pass over the affected suffix, re-read the row and commit. A failure at
//! any step drops the transaction and leaves the previous totals in place.

use std::sync::Arc;

use validator::Validate;

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};
use crate::models::{
    validate_barcode, Barcode, CreateSaleInput, CreateSupplyInput, Position, Sale, ScanFrom,
    Supply, UpdateSaleInput, UpdateSupplyInput,
};
use crate::store::{EventFields, EventStore, LedgerTx};

use super::anchor::Anchor;
use super::locks::SkuLocks;
use super::matching::{recompute, PassSummary};
use super::stream::{SaleStream, SupplyStream};

/// Ledger service for recording sales and supplies
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn EventStore>,
    locks: SkuLocks,
    config: LedgerConfig,
}

impl LedgerService {
    pub fn new(store: Arc<dyn EventStore>, locks: SkuLocks, config: LedgerConfig) -> Self {
        Self {
            store,
            locks,
            config,
        }
    }

    // ========================================================================
    // Sales
    // ========================================================================

    /// Record a sale and repair the totals from its position on
    pub async fn create_sale(&self, input: CreateSaleInput) -> AppResult<Sale> {
        input.validate()?;
        check_barcode(input.barcode)?;

        let _guard = self.locks.acquire(input.barcode).await;
        let mut tx = self.store.begin(input.barcode).await?;

        let latest = tx.latest_sale().await?;
        let sale = tx
            .insert_sale(EventFields {
                quantity: input.quantity,
                price: input.price,
                time: input.sale_time,
            })
            .await?;

        let anchor = match latest {
            Some(latest) if latest.position() > sale.position() => {
                Anchor::for_sale_change(tx.as_mut(), sale.position()).await?
            }
            latest => {
                tracing::debug!("Sale {} appended to barcode {}", sale.id, input.barcode);
                Anchor::after(tx.as_mut(), latest.as_ref(), ScanFrom::AtOrAfter(sale.position())).await?
            }
        };
        self.run_pass(tx.as_mut(), anchor).await?;

        let sale = reload_sale(tx.as_mut(), sale.id).await?;
        tx.commit().await?;
        Ok(sale)
    }

    /// Change a sale's quantity, price or time. Fields left out keep their
    /// stored value.
    pub async fn update_sale(&self, id: i64, input: UpdateSaleInput) -> AppResult<Sale> {
        input.validate()?;
        let barcode = self.sale_barcode(id).await?;

        let _guard = self.locks.acquire(barcode).await;
        let mut tx = self.store.begin(barcode).await?;

        let old = tx
            .sale(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;
        let fields = EventFields {
            quantity: input.quantity.unwrap_or(old.quantity),
            price: input.price.unwrap_or(old.price),
            time: input.sale_time.unwrap_or(old.sale_time),
        };
        let new = tx
            .update_sale(id, fields)
            .await?
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;

        let earliest = old.position().min(new.position());
        let anchor = Anchor::for_sale_change(tx.as_mut(), earliest).await?;
        self.run_pass(tx.as_mut(), anchor).await?;

        let sale = reload_sale(tx.as_mut(), id).await?;
        tx.commit().await?;
        Ok(sale)
    }

    /// Remove a sale and repair everything after it. Returns the removed row.
    pub async fn delete_sale(&self, id: i64) -> AppResult<Sale> {
        let barcode = self.sale_barcode(id).await?;

        let _guard = self.locks.acquire(barcode).await;
        let mut tx = self.store.begin(barcode).await?;

        let old = tx
            .sale(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;
        if !tx.delete_sale(id).await? {
            return Err(AppError::NotFound("Sale".to_string()));
        }

        let anchor = Anchor::for_sale_change(tx.as_mut(), old.position()).await?;
        self.run_pass(tx.as_mut(), anchor).await?;

        tx.commit().await?;
        Ok(old)
    }

    // ========================================================================
    // Supplies
    // ========================================================================

    /// Record a supply lot. Sales are only recomputed when one of them
    /// could have drawn from it.
    pub async fn create_supply(&self, input: CreateSupplyInput) -> AppResult<Supply> {
        input.validate()?;
        check_barcode(input.barcode)?;

        let _guard = self.locks.acquire(input.barcode).await;
        let mut tx = self.store.begin(input.barcode).await?;

        let supply = tx
            .insert_supply(EventFields {
                quantity: input.quantity,
                price: input.price,
                time: input.supply_time,
            })
            .await?;

        self.repair_after_supply(tx.as_mut(), supply.position()).await?;

        let supply = reload_supply(tx.as_mut(), supply.id).await?;
        tx.commit().await?;
        Ok(supply)
    }

    pub async fn update_supply(&self, id: i64, input: UpdateSupplyInput) -> AppResult<Supply> {
        input.validate()?;
        let barcode = self.supply_barcode(id).await?;

        let _guard = self.locks.acquire(barcode).await;
        let mut tx = self.store.begin(barcode).await?;

        let old = tx
            .supply(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Supply".to_string()))?;
        let fields = EventFields {
            quantity: input.quantity.unwrap_or(old.quantity),
            price: input.price.unwrap_or(old.price),
            time: input.supply_time.unwrap_or(old.supply_time),
        };
        let new = tx
            .update_supply(id, fields)
            .await?
            .ok_or_else(|| AppError::NotFound("Supply".to_string()))?;

        self.repair_after_supply(tx.as_mut(), old.position().min(new.position()))
            .await?;

        let supply = reload_supply(tx.as_mut(), id).await?;
        tx.commit().await?;
        Ok(supply)
    }

    pub async fn delete_supply(&self, id: i64) -> AppResult<Supply> {
        let barcode = self.supply_barcode(id).await?;

        let _guard = self.locks.acquire(barcode).await;
        let mut tx = self.store.begin(barcode).await?;

        let old = tx
            .supply(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Supply".to_string()))?;
        if !tx.delete_supply(id).await? {
            return Err(AppError::NotFound("Supply".to_string()));
        }

        self.repair_after_supply(tx.as_mut(), old.position()).await?;

        tx.commit().await?;
        Ok(old)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Recompute a barcode from its first sale with a zero seed
    pub async fn rebuild(&self, barcode: Barcode) -> AppResult<PassSummary> {
        check_barcode(barcode)?;

        let _guard = self.locks.acquire(barcode).await;
        let mut tx = self.store.begin(barcode).await?;
        tracing::info!("Rebuilding ledger for barcode {}", barcode);

        let summary = self.run_pass(tx.as_mut(), Anchor::FULL).await?;
        tx.commit().await?;
        Ok(summary)
    }

    async fn repair_after_supply(
        &self,
        tx: &mut dyn LedgerTx,
        position: Position,
    ) -> AppResult<()> {
        match Anchor::for_supply_change(tx, position).await? {
            Some(anchor) => {
                self.run_pass(tx, anchor).await?;
            }
            None => {
                tracing::debug!(
                    "Supply change at {:?} for barcode {} is beyond every sale, skipping recompute",
                    position,
                    tx.barcode()
                );
            }
        }
        Ok(())
    }

    async fn run_pass(&self, tx: &mut dyn LedgerTx, anchor: Anchor) -> AppResult<PassSummary> {
        tracing::debug!("Resolved anchor for barcode {}: {:?}", tx.barcode(), anchor);

        let mut sales = SaleStream::open(anchor.sales_from, self.config.scan_chunk_size);
        let mut supplies = SupplyStream::open(anchor.supplies_from, self.config.scan_chunk_size);
        recompute(
            tx,
            &mut sales,
            &mut supplies,
            anchor.seed,
            self.config.batch_size,
        )
        .await
    }

    async fn sale_barcode(&self, id: i64) -> AppResult<Barcode> {
        self.store
            .get_sale(id)
            .await?
            .map(|sale| sale.barcode)
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))
    }

    async fn supply_barcode(&self, id: i64) -> AppResult<Barcode> {
        self.store
            .get_supply(id)
            .await?
            .map(|supply| supply.barcode)
            .ok_or_else(|| AppError::NotFound("Supply".to_string()))
    }
}

fn check_barcode(barcode: Barcode) -> AppResult<()> {
    validate_barcode(barcode).map_err(|message| AppError::validation("barcode", message))
}

async fn reload_sale(tx: &mut dyn LedgerTx, id: i64) -> AppResult<Sale> {
    tx.sale(id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("sale {} disappeared inside its transaction", id)))
}

async fn reload_supply(tx: &mut dyn LedgerTx, id: i64) -> AppResult<Supply> {
    tx.supply(id).await?.ok_or_else(|| {
        AppError::Internal(format!("supply {} disappeared inside its transaction", id))
    })
}
