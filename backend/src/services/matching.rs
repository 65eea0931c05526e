//! Matching pass: drives the FIFO matcher over store streams
//!
//! A pass reads sales and supplies through [`OrderedStream`]s, feeds the
//! sans-IO matcher, and stages the derived columns in a [`BatchWriter`].
//! Nothing here commits; the caller owns the transaction.

use serde::Serialize;

use crate::error::AppResult;
use crate::models::{Demand, FifoMatcher, Lot, SaleTotalsUpdate, Seed};
use crate::store::{LedgerTx, SupplyHint};

use super::stream::{SaleStream, SupplyStream};

/// What one pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub sales_rewritten: u64,
    pub lots_drawn: u64,
    pub backordered_sales: u64,
    pub batches_flushed: u64,
}

/// Stages derived-column writes and flushes them in fixed-size batches
pub struct BatchWriter {
    batch_size: usize,
    totals: Vec<SaleTotalsUpdate>,
    hints: Vec<SupplyHint>,
    batches_flushed: u64,
}

impl BatchWriter {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            totals: Vec::with_capacity(batch_size),
            hints: Vec::new(),
            batches_flushed: 0,
        }
    }

    pub async fn push_totals(&mut self, tx: &mut dyn LedgerTx, update: SaleTotalsUpdate) -> AppResult<()> {
        self.totals.push(update);
        if self.totals.len() >= self.batch_size {
            self.flush_totals(tx).await?;
        }
        Ok(())
    }

    pub async fn push_hint(&mut self, tx: &mut dyn LedgerTx, hint: SupplyHint) -> AppResult<()> {
        self.hints.push(hint);
        if self.hints.len() >= self.batch_size {
            tx.update_supply_hints(&self.hints).await?;
            self.hints.clear();
        }
        Ok(())
    }

    async fn flush_totals(&mut self, tx: &mut dyn LedgerTx) -> AppResult<()> {
        if self.totals.is_empty() {
            return Ok(());
        }
        tx.update_sale_totals(&self.totals).await?;
        self.batches_flushed += 1;
        tracing::debug!(
            "Flushed {} sale totals for barcode {}",
            self.totals.len(),
            tx.barcode()
        );
        self.totals.clear();
        Ok(())
    }

    /// Flush whatever is staged. Returns the number of sale batches written
    /// over the writer's lifetime.
    pub async fn finish(mut self, tx: &mut dyn LedgerTx) -> AppResult<u64> {
        self.flush_totals(tx).await?;
        if !self.hints.is_empty() {
            tx.update_supply_hints(&self.hints).await?;
        }
        Ok(self.batches_flushed)
    }
}

/// Recompute every sale `sales` yields, starting from `seed`.
///
/// `supplies` must be positioned just after the seed's in-flight lot (or at
/// the start for a fresh seed). Each lot drawn records the sale that drew it
/// as its `first_matched_sale_id`; lots the pass never reached get the hint
/// cleared.
pub async fn recompute(
    tx: &mut dyn LedgerTx,
    sales: &mut SaleStream,
    supplies: &mut SupplyStream,
    seed: Seed,
    batch_size: usize,
) -> AppResult<PassSummary> {
    let mut matcher = FifoMatcher::new(seed);
    let mut writer = BatchWriter::new(batch_size);
    let mut summary = PassSummary::default();

    while let Some(sale) = sales.next(tx).await? {
        matcher.open_sale(i64::from(sale.quantity), i64::from(sale.price));
        let settlement = loop {
            match matcher.advance()? {
                Demand::NeedLot => {
                    let supply = supplies.next(tx).await?;
                    let lot = supply.as_ref().map(Lot::from);
                    let drawn = matcher.receive(lot);
                    if let Some(supply) = supply {
                        let first_sale = drawn.then_some(sale.id);
                        if drawn {
                            summary.lots_drawn += 1;
                        }
                        writer.push_hint(tx, (supply.id, first_sale)).await?;
                    }
                }
                Demand::Settled(settlement) => break settlement,
            }
        };

        if settlement.backorder_quantity > 0 {
            summary.backordered_sales += 1;
        }
        writer
            .push_totals(
                tx,
                SaleTotalsUpdate {
                    sale_id: sale.id,
                    totals: settlement.totals,
                    cursor: settlement.cursor,
                    backorder_quantity: settlement.backorder_quantity,
                },
            )
            .await?;
        summary.sales_rewritten += 1;
    }

    summary.batches_flushed = writer.finish(tx).await?;
    tx.clear_supply_hints(supplies.unread_from()).await?;

    tracing::info!(
        "Matching pass for barcode {}: {} sales rewritten, {} lots drawn, {} backordered",
        tx.barcode(),
        summary.sales_rewritten,
        summary.lots_drawn,
        summary.backordered_sales
    );

    Ok(summary)
}
