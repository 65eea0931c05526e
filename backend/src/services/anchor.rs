//! Anchor resolution: where a repair pass starts and what it starts from
//!
//! Every sale row stores the lot state it left behind. Resuming a pass just
//! after some sale `prev` therefore needs nothing but `prev` itself: its
//! totals and its cursor. All lookups here run inside the mutation's
//! transaction, after the mutation itself has been applied.

use crate::error::{AppError, AppResult};
use crate::models::{Lot, LotCursor, LotState, Position, Sale, ScanFrom, Seed, Totals};
use crate::store::LedgerTx;

/// Start of a matching pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// First sale to recompute
    pub sales_from: ScanFrom,
    pub seed: Seed,
    /// First lot the pass may draw
    pub supplies_from: ScanFrom,
}

impl Anchor {
    /// Recompute a barcode's whole history
    pub const FULL: Anchor = Anchor {
        sales_from: ScanFrom::Start,
        seed: Seed::ORIGIN,
        supplies_from: ScanFrom::Start,
    };

    /// Anchor for a pass resuming right after `prev`, recomputing sales from
    /// `sales_from` on
    pub async fn after(
        tx: &mut dyn LedgerTx,
        prev: Option<&Sale>,
        sales_from: ScanFrom,
    ) -> AppResult<Anchor> {
        let (seed, supplies_from) = state_after(tx, prev).await?;
        Ok(Anchor {
            sales_from,
            seed,
            supplies_from,
        })
    }

    /// A sale was inserted, updated or deleted; `earliest` is the lowest
    /// position it occupied before or after the change.
    pub async fn for_sale_change(tx: &mut dyn LedgerTx, earliest: Position) -> AppResult<Anchor> {
        let prev = tx.sale_before(earliest).await?;
        Anchor::after(tx, prev.as_ref(), ScanFrom::AtOrAfter(earliest)).await
    }

    /// A supply was inserted, updated or deleted at `position` (the lower of
    /// old and new for updates).
    ///
    /// Returns `None` when no stored sale depends on lots at or after
    /// `position`: every sale settled before reaching it and none ran the
    /// supply stream dry.
    pub async fn for_supply_change(
        tx: &mut dyn LedgerTx,
        position: Position,
    ) -> AppResult<Option<Anchor>> {
        let Some(first) = tx.first_sale_reaching(position).await? else {
            return Ok(None);
        };
        let prev = tx.sale_before(first.position()).await?;
        let anchor = Anchor::after(tx, prev.as_ref(), ScanFrom::AtOrAfter(first.position())).await?;
        Ok(Some(anchor))
    }
}

/// Seed and supply stream origin for a pass that continues after `prev`
pub async fn state_after(tx: &mut dyn LedgerTx, prev: Option<&Sale>) -> AppResult<(Seed, ScanFrom)> {
    let Some(prev) = prev else {
        return Ok((Seed::ORIGIN, ScanFrom::Start));
    };
    let totals: Totals = prev.totals();

    match prev.cursor() {
        LotCursor::Fresh => Ok((
            Seed {
                totals,
                lot: LotState::Fresh,
            },
            ScanFrom::Start,
        )),
        LotCursor::Open { supply_id, remaining } => {
            let supply = tx.supply(supply_id).await?.ok_or_else(|| {
                let message = format!(
                    "sale {} points at supply {} which does not exist for barcode {}",
                    prev.id,
                    supply_id,
                    tx.barcode()
                );
                tracing::error!("{}", message);
                AppError::ConsistencyViolation(message)
            })?;
            if remaining < 0 || remaining > i64::from(supply.quantity) {
                let message = format!(
                    "sale {} leaves {} units in supply {} of quantity {}",
                    prev.id, remaining, supply.id, supply.quantity
                );
                tracing::error!("{}", message);
                return Err(AppError::ConsistencyViolation(message));
            }
            let lot = Lot::new(supply.id, i64::from(supply.price), remaining);
            Ok((
                Seed {
                    totals,
                    lot: LotState::InFlight(lot),
                },
                ScanFrom::After(supply.position()),
            ))
        }
        LotCursor::Exhausted => {
            let supplies_from = match tx.latest_supply().await? {
                Some(latest) => ScanFrom::After(latest.position()),
                None => ScanFrom::Start,
            };
            Ok((
                Seed {
                    totals,
                    lot: LotState::Exhausted,
                },
                supplies_from,
            ))
        }
    }
}
