//! FIFO lot matching as a sans-IO state machine
//!
//! The matcher never reads storage. The caller opens a sale, asks the
//! matcher to [`advance`](FifoMatcher::advance), and whenever the answer is
//! [`Demand::NeedLot`] feeds it the next supply lot in (time, id) order, or
//! `None` once the supply stream is exhausted. The backend drives it from
//! chunked database cursors; [`simulate`] drives it from slices.
//!
//! Policy:
//! - lots are drained strictly in order; lots with zero quantity are skipped
//! - a sale quantity no lot can cover is backordered and recognised at full
//!   margin (cost basis of zero)
//! - a zero-quantity sale settles immediately and carries totals through
//! - totals that would leave the `i64` range fail with [`TotalsOverflow`]

use crate::models::{Sale, Supply};
use crate::types::{LotCursor, Totals, TotalsOverflow};

/// A supply lot while it is being consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lot {
    pub supply_id: i64,
    pub unit_cost: i64,
    pub remaining: i64,
}

impl Lot {
    pub fn new(supply_id: i64, unit_cost: i64, remaining: i64) -> Self {
        Self {
            supply_id,
            unit_cost,
            remaining,
        }
    }
}

impl From<&Supply> for Lot {
    fn from(supply: &Supply) -> Self {
        Lot::new(supply.id, i64::from(supply.price), i64::from(supply.quantity))
    }
}

/// Lot state between two sales
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotState {
    /// Nothing drawn yet; the next lot is the first of the SKU
    Fresh,
    InFlight(Lot),
    /// The supply stream reported its end
    Exhausted,
}

impl LotState {
    pub fn cursor(&self) -> LotCursor {
        match self {
            LotState::Fresh => LotCursor::Fresh,
            LotState::InFlight(lot) => LotCursor::Open {
                supply_id: lot.supply_id,
                remaining: lot.remaining,
            },
            LotState::Exhausted => LotCursor::Exhausted,
        }
    }
}

/// Where a matching pass starts: the totals of the sale just before the
/// first sale to recompute, and the lot state it left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    pub totals: Totals,
    pub lot: LotState,
}

impl Seed {
    /// Seed for the first sale of a SKU
    pub const ORIGIN: Seed = Seed {
        totals: Totals::ZERO,
        lot: LotState::Fresh,
    };
}

impl Default for Seed {
    fn default() -> Self {
        Seed::ORIGIN
    }
}

/// Outcome of matching one sale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// Running totals including this sale
    pub totals: Totals,
    pub cursor: LotCursor,
    /// Units taken from supply lots
    pub matched_quantity: i64,
    /// Units recognised without a lot
    pub backorder_quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    /// Feed the next lot with [`FifoMatcher::receive`]
    NeedLot,
    Settled(Settlement),
}

#[derive(Debug, Clone, Copy)]
struct OpenSale {
    need: i64,
    price: i64,
    matched: i64,
}

/// Carries running totals and the in-flight lot from sale to sale
#[derive(Debug, Clone)]
pub struct FifoMatcher {
    totals: Totals,
    lot: LotState,
    open: Option<OpenSale>,
}

impl FifoMatcher {
    pub fn new(seed: Seed) -> Self {
        Self {
            totals: seed.totals,
            lot: seed.lot,
            open: None,
        }
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn lot_state(&self) -> LotState {
        self.lot
    }

    /// Start matching a sale. Replaces any sale left unsettled.
    pub fn open_sale(&mut self, quantity: i64, price: i64) {
        self.open = Some(OpenSale {
            need: quantity.max(0),
            price,
            matched: 0,
        });
    }

    /// Consume from the in-flight lot until the open sale is covered, the
    /// lot runs dry, or the stream is known to be exhausted.
    ///
    /// Calling this with no open sale settles an empty one.
    pub fn advance(&mut self) -> Result<Demand, TotalsOverflow> {
        let mut sale = self.open.unwrap_or(OpenSale {
            need: 0,
            price: 0,
            matched: 0,
        });

        loop {
            if sale.need == 0 {
                return Ok(self.settle(sale, 0));
            }
            match self.lot {
                LotState::InFlight(mut lot) if lot.remaining > 0 => {
                    let take = sale.need.min(lot.remaining);
                    self.accrue(take, sale.price, lot.unit_cost)?;
                    sale.need -= take;
                    sale.matched += take;
                    lot.remaining -= take;
                    self.lot = LotState::InFlight(lot);
                }
                LotState::Exhausted => {
                    let residual = sale.need;
                    self.accrue(residual, sale.price, 0)?;
                    sale.need = 0;
                    return Ok(self.settle(sale, residual));
                }
                LotState::Fresh | LotState::InFlight(_) => {
                    self.open = Some(sale);
                    return Ok(Demand::NeedLot);
                }
            }
        }
    }

    /// Hand over the next lot of the supply stream, `None` at its end.
    ///
    /// Returns whether the lot became the in-flight lot; empty lots are
    /// skipped and the matcher keeps asking.
    pub fn receive(&mut self, lot: Option<Lot>) -> bool {
        match lot {
            Some(lot) if lot.remaining > 0 => {
                self.lot = LotState::InFlight(lot);
                true
            }
            Some(_) => false,
            None => {
                self.lot = LotState::Exhausted;
                false
            }
        }
    }

    /// Match a whole sale, pulling lots from `next_lot` as needed
    pub fn match_sale<F>(
        &mut self,
        quantity: i64,
        price: i64,
        mut next_lot: F,
    ) -> Result<Settlement, TotalsOverflow>
    where
        F: FnMut() -> Option<Lot>,
    {
        self.open_sale(quantity, price);
        loop {
            match self.advance()? {
                Demand::NeedLot => {
                    self.receive(next_lot());
                }
                Demand::Settled(settlement) => return Ok(settlement),
            }
        }
    }

    /// Add `units` sold at `price` against `unit_cost` to the running totals.
    /// On overflow the totals are left as they were.
    fn accrue(&mut self, units: i64, price: i64, unit_cost: i64) -> Result<(), TotalsOverflow> {
        self.totals = Totals::of_units(units, price, unit_cost)
            .and_then(|step| self.totals.checked_add(step))
            .ok_or(TotalsOverflow)?;
        Ok(())
    }

    fn settle(&mut self, sale: OpenSale, backorder_quantity: i64) -> Demand {
        self.open = None;
        Demand::Settled(Settlement {
            totals: self.totals,
            cursor: self.lot.cursor(),
            matched_quantity: sale.matched,
            backorder_quantity,
        })
    }
}

/// Match a complete in-memory history of one SKU from scratch.
///
/// Inputs may be in any order; both are sorted by (time, id) first. The
/// result is aligned with the sorted sales.
pub fn simulate(
    sales: &[Sale],
    supplies: &[Supply],
) -> Result<Vec<(Sale, Settlement)>, TotalsOverflow> {
    let mut sales = sales.to_vec();
    sales.sort_by_key(Sale::position);
    let mut supplies = supplies.to_vec();
    supplies.sort_by_key(Supply::position);

    let mut lots = supplies.iter().map(Lot::from);
    let mut matcher = FifoMatcher::new(Seed::ORIGIN);

    let mut settled = Vec::with_capacity(sales.len());
    for sale in sales {
        let settlement = matcher.match_sale(
            i64::from(sale.quantity),
            i64::from(sale.price),
            || lots.next(),
        )?;
        settled.push((sale, settlement));
    }
    Ok(settled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use proptest::prelude::*;

    fn at(secs: i64) -> NaiveDateTime {
        chrono::DateTime::from_timestamp(1_700_000_000 + secs, 0)
            .unwrap()
            .naive_utc()
    }

    fn sale(id: i64, quantity: i32, price: i32, t: i64) -> Sale {
        Sale {
            id,
            barcode: 123,
            quantity,
            price,
            sale_time: at(t),
            total_quantity: 0,
            total_revenue: 0,
            total_net_profit: 0,
            last_matched_supply_id: None,
            lms_remaining_quantity: None,
            backorder_quantity: 0,
            supply_exhausted: false,
        }
    }

    fn supply(id: i64, quantity: i32, price: i32, t: i64) -> Supply {
        Supply {
            id,
            barcode: 123,
            quantity,
            price,
            supply_time: at(t),
            first_matched_sale_id: None,
        }
    }

    #[test]
    fn test_sale_spans_two_lots() {
        let sales = [sale(1, 15, 10, 2)];
        let supplies = [supply(1, 10, 5, 1), supply(2, 10, 7, 3)];

        let (_, settled) = simulate(&sales, &supplies).unwrap()[0];
        assert_eq!(settled.totals.quantity, 15);
        assert_eq!(settled.totals.revenue, 150);
        assert_eq!(settled.totals.net_profit, 65);
        assert_eq!(
            settled.cursor,
            LotCursor::Open {
                supply_id: 2,
                remaining: 5
            }
        );
        assert_eq!(settled.backorder_quantity, 0);
    }

    #[test]
    fn test_backorder_at_full_margin() {
        let sales = [sale(1, 15, 10, 2)];
        let supplies = [supply(1, 10, 5, 1)];

        let (_, settled) = simulate(&sales, &supplies).unwrap()[0];
        assert_eq!(settled.totals.revenue, 150);
        assert_eq!(settled.totals.net_profit, 100);
        assert_eq!(settled.totals.quantity, 15);
        assert_eq!(settled.matched_quantity, 10);
        assert_eq!(settled.backorder_quantity, 5);
        assert_eq!(settled.cursor, LotCursor::Exhausted);
    }

    #[test]
    fn test_zero_quantity_sale_carries_state() {
        let mut matcher = FifoMatcher::new(Seed {
            totals: Totals {
                quantity: 3,
                revenue: 30,
                net_profit: 9,
            },
            lot: LotState::InFlight(Lot::new(7, 4, 2)),
        });

        let settled = matcher
            .match_sale(0, 99, || panic!("no lot should be pulled"))
            .unwrap();
        assert_eq!(settled.totals.quantity, 3);
        assert_eq!(settled.totals.revenue, 30);
        assert_eq!(
            settled.cursor,
            LotCursor::Open {
                supply_id: 7,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_empty_lots_are_skipped() {
        let sales = [sale(1, 4, 10, 5)];
        let supplies = [supply(1, 0, 1, 1), supply(2, 0, 2, 2), supply(3, 6, 3, 3)];

        let (_, settled) = simulate(&sales, &supplies).unwrap()[0];
        assert_eq!(settled.totals.net_profit, 28);
        assert_eq!(
            settled.cursor,
            LotCursor::Open {
                supply_id: 3,
                remaining: 2
            }
        );
    }

    #[test]
    fn test_drained_lot_stays_in_flight_until_next_pull() {
        let sales = [sale(1, 10, 10, 2), sale(2, 1, 10, 3)];
        let supplies = [supply(1, 10, 5, 1), supply(2, 5, 8, 4)];

        let settled = simulate(&sales, &supplies).unwrap();
        assert_eq!(
            settled[0].1.cursor,
            LotCursor::Open {
                supply_id: 1,
                remaining: 0
            }
        );
        assert_eq!(
            settled[1].1.cursor,
            LotCursor::Open {
                supply_id: 2,
                remaining: 4
            }
        );
        assert_eq!(settled[1].1.totals.net_profit, 50 + 2);
    }

    #[test]
    fn test_step_protocol_reports_need_then_settles() {
        let mut matcher = FifoMatcher::new(Seed::ORIGIN);
        matcher.open_sale(3, 10);
        assert_eq!(matcher.advance(), Ok(Demand::NeedLot));
        assert!(!matcher.receive(Some(Lot::new(1, 2, 0))));
        assert_eq!(matcher.advance(), Ok(Demand::NeedLot));
        assert!(matcher.receive(Some(Lot::new(2, 2, 5))));
        match matcher.advance().unwrap() {
            Demand::Settled(s) => assert_eq!(s.totals.net_profit, 24),
            Demand::NeedLot => panic!("sale should be covered"),
        }
    }

    #[test]
    fn test_overflowing_totals_fail_instead_of_wrapping() {
        let sales = [
            sale(1, i32::MAX, i32::MAX, 1),
            sale(2, i32::MAX, i32::MAX, 2),
            sale(3, i32::MAX, i32::MAX, 3),
        ];
        assert_eq!(simulate(&sales[..2], &[]).unwrap().len(), 2);
        assert_eq!(simulate(&sales, &[]), Err(TotalsOverflow));

        let mut matcher = FifoMatcher::new(Seed {
            totals: Totals {
                quantity: 1,
                revenue: i64::MAX - 5,
                net_profit: 0,
            },
            lot: LotState::InFlight(Lot::new(1, 1, 10)),
        });
        assert_eq!(matcher.match_sale(1, 10, || None), Err(TotalsOverflow));
        assert_eq!(matcher.totals().revenue, i64::MAX - 5);
    }

    #[test]
    fn test_resuming_from_seed_matches_full_run() {
        let sales = [sale(1, 4, 10, 1), sale(2, 7, 12, 2), sale(3, 5, 9, 3)];
        let supplies = [supply(1, 6, 5, 0), supply(2, 6, 6, 1), supply(3, 6, 4, 2)];
        let full = simulate(&sales, &supplies).unwrap();

        // Resume after sale 1, which left lot 1 in flight with 2 units
        let (_, first) = full[0];
        let mut matcher = FifoMatcher::new(Seed {
            totals: first.totals,
            lot: LotState::InFlight(Lot::new(1, 5, 2)),
        });
        let mut rest = supplies[1..].iter().map(Lot::from);
        let second = matcher.match_sale(7, 12, || rest.next()).unwrap();
        let third = matcher.match_sale(5, 9, || rest.next()).unwrap();

        assert_eq!(second, full[1].1);
        assert_eq!(third, full[2].1);
    }

    fn history() -> impl Strategy<Value = (Vec<Sale>, Vec<Supply>)> {
        let sales = prop::collection::vec((0..20i32, 0..50i32, 0..30i64), 0..15);
        let supplies = prop::collection::vec((0..20i32, 0..50i32, 0..30i64), 0..15);
        (sales, supplies).prop_map(|(sales, supplies)| {
            let sales = sales
                .into_iter()
                .enumerate()
                .map(|(i, (q, p, t))| sale(i as i64 + 1, q, p, t))
                .collect();
            let supplies = supplies
                .into_iter()
                .enumerate()
                .map(|(i, (q, p, t))| supply(i as i64 + 1, q, p, t))
                .collect();
            (sales, supplies)
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Each sale adds exactly its own quantity, split between lots and backorder
        #[test]
        fn prop_prefix_sums_step_by_sale_quantity((sales, supplies) in history()) {
            let mut previous = Totals::ZERO;
            for (sale, settled) in simulate(&sales, &supplies).unwrap() {
                let step = settled.totals.checked_sub(previous).unwrap();
                prop_assert_eq!(step.quantity, i64::from(sale.quantity));
                prop_assert_eq!(settled.matched_quantity + settled.backorder_quantity, i64::from(sale.quantity));
                prop_assert!(settled.totals.quantity >= previous.quantity);
                previous = settled.totals;
            }
        }

        /// Matched units never exceed supplied units, and backorders only
        /// appear once every lot is used up
        #[test]
        fn prop_lots_drain_before_backorder((sales, supplies) in history()) {
            let supplied: i64 = supplies.iter().map(|s| i64::from(s.quantity)).sum();
            let settled = simulate(&sales, &supplies).unwrap();
            let matched: i64 = settled.iter().map(|(_, s)| s.matched_quantity).sum();
            prop_assert!(matched <= supplied);
            if settled.iter().any(|(_, s)| s.backorder_quantity > 0) {
                prop_assert_eq!(matched, supplied);
            }
        }

        /// Lots are consumed strictly in (time, id) order
        #[test]
        fn prop_cursor_moves_forward((sales, supplies) in history()) {
            let mut ordered = supplies.clone();
            ordered.sort_by_key(Supply::position);
            let rank = |id: i64| ordered.iter().position(|s| s.id == id);

            let mut last_rank = None;
            for (_, settled) in simulate(&sales, &supplies).unwrap() {
                if let LotCursor::Open { supply_id, .. } = settled.cursor {
                    let r = rank(supply_id);
                    prop_assert!(r >= last_rank);
                    last_rank = r;
                }
            }
        }

        #[test]
        fn prop_simulation_is_deterministic((sales, supplies) in history()) {
            prop_assert_eq!(simulate(&sales, &supplies), simulate(&sales, &supplies));
        }
    }
}
