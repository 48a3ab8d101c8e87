//! # Stock Ledger
//!
//! Per-item atomic stock counters and the reserve-then-commit guard shared
//! by checkout and auction finalization.
//!
//! ## Reservation Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  reserve(shop, lines)                                                   │
//! │    for each line:                                                       │
//! │      loop (≤ max_cas_retries)                                           │
//! │        seen = counter.load()                                            │
//! │        seen < qty ──► roll back earlier lines, InsufficientStock        │
//! │        CAS(seen → seen - qty) ok ──► next line                          │
//! │        CAS failed (someone else won) ──► retry                          │
//! │      retries exhausted ──► roll back, ConcurrencyConflict               │
//! │                                                                         │
//! │  Reservation (RAII)                                                     │
//! │    .commit()   keep the decrements                                      │
//! │    .release()  give them back                                           │
//! │    drop        give them back (unless committed)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A counter never goes below zero, so two buyers can never both take the
//! last unit.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use bazaar_core::validation::validate_quantity;
use bazaar_core::{CoreError, CoreResult, ItemId, ItemQuantities, ShopId, ValidationError};

type StockKey = (ShopId, ItemId);

// =============================================================================
// Ledger
// =============================================================================

/// One atomic counter per `(shop, item)`.
#[derive(Debug)]
pub struct StockLedger {
    counters: DashMap<StockKey, Arc<AtomicI64>>,
    max_cas_retries: u32,
}

impl StockLedger {
    pub fn new(max_cas_retries: u32) -> Self {
        StockLedger {
            counters: DashMap::new(),
            max_cas_retries: max_cas_retries.max(1),
        }
    }

    /// Units currently available. Unknown items have none.
    pub fn available(&self, shop: ShopId, item: ItemId) -> i64 {
        self.counters
            .get(&(shop, item))
            .map(|c| c.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Adds units and returns the new level.
    pub fn restock(&self, shop: ShopId, item: ItemId, quantity: u32) -> CoreResult<i64> {
        validate_quantity(quantity as i64)?;
        let counter = self.counter_or_create(shop, item);
        let level = counter.fetch_add(quantity as i64, Ordering::AcqRel) + quantity as i64;
        debug!(shop = %shop, item = %item, level, "Restocked");
        Ok(level)
    }

    /// Overwrites the level, e.g. after a stock count.
    pub fn set_stock(&self, shop: ShopId, item: ItemId, level: i64) -> CoreResult<()> {
        if level < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "stock".to_string(),
            }
            .into());
        }
        self.counter_or_create(shop, item)
            .store(level, Ordering::Release);
        Ok(())
    }

    /// Takes every line or none of them.
    ///
    /// ## Errors
    /// - `InsufficientStock` for the first line that cannot be covered
    /// - `ConcurrencyConflict` when a line kept losing its CAS race
    pub fn reserve(&self, shop: ShopId, lines: &ItemQuantities) -> CoreResult<Reservation> {
        let mut reservation = Reservation {
            shop,
            lines: Vec::with_capacity(lines.len()),
            committed: false,
        };

        for (item, qty) in lines {
            validate_quantity(*qty as i64)?;
            // An early return drops `reservation`, which restores earlier lines
            let counter = self.take(shop, *item, *qty as i64)?;
            reservation.lines.push(ReservedLine {
                item: *item,
                quantity: *qty as i64,
                counter,
            });
        }

        debug!(shop = %shop, lines = reservation.lines.len(), "Stock reserved");
        Ok(reservation)
    }

    fn take(&self, shop: ShopId, item: ItemId, qty: i64) -> CoreResult<Arc<AtomicI64>> {
        let counter = self
            .counters
            .get(&(shop, item))
            .map(|c| Arc::clone(c.value()))
            .ok_or(CoreError::InsufficientStock {
                item,
                available: 0,
                requested: qty,
            })?;

        for _ in 0..self.max_cas_retries {
            let seen = counter.load(Ordering::Acquire);
            if seen < qty {
                return Err(CoreError::InsufficientStock {
                    item,
                    available: seen,
                    requested: qty,
                });
            }
            if counter
                .compare_exchange(seen, seen - qty, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(counter);
            }
            std::hint::spin_loop();
        }

        warn!(shop = %shop, item = %item, attempts = self.max_cas_retries, "Stock contention exhausted retries");
        Err(CoreError::ConcurrencyConflict {
            resource: format!("stock {}/{}", shop, item),
            attempts: self.max_cas_retries,
        })
    }

    fn counter_or_create(&self, shop: ShopId, item: ItemId) -> Arc<AtomicI64> {
        Arc::clone(
            self.counters
                .entry((shop, item))
                .or_insert_with(|| Arc::new(AtomicI64::new(0)))
                .value(),
        )
    }
}

// =============================================================================
// Reservation Guard
// =============================================================================

#[derive(Debug)]
struct ReservedLine {
    item: ItemId,
    quantity: i64,
    counter: Arc<AtomicI64>,
}

/// Stock taken but not yet sold. Gives it back on drop unless committed.
#[derive(Debug)]
#[must_use = "dropping a reservation immediately returns the stock"]
pub struct Reservation {
    shop: ShopId,
    lines: Vec<ReservedLine>,
    committed: bool,
}

impl Reservation {
    pub fn shop(&self) -> ShopId {
        self.shop
    }

    /// Reserved `(item, quantity)` pairs.
    pub fn lines(&self) -> impl Iterator<Item = (ItemId, i64)> + '_ {
        self.lines.iter().map(|l| (l.item, l.quantity))
    }

    /// Makes the decrements permanent.
    pub fn commit(mut self) {
        self.committed = true;
    }

    /// Returns the stock now.
    pub fn release(self) {}
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for line in self.lines.drain(..) {
            line.counter.fetch_add(line.quantity, Ordering::AcqRel);
        }
        debug!(shop = %self.shop, "Reservation rolled back");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const SHOP: ShopId = ShopId::new(1);
    const PEN: ItemId = ItemId::new(10);
    const INK: ItemId = ItemId::new(11);

    fn lines(pairs: &[(ItemId, u32)]) -> ItemQuantities {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_commit_keeps_decrement() {
        let ledger = StockLedger::new(8);
        ledger.restock(SHOP, PEN, 5).unwrap();

        let reservation = ledger.reserve(SHOP, &lines(&[(PEN, 3)])).unwrap();
        assert_eq!(ledger.available(SHOP, PEN), 2);
        reservation.commit();
        assert_eq!(ledger.available(SHOP, PEN), 2);
    }

    #[test]
    fn test_drop_and_release_restore() {
        let ledger = StockLedger::new(8);
        ledger.restock(SHOP, PEN, 5).unwrap();

        {
            let _reservation = ledger.reserve(SHOP, &lines(&[(PEN, 5)])).unwrap();
            assert_eq!(ledger.available(SHOP, PEN), 0);
        }
        assert_eq!(ledger.available(SHOP, PEN), 5);

        ledger.reserve(SHOP, &lines(&[(PEN, 2)])).unwrap().release();
        assert_eq!(ledger.available(SHOP, PEN), 5);
    }

    #[test]
    fn test_partial_failure_rolls_back_earlier_lines() {
        let ledger = StockLedger::new(8);
        ledger.restock(SHOP, PEN, 5).unwrap();
        ledger.restock(SHOP, INK, 1).unwrap();

        let err = ledger
            .reserve(SHOP, &lines(&[(PEN, 2), (INK, 3)]))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { item, available: 1, requested: 3 } if item == INK
        ));
        assert_eq!(ledger.available(SHOP, PEN), 5);
        assert_eq!(ledger.available(SHOP, INK), 1);
    }

    #[test]
    fn test_unknown_item_has_no_stock() {
        let ledger = StockLedger::new(8);
        assert_eq!(ledger.available(SHOP, PEN), 0);
        assert!(matches!(
            ledger.reserve(SHOP, &lines(&[(PEN, 1)])),
            Err(CoreError::InsufficientStock { available: 0, .. })
        ));
    }

    #[test]
    fn test_set_stock_rejects_negative() {
        let ledger = StockLedger::new(8);
        assert!(ledger.set_stock(SHOP, PEN, -1).is_err());
        ledger.set_stock(SHOP, PEN, 7).unwrap();
        assert_eq!(ledger.available(SHOP, PEN), 7);
    }

    #[test]
    fn test_concurrent_reservations_never_oversell() {
        let ledger = Arc::new(StockLedger::new(1_000));
        ledger.restock(SHOP, PEN, 100).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    let mut sold = 0;
                    for _ in 0..50 {
                        if let Ok(r) = ledger.reserve(SHOP, &lines(&[(PEN, 1)])) {
                            r.commit();
                            sold += 1;
                        }
                    }
                    sold
                })
            })
            .collect();

        let sold: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(sold, 100);
        assert_eq!(ledger.available(SHOP, PEN), 0);
    }
}
