//! Auctions under many concurrent bidders and finalizers.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, TimeZone, Utc};

use bazaar_core::auction::{AuctionStatus, FinalizeTrigger, NewAuction};
use bazaar_core::{CoreError, ItemId, Money, PurchaseId, ShopId, UserId};
use bazaar_engine::{
    AuctionBook, Clock, EngineError, EventBus, InMemoryStore, ManualClock, MarketEvent,
    PurchaseStore, StockLedger,
};

const SHOP: ShopId = ShopId::new(7);
const VASE: ItemId = ItemId::new(77);
const OWNER: UserId = UserId::new(1);

struct Fixture {
    book: Arc<AuctionBook>,
    stock: Arc<StockLedger>,
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    events: EventBus,
}

fn fixture(stock_level: u32) -> Fixture {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
    ));
    let stock = Arc::new(StockLedger::new(1_000));
    stock.restock(SHOP, VASE, stock_level).unwrap();
    let store = Arc::new(InMemoryStore::new());
    let events = EventBus::new(1_024);
    let book = Arc::new(AuctionBook::new(
        stock.clone(),
        store.clone(),
        clock.clone(),
        events.clone(),
    ));
    Fixture {
        book,
        stock,
        store,
        clock,
        events,
    }
}

fn open(f: &Fixture, window: Option<i64>) -> PurchaseId {
    let start = f.clock.now();
    f.book
        .open(NewAuction {
            initiator: OWNER,
            shop: SHOP,
            items: [(VASE, 1)].into_iter().collect(),
            initial_price: Money::from_cents(10_000),
            start: window.map(|_| start),
            end: window.map(|m| start + Duration::minutes(m)),
        })
        .unwrap()
}

#[test]
fn concurrent_bids_converge_to_the_maximum() {
    let f = fixture(1);
    let auction = open(&f, None);

    const BIDDERS: u64 = 16;
    const ROUNDS: i64 = 25;
    let barrier = Arc::new(Barrier::new(BIDDERS as usize));

    let handles: Vec<_> = (0..BIDDERS)
        .map(|b| {
            let book = Arc::clone(&f.book);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let bidder = UserId::new(100 + b);
                barrier.wait();
                let mut accepted = Vec::new();
                // Interleaved distinct amounts, highest rounds submitted first
                for round in (0..ROUNDS).rev() {
                    let amount = Money::from_cents(10_000 + 1 + round * BIDDERS as i64 + b as i64);
                    match book.post_bid(auction, bidder, amount) {
                        Ok(bid) => accepted.push(bid.amount),
                        Err(EngineError::Core(CoreError::BidTooLow { .. })) => {}
                        Err(other) => panic!("unexpected rejection: {other}"),
                    }
                }
                (bidder, accepted)
            })
        })
        .collect();

    let results: Vec<(UserId, Vec<Money>)> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let max_amount = Money::from_cents(10_000 + 1 + (ROUNDS - 1) * BIDDERS as i64 + (BIDDERS as i64 - 1));
    let view = f.book.view(auction).unwrap();
    assert_eq!(view.highest_bid, max_amount);
    assert_eq!(view.highest_bidder, Some(UserId::new(100 + BIDDERS - 1)));

    // No lost updates: every accepted bid is in the ledger, nothing else is
    let accepted_total: usize = results.iter().map(|(_, a)| a.len()).sum();
    assert_eq!(view.bid_count, accepted_total);

    let expected_bidders: BTreeSet<UserId> = results
        .iter()
        .filter(|(_, a)| !a.is_empty())
        .map(|(bidder, _)| *bidder)
        .collect();
    assert_eq!(f.book.bidders(auction).unwrap(), expected_bidders);
}

#[test]
fn accepted_bids_strictly_increase() {
    let f = fixture(1);
    let auction = open(&f, None);
    let mut rx = f.events.subscribe();

    thread::scope(|scope| {
        for b in 0..8u64 {
            let book = &f.book;
            scope.spawn(move || {
                for step in 0..20i64 {
                    let amount = Money::from_cents(10_001 + step * 8 + ((b as i64 * 3) % 8));
                    let _ = book.post_bid(auction, UserId::new(200 + b), amount);
                }
            });
        }
    });
    f.book
        .finalize(auction, FinalizeTrigger::Manual { by: UserId::new(99) })
        .unwrap();

    // The ledger is persisted at finalize
    let stored = f.store.load_auction(auction).unwrap().unwrap();
    assert!(stored
        .bids()
        .windows(2)
        .all(|pair| pair[0].amount < pair[1].amount));
    assert_eq!(stored.bids().last().map(|b| b.amount), Some(stored.highest_bid()));

    // Events may arrive out of acceptance order, but one per accepted bid
    let mut accepted = 0;
    while let Ok(event) = rx.try_recv() {
        if let MarketEvent::BidAccepted { .. } = event {
            accepted += 1;
        }
    }
    assert_eq!(accepted, stored.bids().len());
}

#[test]
fn racing_finalizers_produce_one_receipt() {
    let f = fixture(3);
    let auction = open(&f, Some(10));
    f.book
        .post_bid(auction, UserId::new(2), Money::from_cents(12_000))
        .unwrap();
    f.clock.advance(Duration::minutes(11));

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8u64)
        .map(|n| {
            let book = Arc::clone(&f.book);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let trigger = if n % 2 == 0 {
                    FinalizeTrigger::Expiry
                } else {
                    FinalizeTrigger::Manual {
                        by: UserId::new(50 + n),
                    }
                };
                book.finalize(auction, trigger)
            })
        })
        .collect();

    let mut receipts = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => receipts += 1,
            // Lost to the winner, either after it finished or while it was writing
            Err(EngineError::Core(CoreError::AlreadyFinalized(_)))
            | Err(EngineError::Core(CoreError::ConcurrencyConflict { .. })) => {}
            Err(other) => panic!("unexpected finalize error: {other}"),
        }
    }

    assert_eq!(receipts, 1);
    assert_eq!(f.stock.available(SHOP, VASE), 2);
    assert_eq!(
        f.book.view(auction).unwrap().status,
        AuctionStatus::Completed
    );
    let stored = f.store.load_bid_receipt(auction).unwrap().unwrap();
    assert_eq!(stored.final_price, Money::from_cents(12_000));
}

#[test]
fn bids_and_finalize_race_without_losing_the_winner() {
    let f = fixture(1);
    let auction = open(&f, None);
    let manager = UserId::new(99);

    let (bid_results, receipt) = thread::scope(|scope| {
        let bidders: Vec<_> = (0..6u64)
            .map(|b| {
                let book = &f.book;
                scope.spawn(move || {
                    book.post_bid(auction, UserId::new(300 + b), Money::from_cents(10_100 + b as i64))
                        .is_ok()
                })
            })
            .collect();
        let closer = scope.spawn(|| f.book.finalize(auction, FinalizeTrigger::Manual { by: manager }));

        let accepted: Vec<bool> = bidders.into_iter().map(|h| h.join().unwrap()).collect();
        (accepted, closer.join().unwrap().unwrap())
    });

    // Whatever was accepted before the close decides the winner
    let view = f.book.view(auction).unwrap();
    assert_eq!(receipt.winner, view.highest_bidder);
    assert_eq!(receipt.final_price, view.highest_bid);
    assert_eq!(bid_results.iter().filter(|ok| **ok).count(), view.bid_count);
    assert!(f
        .book
        .post_bid(auction, UserId::new(400), Money::from_cents(99_999))
        .is_err());
}
