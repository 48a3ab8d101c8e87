//! # Auction Book
//!
//! Every live auction behind its own lock.
//!
//! ## Locking
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  auctions: DashMap<PurchaseId, Arc<Mutex<Entry>>>                       │
//! │  Entry { auction, finalizing }                                          │
//! │                                                                         │
//! │  post_bid(id, bidder, amount)                                           │
//! │    slot = auctions[id]          (shard guard released immediately)      │
//! │    lock(slot)                                                           │
//! │      finalizing? → AuctionClosed(Finalizing)                            │
//! │      now = clock.now()          read under the lock, so acceptance     │
//! │      next = auction + bid       order and time order agree             │
//! │      store.save_auction(next)   fails → bid rejected, nothing changed  │
//! │      auction = next                                                     │
//! │    unlock                                                               │
//! │    publish BidAccepted | BidRejected                                    │
//! │                                                                         │
//! │  finalize(id, trigger)                                                  │
//! │    lock(slot)                                                           │
//! │      check_finalizable          nothing touched yet                     │
//! │      reserve stock              winner only; fails → auction stays open │
//! │      next = auction.clone().finalize()                                  │
//! │      finalizing = true                                                  │
//! │    unlock                                                               │
//! │    store.save_auction(next)     outside the lock; bids and other        │
//! │    store.save_bid_receipt       finalizers are turned away meanwhile    │
//! │    lock(slot)                                                           │
//! │      ok   → auction = next, commit reservation                          │
//! │      fail → re-save old auction, release reservation                    │
//! │      finalizing = false                                                 │
//! │    unlock                                                               │
//! │    publish AuctionResolved                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two auctions never share a lock. Every accepted bid is in the store
//! before it is visible, so an auction reloaded from the store never goes
//! back below a bid that was already acknowledged.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use bazaar_core::auction::{AcceptedBid, Auction, AuctionView, FinalizeTrigger, NewAuction};
use bazaar_core::purchase::BidReceipt;
use bazaar_core::{ClosedReason, CoreError, Money, PurchaseId, UserId};

use crate::clock::Clock;
use crate::error::EngineResult;
use crate::events::{EventBus, MarketEvent};
use crate::stock::StockLedger;
use crate::store::PurchaseStore;

/// A live auction and whether a finalize is currently writing it out.
struct Entry {
    auction: Auction,
    finalizing: bool,
}

impl Entry {
    fn new(auction: Auction) -> Self {
        Entry {
            auction,
            finalizing: false,
        }
    }
}

type Slot = Arc<Mutex<Entry>>;

pub struct AuctionBook {
    auctions: DashMap<PurchaseId, Slot>,
    stock: Arc<StockLedger>,
    store: Arc<dyn PurchaseStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl AuctionBook {
    pub fn new(
        stock: Arc<StockLedger>,
        store: Arc<dyn PurchaseStore>,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        AuctionBook {
            auctions: DashMap::new(),
            stock,
            store,
            clock,
            events,
        }
    }

    /// Opens an auction and returns its id.
    pub fn open(&self, request: NewAuction) -> EngineResult<PurchaseId> {
        let auction = Auction::open(request, self.clock.now())?;
        self.store.save_auction(&auction)?;

        let id = auction.id();
        info!(
            auction_id = %id,
            shop = %auction.shop(),
            initial_price = auction.initial_price().cents(),
            windowed = auction.window().is_some(),
            "Auction opened"
        );
        self.auctions.insert(id, Arc::new(Mutex::new(Entry::new(auction))));
        Ok(id)
    }

    /// Places a bid. Rejections are published as well as returned.
    ///
    /// ## Errors
    /// - `BidTooLow`, `SelfBid`, `AuctionClosed`, validation errors
    /// - storage errors; the bid is not accepted
    pub fn post_bid(
        &self,
        id: PurchaseId,
        bidder: UserId,
        amount: Money,
    ) -> EngineResult<AcceptedBid> {
        let slot = self.slot(id)?;
        let result = {
            let mut entry = slot.lock();
            let now = self.clock.now();
            self.place_bid(&mut entry, bidder, amount, now)
        };

        match &result {
            Ok(accepted) => {
                debug!(auction_id = %id, bidder = %bidder, amount = amount.cents(), "Bid accepted");
                self.events.publish(MarketEvent::BidAccepted {
                    auction_id: id,
                    bidder,
                    amount,
                    outbid: accepted.outbid.map(|(user, _)| user),
                });
            }
            Err(err) => {
                debug!(auction_id = %id, bidder = %bidder, amount = amount.cents(), %err, "Bid rejected");
                self.events.publish(MarketEvent::BidRejected {
                    auction_id: id,
                    bidder,
                    amount,
                    reason: err.to_string(),
                });
            }
        }

        result
    }

    fn place_bid(
        &self,
        entry: &mut Entry,
        bidder: UserId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> EngineResult<AcceptedBid> {
        if entry.finalizing {
            return Err(CoreError::AuctionClosed {
                auction_id: entry.auction.id(),
                reason: ClosedReason::Finalizing,
            }
            .into());
        }

        let mut next = entry.auction.clone();
        let accepted = next.post_bid(bidder, amount, now)?;
        self.store.save_auction(&next)?;
        entry.auction = next;
        Ok(accepted)
    }

    /// Closes an auction and returns its receipt.
    ///
    /// ## Errors
    /// - `AlreadyFinalized`, `AuctionStillRunning`, `NotPermitted`
    /// - `ConcurrencyConflict` while another finalize of the same auction is
    ///   writing it out
    /// - `InsufficientStock` when the lot can no longer be delivered; the
    ///   auction stays open and can be finalized again after a restock
    /// - storage errors, with the auction left unchanged
    pub fn finalize(&self, id: PurchaseId, trigger: FinalizeTrigger) -> EngineResult<BidReceipt> {
        let slot = self.slot(id)?;

        let (next, receipt, reservation) = {
            let mut entry = slot.lock();
            if entry.finalizing {
                return Err(CoreError::ConcurrencyConflict {
                    resource: format!("auction {id}"),
                    attempts: 1,
                }
                .into());
            }

            let now = self.clock.now();
            entry.auction.check_finalizable(trigger, now)?;

            let reservation = match entry.auction.highest_bidder() {
                Some(_) => Some(
                    self.stock
                        .reserve(entry.auction.shop(), entry.auction.items())?,
                ),
                None => None,
            };

            let mut next = entry.auction.clone();
            let receipt = next.finalize(trigger, now)?;
            entry.finalizing = true;
            (next, receipt, reservation)
        };

        if let Err(err) = self.write_finalized(&next, &receipt) {
            drop(reservation);
            let mut entry = slot.lock();
            if let Err(restore) = self.store.save_auction(&entry.auction) {
                error!(auction_id = %id, %restore, "Failed to restore auction after finalize write failure");
            }
            entry.finalizing = false;
            return Err(err);
        }

        {
            let mut entry = slot.lock();
            entry.auction = next;
            entry.finalizing = false;
        }
        if let Some(reservation) = reservation {
            reservation.commit();
        }

        info!(
            auction_id = %id,
            winner = ?receipt.winner,
            final_price = receipt.final_price.cents(),
            outcome = ?receipt.outcome,
            "Auction resolved"
        );
        self.events.publish(MarketEvent::AuctionResolved {
            receipt: receipt.clone(),
        });
        Ok(receipt)
    }

    fn write_finalized(&self, next: &Auction, receipt: &BidReceipt) -> EngineResult<()> {
        self.store.save_auction(next)?;
        self.store.save_bid_receipt(receipt)?;
        Ok(())
    }

    pub fn view(&self, id: PurchaseId) -> EngineResult<AuctionView> {
        let slot = self.slot(id)?;
        let view = slot.lock().auction.snapshot(self.clock.now());
        Ok(view)
    }

    pub fn bidders(&self, id: PurchaseId) -> EngineResult<BTreeSet<UserId>> {
        let slot = self.slot(id)?;
        let bidders = slot.lock().auction.bidders();
        Ok(bidders)
    }

    /// Windowed auctions whose end has passed but which are still open.
    pub fn expired_ids(&self) -> Vec<PurchaseId> {
        let now = self.clock.now();
        self.slots()
            .into_iter()
            .filter(|(_, slot)| slot.lock().auction.is_expired(now))
            .map(|(id, _)| id)
            .collect()
    }

    /// Drops finalized auctions from memory. They stay in the store and are
    /// reloaded on demand.
    pub fn prune_finalized(&self) -> usize {
        let before = self.auctions.len();
        self.auctions
            .retain(|_, slot| !slot.lock().auction.is_finalized());
        before - self.auctions.len()
    }

    /// Auctions currently held in memory.
    pub fn len(&self) -> usize {
        self.auctions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auctions.is_empty()
    }

    fn slots(&self) -> Vec<(PurchaseId, Slot)> {
        self.auctions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    fn slot(&self, id: PurchaseId) -> EngineResult<Slot> {
        if let Some(slot) = self.auctions.get(&id) {
            return Ok(Arc::clone(slot.value()));
        }

        let auction = self
            .store
            .load_auction(id)?
            .ok_or(CoreError::AuctionNotFound(id))?;
        debug!(auction_id = %id, "Auction reloaded from store");

        let slot = self
            .auctions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(Entry::new(auction))));
        Ok(Arc::clone(slot.value()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
