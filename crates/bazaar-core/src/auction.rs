//! # Auction State Machine
//!
//! An auction is a purchase whose price is set by competing bids. This
//! module is the pure state machine; the engine crate wraps each auction in
//! its own lock and feeds it the current time.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   open(...)                                                             │
//! │      │                                                                  │
//! │      ├── window, now < start ──► SCHEDULED ── now ≥ start ──┐           │
//! │      │                                                      ▼           │
//! │      └──────────────────────────────────────────────────► ACTIVE        │
//! │                                                           │    │        │
//! │                                     post_bid (amount >    │    │        │
//! │                                     highest, not self) ◄──┘    │        │
//! │                                                                │        │
//! │                          window, now ≥ end                     │        │
//! │                 ┌──────────────────────────────────────────────┘        │
//! │                 ▼                                                       │
//! │      AWAITING FINALIZATION ── finalize ──┬──► COMPLETED (sold)          │
//! │                                          └──► CLOSED NO WINNER          │
//! │                                                                         │
//! │   No window: ACTIVE until finalize(Manual { by ≠ initiator })           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - `highest_bid` never decreases; it starts at `initial_price`
//! - the initiator never appears as a bidder
//! - once finalized, every later bid or finalize is rejected

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClosedReason, CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::purchase::{BidOutcome, BidReceipt};
use crate::types::{ItemQuantities, PurchaseId, ShopId, UserId};
use crate::validation::{
    validate_auction_window, validate_bid_amount, validate_initial_price, validate_items,
};

// =============================================================================
// Supporting Types
// =============================================================================

/// Bidding window. Bids are accepted for `start ≤ now < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AuctionWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}

/// Parameters for [`Auction::open`].
#[derive(Debug, Clone)]
pub struct NewAuction {
    pub initiator: UserId,
    pub shop: ShopId,
    pub items: ItemQuantities,
    pub initial_price: Money,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    AwaitingFinalization,
    Completed,
    ClosedNoWinner,
}

/// Who or what is closing the auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeTrigger {
    /// A shop owner or manager accepts the current highest bid.
    Manual { by: UserId },
    /// The sweeper noticed the window has ended.
    Expiry,
}

/// One accepted bid in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidEntry {
    pub bidder: UserId,
    pub amount: Money,
    pub placed_at: DateTime<Utc>,
}

/// Result of an accepted bid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedBid {
    pub auction_id: PurchaseId,
    pub bidder: UserId,
    pub amount: Money,
    /// The bid this one displaced, if any.
    pub outbid: Option<(UserId, Money)>,
}

/// Read-only snapshot for callers outside the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionView {
    pub id: PurchaseId,
    pub initiator: UserId,
    pub shop: ShopId,
    pub items: ItemQuantities,
    pub initial_price: Money,
    pub highest_bid: Money,
    pub highest_bidder: Option<UserId>,
    pub window: Option<AuctionWindow>,
    pub status: AuctionStatus,
    pub bid_count: usize,
}

// =============================================================================
// Auction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    id: PurchaseId,
    initiator: UserId,
    shop: ShopId,
    items: ItemQuantities,
    initial_price: Money,
    window: Option<AuctionWindow>,
    highest_bid: Money,
    highest_bidder: Option<UserId>,
    bids: Vec<BidEntry>,
    created_at: DateTime<Utc>,
    receipt: Option<BidReceipt>,
}

impl Auction {
    /// Opens an auction.
    ///
    /// ## Errors
    /// - empty or malformed `items`
    /// - non-positive `initial_price`
    /// - half-given window, `end ≤ start`, or `end ≤ now`
    pub fn open(request: NewAuction, now: DateTime<Utc>) -> CoreResult<Self> {
        validate_items(&request.items)?;
        validate_initial_price(request.initial_price)?;
        validate_auction_window(request.start, request.end)?;

        let window = match (request.start, request.end) {
            (Some(start), Some(end)) => {
                if end <= now {
                    return Err(ValidationError::InvalidFormat {
                        field: "auction window".to_string(),
                        reason: "end must be in the future".to_string(),
                    }
                    .into());
                }
                Some(AuctionWindow { start, end })
            }
            _ => None,
        };

        Ok(Auction {
            id: PurchaseId::generate(),
            initiator: request.initiator,
            shop: request.shop,
            items: request.items,
            initial_price: request.initial_price,
            window,
            highest_bid: request.initial_price,
            highest_bidder: None,
            bids: Vec::new(),
            created_at: now,
            receipt: None,
        })
    }

    pub fn id(&self) -> PurchaseId {
        self.id
    }

    pub fn initiator(&self) -> UserId {
        self.initiator
    }

    pub fn shop(&self) -> ShopId {
        self.shop
    }

    pub fn items(&self) -> &ItemQuantities {
        &self.items
    }

    pub fn initial_price(&self) -> Money {
        self.initial_price
    }

    pub fn window(&self) -> Option<AuctionWindow> {
        self.window
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn highest_bid(&self) -> Money {
        self.highest_bid
    }

    pub fn highest_bidder(&self) -> Option<UserId> {
        self.highest_bidder
    }

    /// Accepted bids in acceptance order.
    pub fn bids(&self) -> &[BidEntry] {
        &self.bids
    }

    /// Every user who has placed an accepted bid.
    pub fn bidders(&self) -> BTreeSet<UserId> {
        self.bids.iter().map(|b| b.bidder).collect()
    }

    pub fn receipt(&self) -> Option<&BidReceipt> {
        self.receipt.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.receipt.is_some()
    }

    /// True once a windowed auction is over but not yet finalized.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == AuctionStatus::AwaitingFinalization
    }

    pub fn status(&self, now: DateTime<Utc>) -> AuctionStatus {
        if let Some(receipt) = &self.receipt {
            return match receipt.outcome {
                BidOutcome::Sold => AuctionStatus::Completed,
                BidOutcome::NoBids => AuctionStatus::ClosedNoWinner,
            };
        }
        match self.window {
            Some(w) if now < w.start => AuctionStatus::Scheduled,
            Some(w) if now >= w.end => AuctionStatus::AwaitingFinalization,
            _ => AuctionStatus::Active,
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> AuctionView {
        AuctionView {
            id: self.id,
            initiator: self.initiator,
            shop: self.shop,
            items: self.items.clone(),
            initial_price: self.initial_price,
            highest_bid: self.highest_bid,
            highest_bidder: self.highest_bidder,
            window: self.window,
            status: self.status(now),
            bid_count: self.bids.len(),
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Places a bid.
    ///
    /// ## Check Order
    /// amount > 0 → not finalized → window open → not initiator →
    /// amount > highest. The first failing check decides the error, and a
    /// rejected bid changes nothing.
    pub fn post_bid(
        &mut self,
        bidder: UserId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> CoreResult<AcceptedBid> {
        validate_bid_amount(amount)?;

        if self.is_finalized() {
            return Err(self.closed(ClosedReason::Completed));
        }
        if let Some(window) = self.window {
            if now < window.start {
                return Err(self.closed(ClosedReason::NotStarted));
            }
            if now >= window.end {
                return Err(self.closed(ClosedReason::Ended));
            }
        }
        if bidder == self.initiator {
            return Err(CoreError::SelfBid(bidder));
        }
        if amount <= self.highest_bid {
            return Err(CoreError::BidTooLow {
                amount,
                highest: self.highest_bid,
            });
        }

        let outbid = self.highest_bidder.map(|user| (user, self.highest_bid));
        self.highest_bid = amount;
        self.highest_bidder = Some(bidder);
        self.bids.push(BidEntry {
            bidder,
            amount,
            placed_at: now,
        });

        Ok(AcceptedBid {
            auction_id: self.id,
            bidder,
            amount,
            outbid,
        })
    }

    /// Checks whether [`Auction::finalize`] would succeed, without changing
    /// anything. The engine calls this before touching stock.
    pub fn check_finalizable(&self, trigger: FinalizeTrigger, now: DateTime<Utc>) -> CoreResult<()> {
        if self.is_finalized() {
            return Err(CoreError::AlreadyFinalized(self.id));
        }
        if let FinalizeTrigger::Manual { by } = trigger {
            if by == self.initiator {
                return Err(self.not_permitted("the initiator cannot accept their own auction"));
            }
        }
        match (self.window, trigger) {
            (Some(window), _) if now < window.end => Err(CoreError::AuctionStillRunning(self.id)),
            (None, FinalizeTrigger::Expiry) => {
                Err(self.not_permitted("auction has no end time to expire"))
            }
            _ => Ok(()),
        }
    }

    /// Closes the auction and issues its receipt.
    ///
    /// With no bids the outcome is [`BidOutcome::NoBids`] at the initial
    /// price and no winner.
    pub fn finalize(&mut self, trigger: FinalizeTrigger, now: DateTime<Utc>) -> CoreResult<BidReceipt> {
        self.check_finalizable(trigger, now)?;

        let outcome = match self.highest_bidder {
            Some(_) => BidOutcome::Sold,
            None => BidOutcome::NoBids,
        };
        let receipt = BidReceipt {
            auction_id: self.id,
            initiator: self.initiator,
            shop: self.shop,
            items: self.items.clone(),
            initial_price: self.initial_price,
            final_price: self.highest_bid,
            winner: self.highest_bidder,
            outcome,
            auction_end: self.window.map(|w| w.end),
            completed_at: now,
        };
        self.receipt = Some(receipt.clone());
        Ok(receipt)
    }

    fn closed(&self, reason: ClosedReason) -> CoreError {
        CoreError::AuctionClosed {
            auction_id: self.id,
            reason,
        }
    }

    fn not_permitted(&self, reason: &str) -> CoreError {
        CoreError::NotPermitted {
            purchase_id: self.id,
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemId;
    use chrono::{Duration, TimeZone};

    const OWNER: UserId = UserId::new(1);
    const ALICE: UserId = UserId::new(2);
    const BOB: UserId = UserId::new(3);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn request(window: Option<(i64, i64)>) -> NewAuction {
        NewAuction {
            initiator: OWNER,
            shop: ShopId::new(10),
            items: [(ItemId::new(7), 1)].into_iter().collect(),
            initial_price: Money::from_cents(5_000),
            start: window.map(|(s, _)| t0() + Duration::minutes(s)),
            end: window.map(|(_, e)| t0() + Duration::minutes(e)),
        }
    }

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn test_open_validation() {
        let mut bad = request(None);
        bad.initial_price = Money::zero();
        assert!(Auction::open(bad, t0()).is_err());

        let mut bad = request(None);
        bad.items.clear();
        assert!(Auction::open(bad, t0()).is_err());

        assert!(Auction::open(request(Some((0, 0))), t0()).is_err());
        assert!(Auction::open(request(Some((-20, -10))), t0()).is_err());
    }

    #[test]
    fn test_bids_must_strictly_increase() {
        let mut auction = Auction::open(request(None), t0()).unwrap();

        // Ties with the initial price are rejected
        assert!(matches!(
            auction.post_bid(ALICE, cents(5_000), t0()),
            Err(CoreError::BidTooLow { .. })
        ));

        let first = auction.post_bid(ALICE, cents(5_100), t0()).unwrap();
        assert_eq!(first.outbid, None);

        let second = auction.post_bid(BOB, cents(5_200), t0()).unwrap();
        assert_eq!(second.outbid, Some((ALICE, cents(5_100))));

        assert!(auction.post_bid(ALICE, cents(5_200), t0()).is_err());
        assert_eq!(auction.highest_bid(), cents(5_200));
        assert_eq!(auction.highest_bidder(), Some(BOB));
        assert_eq!(auction.bidders().len(), 2);
    }

    #[test]
    fn test_self_bid_rejected() {
        let mut auction = Auction::open(request(None), t0()).unwrap();
        assert!(matches!(
            auction.post_bid(OWNER, cents(9_000), t0()),
            Err(CoreError::SelfBid(id)) if id == OWNER
        ));
        assert!(auction.bids().is_empty());
    }

    #[test]
    fn test_non_positive_bid_is_validation_error() {
        let mut auction = Auction::open(request(None), t0()).unwrap();
        assert!(matches!(
            auction.post_bid(ALICE, cents(0), t0()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_window_enforced() {
        let mut auction = Auction::open(request(Some((10, 20))), t0()).unwrap();
        assert_eq!(auction.status(t0()), AuctionStatus::Scheduled);

        assert!(matches!(
            auction.post_bid(ALICE, cents(6_000), t0()),
            Err(CoreError::AuctionClosed { reason: ClosedReason::NotStarted, .. })
        ));

        let during = t0() + Duration::minutes(15);
        assert_eq!(auction.status(during), AuctionStatus::Active);
        auction.post_bid(ALICE, cents(6_000), during).unwrap();

        // end is exclusive
        let at_end = t0() + Duration::minutes(20);
        assert_eq!(auction.status(at_end), AuctionStatus::AwaitingFinalization);
        assert!(matches!(
            auction.post_bid(BOB, cents(7_000), at_end),
            Err(CoreError::AuctionClosed { reason: ClosedReason::Ended, .. })
        ));
    }

    #[test]
    fn test_windowed_finalize_waits_for_end() {
        let mut auction = Auction::open(request(Some((0, 30))), t0()).unwrap();
        auction.post_bid(ALICE, cents(6_000), t0()).unwrap();

        let early = t0() + Duration::minutes(10);
        assert!(matches!(
            auction.finalize(FinalizeTrigger::Expiry, early),
            Err(CoreError::AuctionStillRunning(_))
        ));

        let late = t0() + Duration::minutes(30);
        let receipt = auction.finalize(FinalizeTrigger::Expiry, late).unwrap();
        assert_eq!(receipt.winner, Some(ALICE));
        assert_eq!(receipt.final_price, cents(6_000));
        assert_eq!(receipt.auction_end, Some(late));
        assert_eq!(auction.status(late), AuctionStatus::Completed);
    }

    #[test]
    fn test_manual_finalize_rules() {
        let mut auction = Auction::open(request(None), t0()).unwrap();
        auction.post_bid(ALICE, cents(5_500), t0()).unwrap();

        assert!(matches!(
            auction.finalize(FinalizeTrigger::Manual { by: OWNER }, t0()),
            Err(CoreError::NotPermitted { .. })
        ));
        assert!(matches!(
            auction.finalize(FinalizeTrigger::Expiry, t0()),
            Err(CoreError::NotPermitted { .. })
        ));

        let receipt = auction
            .finalize(FinalizeTrigger::Manual { by: BOB }, t0())
            .unwrap();
        assert!(receipt.is_sold());

        assert!(matches!(
            auction.finalize(FinalizeTrigger::Manual { by: BOB }, t0()),
            Err(CoreError::AlreadyFinalized(_))
        ));
        assert!(matches!(
            auction.post_bid(BOB, cents(9_999), t0()),
            Err(CoreError::AuctionClosed { reason: ClosedReason::Completed, .. })
        ));
    }

    #[test]
    fn test_zero_bids_closes_without_winner() {
        let mut auction = Auction::open(request(Some((0, 5))), t0()).unwrap();
        let end = t0() + Duration::minutes(5);
        let receipt = auction.finalize(FinalizeTrigger::Expiry, end).unwrap();

        assert_eq!(receipt.outcome, BidOutcome::NoBids);
        assert_eq!(receipt.winner, None);
        assert_eq!(receipt.final_price, cents(5_000));
        assert_eq!(auction.status(end), AuctionStatus::ClosedNoWinner);
    }

    #[test]
    fn test_snapshot() {
        let mut auction = Auction::open(request(None), t0()).unwrap();
        auction.post_bid(ALICE, cents(5_001), t0()).unwrap();
        let view = auction.snapshot(t0());
        assert_eq!(view.highest_bid, cents(5_001));
        assert_eq!(view.bid_count, 1);
        assert_eq!(view.status, AuctionStatus::Active);
    }
}
